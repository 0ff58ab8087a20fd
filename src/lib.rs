use std::{collections::HashMap, fmt::Display, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset};
use connection::{ConnectionFactory, DeleteApi, HttpConnectionFactory, QueryApi, WriteApi};
use error::{ApiError, InfluxError};
use model::{FieldValue, Point, WritePrecision};
use reqwest::{
    Response,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use session::{DeleteOperation, QueryOperation, Session};
use url::Url;

pub mod connection;
pub mod error;
pub mod flux;
pub mod macros;
pub mod model;
pub mod session;
pub mod util;

#[cfg(test)]
pub mod test_util;

const USER_AGENT: &str = "influxdb-helper-rs/0.1.0";
const HEADER_AUTHORIZATION: &str = "Authorization";

pub type InfluxResult<T> = Result<T, InfluxError>;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfluxOp {
    #[default]
    Undefined,
    Write,
    Query,
    Delete,
}

impl From<InfluxOp> for String {
    fn from(value: InfluxOp) -> Self {
        value.to_string()
    }
}

impl Display for InfluxOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InfluxOp::Undefined => "_undefined_",
            InfluxOp::Write => "write",
            InfluxOp::Query => "query",
            InfluxOp::Delete => "delete",
        };

        write!(f, "{}", s)
    }
}

/// The request to send to InfluxDB HTTP API
#[derive(Debug, Clone)]
pub struct InfluxRequest {
    method: reqwest::Method,
    operation: InfluxOp,
    headers: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Default for InfluxRequest {
    fn default() -> Self {
        Self {
            method: reqwest::Method::POST,
            operation: InfluxOp::Undefined,
            headers: HashMap::new(),
            query: Vec::new(),
            body: Vec::new(),
        }
    }
}

/// 连接参数。创建之后不再修改，由模板客户端和所有从它派生出来的会话共享
#[derive(Clone, Default, PartialEq, Eq)]
pub struct InfluxConfig {
    /// 服务地址，例如 `http://localhost:8086`
    pub url: String,

    /// API token
    pub token: String,

    pub org: String,
    pub bucket: String,
}

impl std::fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl InfluxConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>, org: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            org: org.into(),
            bucket: bucket.into(),
        }
    }

    /// Build config from env values. The following env vars are required:
    ///
    /// - `INFLUXDB_URL`: The server url. e.g. `http://localhost:8086`
    /// - `INFLUXDB_TOKEN`: The API token
    /// - `INFLUXDB_ORG`: The organization name
    /// - `INFLUXDB_BUCKET`: The default bucket
    pub fn from_env() -> InfluxResult<Self> {
        let var = |name: &str| std::env::var(name).map_err(|_| InfluxError::ConfigError(format!("env var {} is missing", name)));

        Ok(Self {
            url: var("INFLUXDB_URL")?,
            token: var("INFLUXDB_TOKEN")?,
            org: var("INFLUXDB_ORG")?,
            bucket: var("INFLUXDB_BUCKET")?,
        })
    }
}

/// 从模板客户端派生会话时，会话使用的连接句柄
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HandlePolicy {
    /// 每个会话都打开一组新的 writer/querier/deleter。会话之间完全隔离
    #[default]
    Fresh,

    /// 会话复用模板客户端打开的句柄，只有查询缓冲区是独立的
    Shared,
}

#[derive(Debug, Clone)]
pub struct InfluxClientOptions {
    /// HTTP 请求的超时时间
    pub timeout_ms: Option<u64>,

    /// 解析和格式化 `range()` 时间时使用的时区。默认东八区
    pub time_offset: FixedOffset,

    pub handle_policy: HandlePolicy,

    /// writer 缓冲的数据点达到这个数量时，在后台写入一批
    pub batch_size: usize,

    /// 写入时间戳的精度
    pub precision: WritePrecision,
}

impl InfluxClientOptions {
    pub fn new() -> Self {
        Self {
            timeout_ms: None,
            time_offset: util::default_time_offset(),
            handle_policy: HandlePolicy::default(),
            batch_size: 5000,
            precision: WritePrecision::default(),
        }
    }
}

impl Default for InfluxClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// 发送 HTTP 请求。每个实例持有自己的 `reqwest::Client`，也就是自己的连接池
#[derive(Clone)]
pub struct HttpTransport {
    url: String,
    token: String,
    timeout_ms: Option<u64>,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .field("timeout_ms", &self.timeout_ms)
            .field("http_client", &self.http_client)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(url: &str, token: &str, timeout_ms: Option<u64>) -> Self {
        Self {
            url: url.to_string(),
            token: token.to_string(),
            timeout_ms,
            http_client: reqwest::Client::new(),
        }
    }

    pub(crate) fn request_url(&self, operation: InfluxOp, query: &[(String, String)]) -> InfluxResult<Url> {
        let mut url = Url::parse(&format!("{}/api/v2/{}", self.url.trim_end_matches('/'), operation))?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        Ok(url)
    }

    fn prepare_headers(&self, headers: HashMap<String, String>) -> InfluxResult<HeaderMap> {
        let mut header_map = HeaderMap::new();

        let defaults = [
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            (HEADER_AUTHORIZATION.to_string(), format!("Token {}", self.token)),
        ];

        for (k, v) in defaults.into_iter().chain(headers) {
            if k != HEADER_AUTHORIZATION {
                log::debug!(">> header: {}: {}", k, v);
            }

            let name = HeaderName::from_str(&k.to_lowercase()).map_err(|e| InfluxError::ValidationFailed(format!("invalid header name {}: {}", k, e)))?;
            let value = HeaderValue::from_str(&v).map_err(|e| InfluxError::ValidationFailed(format!("invalid header value for {}: {}", k, e)))?;
            header_map.insert(name, value);
        }

        Ok(header_map)
    }

    /// 发送请求。非 2xx 的响应会被转换成错误返回，不做任何重试
    pub async fn send(&self, req: InfluxRequest) -> InfluxResult<Response> {
        let InfluxRequest {
            method,
            operation,
            headers,
            query,
            body,
        } = req;

        let url = self.request_url(operation, &query)?;
        let header_map = self.prepare_headers(headers)?;

        log::debug!("{} {}, body length: {}", method, url, body.len());

        let mut request_builder = self.http_client.request(method, url).headers(header_map).body(body);

        if let Some(ms) = self.timeout_ms {
            request_builder = request_builder.timeout(Duration::from_millis(ms));
        }

        let response = request_builder.send().await?;

        response.headers().iter().for_each(|(k, v)| {
            log::debug!("<< header: {}: {}", k, v.to_str().unwrap_or_default());
        });

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        let e = match serde_json::from_str::<ApiError>(&text) {
            Ok(api_error) if !api_error.code.is_empty() => InfluxError::ApiError(Box::new(api_error)),
            _ => InfluxError::StatusError(status, text),
        };

        log::error!("api call failed for operation {}: {}", operation, e);

        Err(e)
    }
}

/// 模板客户端。
///
/// 持有连接参数和一组连接句柄，本身不会被链式调用修改，可以在进程启动时创建一次，然后在各处共享使用。
/// 每次在模板上调用链式方法，都会先通过 [`InfluxClient::session`] 派生出一个独立的 [`Session`]，
/// 之后的调用都发生在这个会话上。
///
/// # Examples
///
/// ```ignore
/// let client = InfluxClient::new(InfluxConfig::new("http://localhost:8086", "token", "org", "test"));
///
/// let result = client
///     .from_bucket("test")
///     .range("2024-01-01 00:00:00", "2024-01-01 01:00:00")
///     .measurement("test_data")
///     .tag("imei", ["123123"])
///     .field(["speed"])
///     .query()
///     .send()
///     .await?;
/// ```
#[derive(Clone)]
pub struct InfluxClient {
    config: Arc<InfluxConfig>,
    options: InfluxClientOptions,
    factory: Arc<dyn ConnectionFactory>,
    writer: Arc<dyn WriteApi>,
    querier: Arc<dyn QueryApi>,
    deleter: Arc<dyn DeleteApi>,
}

impl std::fmt::Debug for InfluxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxClient").field("config", &self.config).field("options", &self.options).finish()
    }
}

impl InfluxClient {
    /// 使用默认选项创建客户端。不会校验参数，连接错误在第一次发送请求的时候才会出现
    pub fn new(config: InfluxConfig) -> Self {
        Self::with_options(config, InfluxClientOptions::default())
    }

    pub fn with_options(config: InfluxConfig, options: InfluxClientOptions) -> Self {
        let factory = Arc::new(HttpConnectionFactory::new(&config, &options));
        Self::with_factory(config, options, factory)
    }

    /// 使用自定义的连接工厂创建客户端
    pub fn with_factory(config: InfluxConfig, options: InfluxClientOptions, factory: Arc<dyn ConnectionFactory>) -> Self {
        let writer = factory.open_writer(&config.org, &config.bucket);
        let querier = factory.open_querier(&config.org);
        let deleter = factory.open_deleter();

        Self {
            config: Arc::new(config),
            options,
            factory,
            writer,
            querier,
            deleter,
        }
    }

    /// Build an InfluxClient from env values. See [`InfluxConfig::from_env`]
    pub fn from_env() -> InfluxResult<Self> {
        Ok(Self::new(InfluxConfig::from_env()?))
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    pub fn options(&self) -> &InfluxClientOptions {
        &self.options
    }

    /// 派生一个新的会话：空的查询缓冲区，以及按照 [`HandlePolicy`] 得到的连接句柄。模板自身不受影响
    pub fn session(&self) -> Session {
        let (writer, querier, deleter) = match self.options.handle_policy {
            HandlePolicy::Fresh => (
                self.factory.open_writer(&self.config.org, &self.config.bucket),
                self.factory.open_querier(&self.config.org),
                self.factory.open_deleter(),
            ),
            HandlePolicy::Shared => (self.writer.clone(), self.querier.clone(), self.deleter.clone()),
        };

        Session::new(self.config.clone(), &self.options, writer, querier, deleter)
    }

    /// 见 [`Session::try_range`]
    pub fn try_range(&self, start: &str, stop: &str) -> InfluxResult<Session> {
        self.session().try_range(start, stop)
    }

    /// 在一个空的会话上执行查询
    pub fn query(&self) -> QueryOperation {
        self.session().query()
    }

    /// 直接执行给定的 Flux 语句
    pub fn query_by_custom_flux(&self, flux: impl Into<String>) -> QueryOperation {
        self.session().query_by_custom_flux(flux)
    }

    /// 删除配置的 bucket 中指定时间范围内满足条件的数据
    pub fn delete_with_name(
        &self,
        start: impl Into<DateTime<FixedOffset>>,
        stop: impl Into<DateTime<FixedOffset>>,
        predicate: impl Into<String>,
    ) -> DeleteOperation {
        self.session().delete_with_name(start, stop, predicate)
    }
}

macros::forward_to_session! {
    /// 打开调试模式：执行查询之前输出完整的 Flux 语句
    fn debug(&self);

    /// 写入一个数据点（先进入 writer 的缓冲区）
    fn write(
        &self,
        measurement: impl Into<String>,
        tags: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
        fields: impl IntoIterator<Item = (impl Into<String>, impl Into<FieldValue>)>,
        ts: impl Into<chrono::DateTime<chrono::Utc>>
    );

    /// 写入一个已经构建好的数据点
    fn write_point(&self, point: Point);

    fn from_bucket(&self, bucket: impl AsRef<str>);
    fn from_default_bucket(&self);
    fn range(&self, start: &str, stop: &str);
    fn range_time(&self, start: impl Into<DateTime<FixedOffset>>, stop: impl Into<DateTime<FixedOffset>>);
    fn range_recent(&self, start: impl AsRef<str>);
    fn measurement(&self, measurement: impl AsRef<str>);
    fn tag(&self, key: impl AsRef<str>, values: impl IntoIterator<Item = impl AsRef<str>>);
    fn field(&self, fields: impl IntoIterator<Item = impl AsRef<str>>);
    fn filter(&self, expression: impl AsRef<str>);
    fn aggregate_window(&self, every: impl AsRef<str>, func: impl AsRef<str>, create_empty: bool);
    fn group(&self, columns: impl IntoIterator<Item = impl AsRef<str>>, mode: impl AsRef<str>);
    fn sort(&self, columns: impl IntoIterator<Item = impl AsRef<str>>);
    fn sort_desc(&self, columns: impl IntoIterator<Item = impl AsRef<str>>);
    fn limit(&self, n: usize);
    fn fill(&self, use_previous: bool);
    fn fill_value(&self, value: f64);
    fn moving_average(&self, n: usize);
    fn timed_moving_average(&self, every: impl AsRef<str>, period: impl AsRef<str>);
    fn derivative(&self, unit: impl AsRef<str>, non_negative: bool);
    fn first(&self);
    fn last(&self);
    fn median(&self);
    fn cumulative_sum(&self);
    fn increase(&self);
    fn append(&self, flux: impl AsRef<str>);
}

/// 需要真实的 InfluxDB 服务，连接参数从 `.env` 读取。使用 `cargo test -- --ignored` 运行
#[cfg(test)]
mod test_live {
    use chrono::{Duration, FixedOffset, TimeZone, Utc};

    use crate::{InfluxClient, test_util::setup};

    #[tokio::test]
    #[ignore]
    async fn test_write_query_delete() {
        setup();
        let client = InfluxClient::from_env().unwrap();

        let start = Utc::now() - Duration::minutes(30);
        let session = (0..30).fold(client.session(), |session, i| {
            session.write(
                "live_test_data",
                [("imei", "123123"), ("iccid", "234234")],
                [("speed", 20.33 + i as f64)],
                start + Duration::minutes(i),
            )
        });

        session.flush().await;
        assert!(session.write_errors().is_empty());

        let records = client
            .debug()
            .from_default_bucket()
            .range_recent("-1h")
            .measurement("live_test_data")
            .tag("imei", ["123123"])
            .field(["speed"])
            .query()
            .send()
            .await
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(records.len() >= 30);

        let tz = FixedOffset::east_opt(0).unwrap();
        let from = tz.from_utc_datetime(&(start - Duration::minutes(1)).naive_utc());
        let to = tz.from_utc_datetime(&Utc::now().naive_utc());

        client
            .delete_with_name(from, to, "_measurement=\"live_test_data\" AND imei=\"123123\"")
            .send()
            .await
            .unwrap();
    }
}
