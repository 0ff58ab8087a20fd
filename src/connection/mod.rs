//! 后端连接句柄：写入、查询和删除。
//!
//! 会话只依赖这里的 trait，默认的实现基于 InfluxDB 2.x 的 HTTP API。

mod delete_api;
mod query_api;
mod write_api;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

pub use delete_api::*;
pub use query_api::*;
pub use write_api::*;

use crate::{
    InfluxClientOptions, InfluxConfig, InfluxResult, HttpTransport,
    error::InfluxError,
    model::{Point, QueryTableResult, WritePrecision},
};

/// 写入句柄。数据点先进入缓冲区，`flush` 的时候才真正发送
#[async_trait]
pub trait WriteApi: Send + Sync {
    /// 提交一个数据点。不会发生网络请求
    fn submit(&self, point: Point);

    /// 发送缓冲区中所有的数据点。失败的错误同时保留在句柄上，可以通过 `take_errors` 取出
    async fn flush(&self) -> InfluxResult<()>;

    /// 取出（并清空）写入时产生的错误
    fn take_errors(&self) -> Vec<InfluxError>;
}

/// 查询句柄
#[async_trait]
pub trait QueryApi: Send + Sync {
    async fn query(&self, flux: &str) -> InfluxResult<QueryTableResult>;
}

/// 删除句柄
#[async_trait]
pub trait DeleteApi: Send + Sync {
    async fn delete(&self, org: &str, bucket: &str, start: DateTime<FixedOffset>, stop: DateTime<FixedOffset>, predicate: &str) -> InfluxResult<()>;
}

/// 打开连接句柄。打开的动作本身不会失败，错误延迟到第一次网络请求
pub trait ConnectionFactory: Send + Sync {
    fn open_writer(&self, org: &str, bucket: &str) -> Arc<dyn WriteApi>;

    fn open_querier(&self, org: &str) -> Arc<dyn QueryApi>;

    fn open_deleter(&self) -> Arc<dyn DeleteApi>;
}

/// 基于 HTTP API 的连接工厂。每个句柄都有自己的 HTTP 客户端
#[derive(Debug, Clone)]
pub struct HttpConnectionFactory {
    url: String,
    token: String,
    timeout_ms: Option<u64>,
    batch_size: usize,
    precision: WritePrecision,
}

impl HttpConnectionFactory {
    pub fn new(config: &InfluxConfig, options: &InfluxClientOptions) -> Self {
        Self {
            url: config.url.clone(),
            token: config.token.clone(),
            timeout_ms: options.timeout_ms,
            batch_size: options.batch_size,
            precision: options.precision,
        }
    }

    fn transport(&self) -> HttpTransport {
        HttpTransport::new(&self.url, &self.token, self.timeout_ms)
    }
}

impl ConnectionFactory for HttpConnectionFactory {
    fn open_writer(&self, org: &str, bucket: &str) -> Arc<dyn WriteApi> {
        log::debug!("open writer for org {} bucket {}", org, bucket);
        Arc::new(HttpWriteApi::new(self.transport(), org, bucket, self.precision, self.batch_size))
    }

    fn open_querier(&self, org: &str) -> Arc<dyn QueryApi> {
        log::debug!("open querier for org {}", org);
        Arc::new(HttpQueryApi::new(self.transport(), org))
    }

    fn open_deleter(&self) -> Arc<dyn DeleteApi> {
        Arc::new(HttpDeleteApi::new(self.transport()))
    }
}
