//! 会话：从模板客户端派生出来的、独占的查询构建器。
//!
//! 会话拥有自己的查询缓冲区和连接句柄，链式方法以值的方式接收并返回会话，
//! 所以不同调用方之间天然隔离，不需要任何锁。

mod delete;
mod query;
mod stages;
mod write;

use std::sync::Arc;

use chrono::FixedOffset;

pub use delete::*;
pub use query::*;

use crate::{
    InfluxClientOptions, InfluxConfig,
    connection::{DeleteApi, QueryApi, WriteApi},
    error::StageError,
};

pub struct Session {
    config: Arc<InfluxConfig>,
    writer: Arc<dyn WriteApi>,
    querier: Arc<dyn QueryApi>,
    deleter: Arc<dyn DeleteApi>,
    fragments: Vec<String>,
    debug: bool,
    error: Option<StageError>,
    time_offset: FixedOffset,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("fragments", &self.fragments)
            .field("debug", &self.debug)
            .field("error", &self.error)
            .field("time_offset", &self.time_offset)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        config: Arc<InfluxConfig>,
        options: &InfluxClientOptions,
        writer: Arc<dyn WriteApi>,
        querier: Arc<dyn QueryApi>,
        deleter: Arc<dyn DeleteApi>,
    ) -> Self {
        Self {
            config,
            writer,
            querier,
            deleter,
            fragments: vec![],
            debug: false,
            error: None,
            time_offset: options.time_offset,
        }
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    /// 打开调试模式：执行查询之前以 `info` 级别输出完整的 Flux 语句
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// 构建查询过程中遇到的第一个错误。一旦出现就不会被清除
    pub fn error(&self) -> Option<&StageError> {
        self.error.as_ref()
    }

    /// 已经追加的查询片段，按照调用顺序排列
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// 完整的 Flux 语句
    pub fn flux(&self) -> String {
        self.fragments.concat()
    }

    fn push(mut self, fragment: String) -> Self {
        self.fragments.push(fragment);
        self
    }

    fn capture(mut self, e: StageError) -> Self {
        log::debug!("stage {} failed: {}", e.stage, e);

        if self.error.is_none() {
            self.error = Some(e);
        }

        self
    }
}

#[cfg(test)]
mod test_session {
    use std::sync::Arc;

    use chrono::{FixedOffset, TimeZone, Utc};

    use crate::{
        HandlePolicy, InfluxClient, InfluxClientOptions,
        error::InfluxError,
        model::{FieldValue, Point, Value},
        test_util::{StubFactory, setup, stub_client},
    };

    const ROUND_TRIP: &str = "from(bucket: \"test\")\
|> range(start: 2024-01-01T00:00:00+08:00, stop: 2024-01-01T01:00:00+08:00)\
|> filter(fn: (r) => r._measurement == \"m\")\
|> filter(fn: (r) => r.imei == \"123123\")\
|> limit(n: 10)";

    #[test]
    fn test_round_trip() {
        setup();
        let (client, _) = stub_client();

        let session = client
            .from_bucket("test")
            .range("2024-01-01 00:00:00", "2024-01-01 01:00:00")
            .measurement("m")
            .tag("imei", ["123123"])
            .limit(10);

        assert!(session.error().is_none());
        assert_eq!(5, session.fragments().len());
        assert_eq!(ROUND_TRIP, session.flux());
    }

    #[test]
    fn test_stages_in_call_order() {
        setup();
        let (client, _) = stub_client();

        let session = client
            .session()
            .from_default_bucket()
            .range_recent("-1h")
            .field(["speed", "temp"])
            .filter("r._value > 10.0")
            .aggregate_window("1m", "mean", false)
            .fill(true)
            .fill_value(0.0)
            .group(["imei"], "by")
            .sort(["_time"])
            .sort_desc(["_value"])
            .moving_average(3)
            .timed_moving_average("1m", "5m")
            .derivative("1s", true)
            .first()
            .last()
            .median()
            .cumulative_sum()
            .increase()
            .append("|> yield(name: \"x\")");

        let expected = [
            "from(bucket: \"test\")",
            "|> range(start: -1h)",
            "|> filter(fn: (r) => r._field == \"speed\" or r._field == \"temp\")",
            "|> filter(fn: (r) => r._value > 10.0)",
            "|> aggregateWindow(every: 1m, fn: mean, createEmpty: false)",
            "|> fill(usePrevious: true)",
            "|> fill(value: 0.0)",
            "|> group(columns: [\"imei\"], mode: \"by\")",
            "|> sort(columns: [\"_time\"])",
            "|> sort(columns: [\"_value\"], desc: true)",
            "|> movingAverage(n: 3)",
            "|> timedMovingAverage(every: 1m, period: 5m)",
            "|> derivative(unit: 1s, nonNegative: true)",
            "|> first()",
            "|> last()",
            "|> median()",
            "|> cumulativeSum()",
            "|> increase()",
            "|> yield(name: \"x\")",
        ];

        assert_eq!(expected.as_slice(), session.fragments());
        assert_eq!(expected.concat(), session.flux());
    }

    #[test]
    fn test_sessions_are_isolated() {
        setup();
        let (client, _) = stub_client();

        let a = client.from_bucket("a");
        let b = client.from_bucket("b");

        let a = a.measurement("ma").limit(1);
        let b = b.tag("imei", ["1", "2"]);

        assert_eq!("from(bucket: \"a\")|> filter(fn: (r) => r._measurement == \"ma\")|> limit(n: 1)", a.flux());
        assert_eq!("from(bucket: \"b\")|> filter(fn: (r) => r.imei == \"1\" or r.imei == \"2\")", b.flux());

        // the template is untouched and still yields empty sessions
        assert!(client.session().fragments().is_empty());
    }

    #[tokio::test]
    async fn test_every_stage_on_template() {
        setup();
        let (client, recorder) = stub_client();
        let (start, stop) = ("2024-01-01 00:00:00", "2024-01-01 01:00:00");
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let (t0, t1) = (tz.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), tz.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());

        let pairs = [
            (client.from_bucket("b"), client.session().from_bucket("b")),
            (client.from_default_bucket(), client.session().from_default_bucket()),
            (client.range(start, stop), client.session().range(start, stop)),
            (client.try_range(start, stop).unwrap(), client.session().try_range(start, stop).unwrap()),
            (client.range_time(t0, t1), client.session().range_time(t0, t1)),
            (client.range_recent("-1h"), client.session().range_recent("-1h")),
            (client.measurement("m"), client.session().measurement("m")),
            (client.tag("imei", ["1"]), client.session().tag("imei", ["1"])),
            (client.field(["speed"]), client.session().field(["speed"])),
            (client.filter("r._value > 1"), client.session().filter("r._value > 1")),
            (client.aggregate_window("1m", "mean", true), client.session().aggregate_window("1m", "mean", true)),
            (client.group(["imei"], "by"), client.session().group(["imei"], "by")),
            (client.sort(["_time"]), client.session().sort(["_time"])),
            (client.sort_desc(["_time"]), client.session().sort_desc(["_time"])),
            (client.limit(10), client.session().limit(10)),
            (client.fill(true), client.session().fill(true)),
            (client.fill_value(1.5), client.session().fill_value(1.5)),
            (client.moving_average(3), client.session().moving_average(3)),
            (client.timed_moving_average("1m", "5m"), client.session().timed_moving_average("1m", "5m")),
            (client.derivative("1s", false), client.session().derivative("1s", false)),
            (client.first(), client.session().first()),
            (client.last(), client.session().last()),
            (client.median(), client.session().median()),
            (client.cumulative_sum(), client.session().cumulative_sum()),
            (client.increase(), client.session().increase()),
            (client.append("|> yield()"), client.session().append("|> yield()")),
        ];

        for (from_template, from_session) in pairs {
            assert_eq!(1, from_template.fragments().len());
            assert_eq!(from_session.flux(), from_template.flux());
            assert!(client.session().fragments().is_empty());
        }

        assert!(client.debug().is_debug());
        assert!(!client.session().is_debug());

        client.query().send().await.unwrap();
        assert_eq!(vec![String::new()], recorder.queries());
    }

    #[test]
    fn test_sessions_on_threads() {
        setup();
        let (client, _) = stub_client();

        let handles = (0..8)
            .map(|i| {
                let client = client.clone();
                std::thread::spawn(move || client.from_bucket(format!("b{}", i)).limit(i).flux())
            })
            .collect::<Vec<_>>();

        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(format!("from(bucket: \"b{}\")|> limit(n: {})", i, i), h.join().unwrap());
        }
    }

    #[test]
    fn test_empty_filters_are_no_op() {
        setup();
        let (client, _) = stub_client();

        let session = client.from_bucket("test").tag("imei", Vec::<String>::new()).field(Vec::<&str>::new());

        assert_eq!(vec!["from(bucket: \"test\")".to_string()], session.fragments());
    }

    #[test]
    fn test_filter_connectives() {
        setup();
        let (client, _) = stub_client();

        for n in 1..6 {
            let values = (0..n).map(|i| format!("v{}", i)).collect::<Vec<_>>();
            let flux = client.tag("k", &values).flux();
            assert_eq!(n - 1, flux.matches(" or ").count());
            assert_eq!(n, flux.matches("r.k == ").count());
        }
    }

    #[test]
    fn test_malformed_range_is_sticky() {
        setup();
        let (client, _) = stub_client();

        let session = client
            .from_bucket("test")
            .range("2024-01-01T00:00:00", "2024-01-01 01:00:00")
            .measurement("m")
            .range("2024-01-01 00:00:00", "bad")
            .range("2024-01-01 00:00:00", "2024-01-01 01:00:00");

        let e = session.error().unwrap();
        assert_eq!("range", e.stage);
        assert_eq!("2024-01-01T00:00:00", e.input);

        assert_eq!(
            [
                "from(bucket: \"test\")",
                "|> filter(fn: (r) => r._measurement == \"m\")",
                "|> range(start: 2024-01-01T00:00:00+08:00, stop: 2024-01-01T01:00:00+08:00)",
            ]
            .as_slice(),
            session.fragments()
        );

        // matches the layout but can not be moved into UTC
        let session = client.from_bucket("test").range("-262143-01-01 00:00:00", "2024-01-01 01:00:00").limit(1);
        let e = session.error().unwrap();
        assert_eq!("-262143-01-01 00:00:00", e.input);
        assert!(e.reason.contains("out of range"));
        assert_eq!(["from(bucket: \"test\")", "|> limit(n: 1)"].as_slice(), session.fragments());
    }

    #[test]
    fn test_try_range() {
        setup();
        let (client, _) = stub_client();

        let res = client.from_bucket("test").try_range("not a time", "2024-01-01 01:00:00");
        assert!(matches!(res, Err(InfluxError::StageError(_))));

        let session = client.from_bucket("test").try_range("2024-01-01 00:00:00", "2024-01-01 01:00:00").unwrap();
        assert_eq!(2, session.fragments().len());
        assert!(session.error().is_none());
    }

    #[test]
    fn test_range_time_uses_configured_offset() {
        setup();
        let options = InfluxClientOptions {
            time_offset: FixedOffset::east_opt(0).unwrap(),
            ..Default::default()
        };
        let (client, _) = crate::test_util::stub_client_with_options(options);

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stop = FixedOffset::east_opt(8 * 3600).unwrap().with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();

        assert_eq!(
            "|> range(start: 2024-01-01T00:00:00+00:00, stop: 2024-01-01T01:00:00+00:00)",
            client.range_time(start, stop).flux()
        );

        assert_eq!(
            "|> range(start: 2024-01-01T00:00:00+00:00, stop: 2024-01-01T01:00:00+00:00)",
            client.range("2024-01-01 00:00:00", "2024-01-01 01:00:00").flux()
        );
    }

    #[tokio::test]
    async fn test_write_and_flush() {
        setup();
        let (client, recorder) = stub_client();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();

        let session = client.write("test_data", [("imei", "123123")], [("speed", 20.33)], ts);
        assert!(recorder.flushed().is_empty());

        session.flush().await;

        let flushed = recorder.flushed();
        assert_eq!(1, flushed.len());

        let point = &flushed[0];
        assert_eq!("test_data", point.measurement);
        assert_eq!(Some(&"123123".to_string()), point.tags.get("imei"));
        assert_eq!(Some(&FieldValue::Float(20.33)), point.fields.get("speed"));
        assert_eq!(ts, point.timestamp);

        // nothing left to send
        session.flush().await;
        assert_eq!(1, recorder.flushed().len());
    }

    #[tokio::test]
    async fn test_write_point_and_errors() {
        setup();
        let (client, recorder) = stub_client();

        recorder.fail_flush(true);

        let session = client.session().write_point(Point::new("m").field("v", 1i64)).write_point(Point::new("m").field("v", 2i64));
        session.flush().await;

        assert!(recorder.flushed().is_empty());
        let errors = session.write_errors();
        assert_eq!(1, errors.len());
        assert!(session.write_errors().is_empty());
    }

    #[tokio::test]
    async fn test_query_uses_buffer() {
        setup();
        let (client, recorder) = stub_client();

        let session = client.debug().from_bucket("test").range_recent("-1h").measurement("test_data");
        let mut result = session.query().send().await.unwrap();

        let record = result.next().unwrap().unwrap();
        assert_eq!(Some("speed"), record.field());
        assert_eq!(Some(&Value::Double(20.33)), record.value());
        assert!(record.time().is_some());
        assert!(result.next().is_none());

        // querying does not consume the buffer
        session.query().send().await.unwrap();
        assert_eq!(vec![session.flux(), session.flux()], recorder.queries());
    }

    #[tokio::test]
    async fn test_query_surfaces_stage_error() {
        setup();
        let (client, recorder) = stub_client();

        let session = client.from_bucket("test").range("oops", "2024-01-01 01:00:00").limit(1);
        let res = session.query().send().await;

        match res {
            Err(InfluxError::StageError(e)) => assert_eq!("oops", e.input),
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(recorder.queries().is_empty());
    }

    #[tokio::test]
    async fn test_query_by_custom_flux() {
        setup();
        let (client, recorder) = stub_client();

        let session = client.from_bucket("ignored").range("oops", "oops");
        let res = session.query_by_custom_flux("from(bucket: \"raw\")|> range(start: -5m)").send().await;
        assert!(res.is_ok());

        client.query_by_custom_flux("buckets()").send().await.unwrap();

        assert_eq!(vec!["from(bucket: \"raw\")|> range(start: -5m)".to_string(), "buckets()".to_string()], recorder.queries());
        assert_eq!(1, session.fragments().len());
    }

    #[tokio::test]
    async fn test_query_timeout() {
        setup();
        let (client, recorder) = stub_client();

        recorder.query_delay_ms(500);

        let res = client.from_bucket("test").query().timeout_ms(10).send().await;
        assert!(matches!(res, Err(InfluxError::Timeout(10))));
    }

    #[tokio::test]
    async fn test_delete_with_name() {
        setup();
        let (client, recorder) = stub_client();

        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let start = tz.with_ymd_and_hms(2023, 6, 13, 8, 0, 0).unwrap();
        let stop = tz.with_ymd_and_hms(2023, 6, 13, 8, 20, 0).unwrap();
        let predicate = "_measurement=\"test_data\" AND imei=\"123123\"";

        client.delete_with_name(start, stop, predicate).send().await.unwrap();
        client.delete_with_name(start, stop, predicate).bucket("other").send().await.unwrap();

        let deletes = recorder.deletes();
        assert_eq!(2, deletes.len());
        assert_eq!(("cotton".to_string(), "test".to_string(), start, stop, predicate.to_string()), deletes[0]);
        assert_eq!("other", deletes[1].1);

        let res = client.delete_with_name(stop, start, predicate).send().await;
        assert!(matches!(res, Err(InfluxError::ValidationFailed(_))));

        let res = client.delete_with_name(start, stop, predicate).bucket("").send().await;
        assert!(matches!(res, Err(InfluxError::ValidationFailed(_))));

        // an empty range is still a valid delete
        client.delete_with_name(start, start, "").send().await.unwrap();
        assert_eq!(3, recorder.deletes().len());
    }

    #[test]
    fn test_handle_policy() {
        setup();
        let (client, recorder) = stub_client();

        // the template opens one set of handles
        assert_eq!(1, recorder.opened());

        let _ = client.from_bucket("a");
        let _ = client.session().from_bucket("b").limit(1);
        assert_eq!(3, recorder.opened());

        let options = InfluxClientOptions {
            handle_policy: HandlePolicy::Shared,
            ..Default::default()
        };
        let factory = Arc::new(StubFactory::default());
        let recorder = factory.recorder();
        let client = InfluxClient::with_factory(crate::test_util::stub_config(), options, factory);

        let a = client.from_bucket("a");
        let b = client.from_bucket("b");
        assert_eq!(1, recorder.opened());
        assert_ne!(a.flux(), b.flux());
    }
}
