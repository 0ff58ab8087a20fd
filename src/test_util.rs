use std::sync::{
    Arc, Mutex, Once,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::{
    InfluxClient, InfluxClientOptions, InfluxConfig, InfluxResult,
    connection::{ConnectionFactory, DeleteApi, QueryApi, WriteApi},
    error::InfluxError,
    model::{Point, QueryTableResult},
};

static INIT: Once = Once::new();

pub(crate) fn setup() {
    INIT.call_once(|| {
        let _ = simple_logger::init_with_level(log::Level::Debug);
        let _ = dotenvy::dotenv();
    });
}

pub(crate) const STUB_CSV: &str = "#datatype,string,long,dateTime:RFC3339,double,string,string\r\n\
#group,false,false,false,false,true,true\r\n\
#default,_result,,,,,\r\n\
,result,table,_time,_value,_field,_measurement\r\n\
,,0,2024-01-01T00:00:00Z,20.33,speed,test_data\r\n";

pub(crate) type DeleteCall = (String, String, DateTime<FixedOffset>, DateTime<FixedOffset>, String);

/// 记录所有 stub 句柄收到的调用
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    opened: AtomicUsize,
    flushed: Mutex<Vec<Point>>,
    queries: Mutex<Vec<String>>,
    deletes: Mutex<Vec<DeleteCall>>,
    fail_flush: AtomicBool,
    query_delay_ms: AtomicU64,
}

impl Recorder {
    /// 打开过的 writer 数量，也就是句柄组的数量
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn flushed(&self) -> Vec<Point> {
        self.flushed.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<DeleteCall> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::SeqCst);
    }

    pub fn query_delay_ms(&self, ms: u64) {
        self.query_delay_ms.store(ms, Ordering::SeqCst);
    }
}

pub(crate) struct StubWriter {
    recorder: Arc<Recorder>,
    pending: Mutex<Vec<Point>>,
    errors: Mutex<Vec<InfluxError>>,
}

#[async_trait]
impl WriteApi for StubWriter {
    fn submit(&self, point: Point) {
        self.pending.lock().unwrap().push(point);
    }

    async fn flush(&self) -> InfluxResult<()> {
        let points = std::mem::take(&mut *self.pending.lock().unwrap());

        if points.is_empty() {
            return Ok(());
        }

        if self.recorder.fail_flush.load(Ordering::SeqCst) {
            self.errors.lock().unwrap().push(InfluxError::WriteFailed("stub flush failure".to_string()));
            return Err(InfluxError::WriteFailed("stub flush failure".to_string()));
        }

        self.recorder.flushed.lock().unwrap().extend(points);
        Ok(())
    }

    fn take_errors(&self) -> Vec<InfluxError> {
        std::mem::take(&mut *self.errors.lock().unwrap())
    }
}

pub(crate) struct StubQuerier {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl QueryApi for StubQuerier {
    async fn query(&self, flux: &str) -> InfluxResult<QueryTableResult> {
        let delay = self.recorder.query_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        self.recorder.queries.lock().unwrap().push(flux.to_string());
        Ok(QueryTableResult::from_csv(STUB_CSV))
    }
}

pub(crate) struct StubDeleter {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl DeleteApi for StubDeleter {
    async fn delete(&self, org: &str, bucket: &str, start: DateTime<FixedOffset>, stop: DateTime<FixedOffset>, predicate: &str) -> InfluxResult<()> {
        self.recorder
            .deletes
            .lock()
            .unwrap()
            .push((org.to_string(), bucket.to_string(), start, stop, predicate.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct StubFactory {
    recorder: Arc<Recorder>,
}

impl StubFactory {
    pub fn recorder(&self) -> Arc<Recorder> {
        self.recorder.clone()
    }
}

impl ConnectionFactory for StubFactory {
    fn open_writer(&self, _org: &str, _bucket: &str) -> Arc<dyn WriteApi> {
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        Arc::new(StubWriter {
            recorder: self.recorder.clone(),
            pending: Mutex::new(vec![]),
            errors: Mutex::new(vec![]),
        })
    }

    fn open_querier(&self, _org: &str) -> Arc<dyn QueryApi> {
        Arc::new(StubQuerier {
            recorder: self.recorder.clone(),
        })
    }

    fn open_deleter(&self) -> Arc<dyn DeleteApi> {
        Arc::new(StubDeleter {
            recorder: self.recorder.clone(),
        })
    }
}

pub(crate) fn stub_config() -> InfluxConfig {
    InfluxConfig::new("http://localhost:8086", "token", "cotton", "test")
}

pub(crate) fn stub_client_with_options(options: InfluxClientOptions) -> (InfluxClient, Arc<Recorder>) {
    let factory = Arc::new(StubFactory::default());
    let recorder = factory.recorder();

    (InfluxClient::with_factory(stub_config(), options, factory), recorder)
}

pub(crate) fn stub_client() -> (InfluxClient, Arc<Recorder>) {
    stub_client_with_options(InfluxClientOptions::default())
}
