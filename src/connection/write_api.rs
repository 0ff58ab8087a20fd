use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::{
    HttpTransport, InfluxOp, InfluxRequest, InfluxResult,
    error::InfluxError,
    model::{Point, WritePrecision},
};

use super::WriteApi;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// 以 line protocol 格式写入数据。
///
/// 缓冲区的数据点数量达到 `batch_size` 并且当前处于 tokio 运行时中的时候，会在后台发送这一批数据。
/// 后台的批次按照提交的顺序依次发送，[`WriteApi::flush`] 会先等待它们全部完成，再发送缓冲区中剩下的数据。
/// 发送失败的错误通过 [`WriteApi::take_errors`] 获取。
#[derive(Debug)]
pub struct HttpWriteApi {
    transport: HttpTransport,
    org: String,
    bucket: String,
    precision: WritePrecision,
    batch_size: usize,
    buffer: Mutex<Vec<String>>,
    errors: Arc<Mutex<Vec<InfluxError>>>,

    /// 最后一个后台批次。它的结果是到它为止（包括之前的批次）失败的批次数量
    in_flight: Mutex<Option<JoinHandle<usize>>>,
}

impl HttpWriteApi {
    pub fn new(transport: HttpTransport, org: &str, bucket: &str, precision: WritePrecision, batch_size: usize) -> Self {
        Self {
            transport,
            org: org.to_string(),
            bucket: bucket.to_string(),
            precision,
            batch_size: batch_size.max(1),
            buffer: Mutex::new(vec![]),
            errors: Arc::new(Mutex::new(vec![])),
            in_flight: Mutex::new(None),
        }
    }

    /// 缓冲区中还没有发送的数据行数
    pub fn pending(&self) -> usize {
        lock(&self.buffer).len()
    }

    pub(crate) fn write_request(&self, lines: &[String]) -> InfluxRequest {
        InfluxRequest {
            operation: InfluxOp::Write,
            headers: HashMap::from([("Content-Type".to_string(), "text/plain; charset=utf-8".to_string())]),
            query: vec![
                ("org".to_string(), self.org.clone()),
                ("bucket".to_string(), self.bucket.clone()),
                ("precision".to_string(), self.precision.to_string()),
            ],
            body: lines.join("\n").into_bytes(),
            ..Default::default()
        }
    }

    /// 在后台发送一批数据。新的批次排在上一个批次之后发送
    fn flush_in_background(&self, handle: tokio::runtime::Handle, lines: Vec<String>) {
        let req = self.write_request(&lines);
        let transport = self.transport.clone();
        let errors = self.errors.clone();

        log::debug!("batch of {} lines is full, write in background", lines.len());

        let mut in_flight = lock(&self.in_flight);
        let previous = in_flight.take();

        *in_flight = Some(handle.spawn(async move {
            let failed = match previous {
                Some(h) => h.await.unwrap_or(1),
                None => 0,
            };

            match transport.send(req).await {
                Ok(_) => failed,
                Err(e) => {
                    log::error!("background write of {} lines failed: {}", lines.len(), e);
                    lock(&errors).push(e);
                    failed + 1
                }
            }
        }));
    }

    /// 等待所有后台批次发送完成，返回失败的批次数量
    async fn wait_in_flight(&self) -> usize {
        let tail = lock(&self.in_flight).take();

        match tail {
            Some(h) => h.await.unwrap_or_else(|e| {
                log::error!("background write task failed: {}", e);
                1
            }),
            None => 0,
        }
    }
}

#[async_trait]
impl WriteApi for HttpWriteApi {
    fn submit(&self, point: Point) {
        let line = match point.to_line_protocol(self.precision) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("drop invalid point: {}", e);
                lock(&self.errors).push(e);
                return;
            }
        };

        let mut buffer = lock(&self.buffer);
        buffer.push(line);

        if buffer.len() < self.batch_size {
            return;
        }

        // without a runtime the lines stay buffered until the next flush.
        // the batch is queued while the buffer is still locked so batches keep their order
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let lines = std::mem::take(&mut *buffer);
            self.flush_in_background(handle, lines);
        }
    }

    async fn flush(&self) -> InfluxResult<()> {
        let failed_batches = self.wait_in_flight().await;
        let lines = std::mem::take(&mut *lock(&self.buffer));

        let mut failed_lines = 0;
        let mut last_error = None;

        if !lines.is_empty() {
            log::debug!("flush {} lines to bucket {}", lines.len(), self.bucket);

            if let Err(e) = self.transport.send(self.write_request(&lines)).await {
                failed_lines = lines.len();
                last_error = Some(e.to_string());
                lock(&self.errors).push(e);
            }
        }

        match (failed_batches, last_error) {
            (0, None) => Ok(()),
            (0, Some(message)) => Err(InfluxError::WriteFailed(format!("{} lines: {}", failed_lines, message))),
            (n, None) => Err(InfluxError::WriteFailed(format!("{} background batches failed", n))),
            (n, Some(message)) => Err(InfluxError::WriteFailed(format!(
                "{} background batches and {} lines failed: {}",
                n, failed_lines, message
            ))),
        }
    }

    fn take_errors(&self) -> Vec<InfluxError> {
        std::mem::take(&mut *lock(&self.errors))
    }
}
