use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::{InfluxResult, add_per_request_options, connection::DeleteApi, error::InfluxError, util::with_timeout};

use super::Session;

/// 删除时间范围内满足条件的数据。
///
/// 条件（predicate）的语法见官方文档：<https://docs.influxdata.com/influxdb/v2/reference/syntax/delete-predicate/>
pub struct DeleteOperation {
    deleter: Arc<dyn DeleteApi>,
    org: String,
    bucket: String,
    start: DateTime<FixedOffset>,
    stop: DateTime<FixedOffset>,
    predicate: String,
    timeout_ms: Option<u64>,
}

impl std::fmt::Debug for DeleteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteOperation")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("start", &self.start)
            .field("stop", &self.stop)
            .field("predicate", &self.predicate)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

add_per_request_options!(DeleteOperation);

impl DeleteOperation {
    /// 删除其他 bucket 中的数据。默认是配置中的 bucket
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    fn validate(&self) -> InfluxResult<()> {
        if self.bucket.is_empty() {
            return Err(InfluxError::ValidationFailed("bucket can not be empty".to_string()));
        }

        if self.start > self.stop {
            return Err(InfluxError::ValidationFailed(format!("start {} is after stop {}", self.start, self.stop)));
        }

        Ok(())
    }

    pub async fn send(self) -> InfluxResult<()> {
        self.validate()?;

        let Self {
            deleter,
            org,
            bucket,
            start,
            stop,
            predicate,
            timeout_ms,
        } = self;

        log::debug!("delete from bucket {} between {} and {} where {}", bucket, start, stop, predicate);

        with_timeout(timeout_ms, deleter.delete(&org, &bucket, start, stop, &predicate)).await
    }
}

impl Session {
    /// 删除配置的 bucket 中指定时间范围内满足条件的数据
    pub fn delete_with_name(
        &self,
        start: impl Into<DateTime<FixedOffset>>,
        stop: impl Into<DateTime<FixedOffset>>,
        predicate: impl Into<String>,
    ) -> DeleteOperation {
        DeleteOperation {
            deleter: self.deleter.clone(),
            org: self.config.org.clone(),
            bucket: self.config.bucket.clone(),
            start: start.into(),
            stop: stop.into(),
            predicate: predicate.into(),
            timeout_ms: None,
        }
    }
}
