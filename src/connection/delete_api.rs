use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::{HttpTransport, InfluxOp, InfluxRequest, InfluxResult, util::format_rfc3339_nanos};

use super::DeleteApi;

#[derive(Debug, Serialize)]
struct DeleteBody<'a> {
    start: String,
    stop: String,

    #[serde(skip_serializing_if = "str::is_empty")]
    predicate: &'a str,
}

/// 通过 `/api/v2/delete` 删除数据
#[derive(Debug, Clone)]
pub struct HttpDeleteApi {
    transport: HttpTransport,
}

impl HttpDeleteApi {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub(crate) fn delete_request(
        &self,
        org: &str,
        bucket: &str,
        start: &DateTime<FixedOffset>,
        stop: &DateTime<FixedOffset>,
        predicate: &str,
    ) -> InfluxResult<InfluxRequest> {
        let body = DeleteBody {
            start: format_rfc3339_nanos(start),
            stop: format_rfc3339_nanos(stop),
            predicate,
        };

        Ok(InfluxRequest {
            operation: InfluxOp::Delete,
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            query: vec![("org".to_string(), org.to_string()), ("bucket".to_string(), bucket.to_string())],
            body: serde_json::to_vec(&body)?,
            ..Default::default()
        })
    }
}

#[async_trait]
impl DeleteApi for HttpDeleteApi {
    async fn delete(&self, org: &str, bucket: &str, start: DateTime<FixedOffset>, stop: DateTime<FixedOffset>, predicate: &str) -> InfluxResult<()> {
        let req = self.delete_request(org, bucket, &start, &stop, predicate)?;
        self.transport.send(req).await?;

        Ok(())
    }
}
