use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::{HttpTransport, InfluxOp, InfluxRequest, InfluxResult, model::QueryTableResult};

use super::QueryApi;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Dialect {
    header: bool,
    annotations: Vec<&'static str>,
    delimiter: &'static str,
    date_time_format: &'static str,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            header: true,
            annotations: vec!["datatype", "group", "default"],
            delimiter: ",",
            date_time_format: "RFC3339",
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,

    #[serde(rename = "type")]
    query_type: &'static str,

    dialect: Dialect,
}

/// 通过 `/api/v2/query` 执行 Flux 查询，结果为注解 CSV
#[derive(Debug, Clone)]
pub struct HttpQueryApi {
    transport: HttpTransport,
    org: String,
}

impl HttpQueryApi {
    pub fn new(transport: HttpTransport, org: &str) -> Self {
        Self {
            transport,
            org: org.to_string(),
        }
    }

    pub(crate) fn query_request(&self, flux: &str) -> InfluxResult<InfluxRequest> {
        let body = QueryBody {
            query: flux,
            query_type: "flux",
            dialect: Dialect::default(),
        };

        Ok(InfluxRequest {
            operation: InfluxOp::Query,
            headers: HashMap::from([
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/csv".to_string()),
            ]),
            query: vec![("org".to_string(), self.org.clone())],
            body: serde_json::to_vec(&body)?,
            ..Default::default()
        })
    }
}

#[async_trait]
impl QueryApi for HttpQueryApi {
    async fn query(&self, flux: &str) -> InfluxResult<QueryTableResult> {
        let req = self.query_request(flux)?;
        let resp = self.transport.send(req).await?;
        let bytes = resp.bytes().await?;

        Ok(QueryTableResult::from_csv(bytes.to_vec()))
    }
}
