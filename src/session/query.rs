use std::sync::Arc;

use crate::{
    InfluxResult, add_per_request_options, connection::QueryApi, error::StageError, model::QueryTableResult, util::with_timeout,
};

use super::Session;

/// 查询操作
pub struct QueryOperation {
    querier: Arc<dyn QueryApi>,
    flux: String,
    debug: bool,
    error: Option<StageError>,
    timeout_ms: Option<u64>,
}

impl std::fmt::Debug for QueryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOperation")
            .field("flux", &self.flux)
            .field("debug", &self.debug)
            .field("error", &self.error)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

add_per_request_options!(QueryOperation);

impl QueryOperation {
    pub(crate) fn new(querier: Arc<dyn QueryApi>, flux: String) -> Self {
        Self {
            querier,
            flux,
            debug: false,
            error: None,
            timeout_ms: None,
        }
    }

    /// 要执行的 Flux 语句
    pub fn flux(&self) -> &str {
        &self.flux
    }

    /// 执行查询。构建查询的过程中出现过错误的话，直接返回那个错误，不发送请求
    pub async fn send(self) -> InfluxResult<QueryTableResult> {
        let Self {
            querier,
            flux,
            debug,
            error,
            timeout_ms,
        } = self;

        if debug {
            log::info!("flux: {}", flux);
        }

        if let Some(e) = error {
            return Err(e.into());
        }

        with_timeout(timeout_ms, querier.query(&flux)).await
    }
}

impl Session {
    /// 使用当前会话中的查询片段执行查询。查询片段不会被清空，可以重复执行
    pub fn query(&self) -> QueryOperation {
        QueryOperation {
            debug: self.debug,
            error: self.error.clone(),
            ..QueryOperation::new(self.querier.clone(), self.flux())
        }
    }

    /// 执行给定的 Flux 语句，忽略会话中的查询片段和错误
    pub fn query_by_custom_flux(&self, flux: impl Into<String>) -> QueryOperation {
        QueryOperation::new(self.querier.clone(), flux.into())
    }
}
