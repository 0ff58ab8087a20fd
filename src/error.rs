use std::fmt::{Display, Formatter};

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// InfluxDB HTTP API 返回的错误信息
///
/// 例如：`{"code":"not found","message":"bucket \"foo\" not found"}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiError {
    pub code: String,

    #[serde(default)]
    pub message: Option<String>,
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "API response error. code: {}, message: {}",
            self.code,
            self.message.as_ref().unwrap_or(&"".to_string())
        )
    }
}

/// 构建查询阶段（stage）时产生的错误。
///
/// 这个错误会被记录在 [`Session`](`crate::session::Session`) 上，不会打断链式调用，
/// 直到执行查询的时候才返回给调用者。
#[derive(Error, Debug, Clone, PartialEq)]
#[error("can not parse `{input}` for stage {stage}: {reason}")]
pub struct StageError {
    pub stage: &'static str,
    pub input: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum InfluxError {
    #[error("{0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("{0}")]
    UrlError(#[from] url::ParseError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    StageError(#[from] StageError),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// This is error for InfluxDB API response.
    #[error("{0}")]
    ApiError(Box<ApiError>),

    #[error("InfluxDB api response with non-successful code: {0}. response message is: {1}")]
    StatusError(StatusCode, String),

    /// 写入失败。原始错误保留在 writer 上，见 [`WriteApi::take_errors`](`crate::connection::WriteApi::take_errors`)
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// 查询结果中返回的错误表（`error,reference` 列）
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Operation timed out after {0} ms")]
    Timeout(u64),
}
