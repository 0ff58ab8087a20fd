use std::{future::Future, time::Duration};

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc};

use crate::{InfluxResult, error::InfluxError};

/// 文本形式的时间的固定格式，例如：`2024-01-01 08:00:00`
pub const DATE_TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// 写入 Flux `range()` 的时间格式，带时区偏移。例如：`2024-01-01T08:00:00+08:00`
pub const FLUX_DATE_TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// 默认的时区偏移：东八区
pub const DEFAULT_TIME_OFFSET_SECS: i32 = 8 * 3600;

pub fn default_time_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_TIME_OFFSET_SECS).unwrap_or(Utc.fix())
}

/// 按照 [`DATE_TIME_LAYOUT`] 解析时间文本，并把它当作 `offset` 时区下的本地时间。
///
/// 格式正确但是换算成 UTC 之后超出 chrono 表示范围的时间也返回错误
pub(crate) fn parse_date_time(s: &str, offset: &FixedOffset) -> Result<DateTime<FixedOffset>, String> {
    let naive = NaiveDateTime::parse_from_str(s, DATE_TIME_LAYOUT).map_err(|e| e.to_string())?;
    let utc = naive
        .checked_sub_offset(*offset)
        .ok_or_else(|| format!("date time out of range in offset {}", offset))?;

    Ok(offset.from_utc_datetime(&utc))
}

/// 转换到 `offset` 时区，并格式化成 Flux 中使用的时间文本
pub(crate) fn format_flux_date_time(dt: &DateTime<FixedOffset>, offset: &FixedOffset) -> String {
    dt.with_timezone(offset).format(FLUX_DATE_TIME_LAYOUT).to_string()
}

/// RFC3339 format used by the delete API. e.g. 2024-01-01T00:00:00.000000000Z
pub(crate) fn format_rfc3339_nanos(dt: &DateTime<FixedOffset>) -> String {
    dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// 如果设置了超时时间，超时之后放弃等待 `fut`（future 被 drop，请求随之取消）
pub(crate) async fn with_timeout<T>(timeout_ms: Option<u64>, fut: impl Future<Output = InfluxResult<T>>) -> InfluxResult<T> {
    match timeout_ms {
        Some(ms) => tokio::time::timeout(Duration::from_millis(ms), fut).await.map_err(|_| InfluxError::Timeout(ms))?,
        None => fut.await,
    }
}
