use chrono::{DateTime, Utc};

use crate::{
    error::InfluxError,
    model::{FieldValue, Point},
};

use super::Session;

impl Session {
    /// 写入一个数据点。数据点进入 writer 的缓冲区，调用 [`Session::flush`] 之后才会发送
    pub fn write(
        self,
        measurement: impl Into<String>,
        tags: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
        fields: impl IntoIterator<Item = (impl Into<String>, impl Into<FieldValue>)>,
        ts: impl Into<DateTime<Utc>>,
    ) -> Self {
        let point = Point::new(measurement).tags(tags).fields(fields).timestamp(ts);
        self.write_point(point)
    }

    pub fn write_point(self, point: Point) -> Self {
        self.writer.submit(point);
        self
    }

    /// 发送 writer 缓冲区中的所有数据点。
    ///
    /// 失败的时候只输出错误日志，错误本身保留在 writer 上，通过 [`Session::write_errors`] 取出
    pub async fn flush(&self) {
        if let Err(e) = self.writer.flush().await {
            log::error!("flush points failed: {}", e);
        }
    }

    /// 取出（并清空）写入过程中产生的错误
    pub fn write_errors(&self) -> Vec<InfluxError> {
        self.writer.take_errors()
    }
}
