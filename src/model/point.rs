use std::{collections::BTreeMap, fmt::Display};

use chrono::{DateTime, Utc};

use crate::{InfluxResult, error::InfluxError};

/// 写入的时间戳精度
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecision {
    #[default]
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl Display for WritePrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        };

        write!(f, "{}", s)
    }
}

impl WritePrecision {
    pub(crate) fn timestamp(&self, dt: &DateTime<Utc>) -> InfluxResult<i64> {
        match self {
            Self::Nanoseconds => dt
                .timestamp_nanos_opt()
                .ok_or_else(|| InfluxError::ValidationFailed(format!("timestamp out of nanosecond range: {}", dt))),
            Self::Microseconds => Ok(dt.timestamp_micros()),
            Self::Milliseconds => Ok(dt.timestamp_millis()),
            Self::Seconds => Ok(dt.timestamp()),
        }
    }
}

/// 数据点的字段值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    String(String),
    Boolean(bool),
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::UInteger(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::UInteger(value as u64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl FieldValue {
    fn write_line_protocol(&self, out: &mut String) {
        match self {
            Self::Float(d) => out.push_str(&d.to_string()),
            Self::Integer(n) => out.push_str(&format!("{}i", n)),
            Self::UInteger(n) => out.push_str(&format!("{}u", n)),
            Self::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::String(s) => {
                out.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
        }
    }
}

/// 一个时序数据点。写入之后所有权就转移给了 writer，不能再修改。
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// 度量名称
    pub measurement: String,

    /// 标签，键唯一
    pub tags: BTreeMap<String, String>,

    /// 字段，键唯一
    pub fields: BTreeMap<String, FieldValue>,

    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// 创建一个数据点，时间戳默认为当前时间
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// 设置度量名称
    pub fn measurement(mut self, measurement: impl Into<String>) -> Self {
        self.measurement = measurement.into();
        self
    }

    /// 增加一个标签。同名的标签会被覆盖
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// 设置所有标签
    pub fn tags(mut self, tags: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.tags = tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// 增加一个字段。同名的字段会被覆盖
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// 设置所有字段
    pub fn fields(mut self, fields: impl IntoIterator<Item = (impl Into<String>, impl Into<FieldValue>)>) -> Self {
        self.fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// 设置时间戳
    pub fn timestamp(mut self, ts: impl Into<DateTime<Utc>>) -> Self {
        self.timestamp = ts.into();
        self
    }

    pub(crate) fn validate(&self) -> InfluxResult<()> {
        if self.measurement.is_empty() {
            return Err(InfluxError::ValidationFailed("measurement can not be empty".to_string()));
        }

        if self.fields.is_empty() {
            return Err(InfluxError::ValidationFailed(format!("point of measurement {} has no fields", self.measurement)));
        }

        if let Some(k) = self.tags.keys().chain(self.fields.keys()).find(|k| k.is_empty()) {
            return Err(InfluxError::ValidationFailed(format!("empty key in point of measurement {}: {:?}", self.measurement, k)));
        }

        Ok(())
    }

    /// 编码成 line protocol 的一行（不包含换行符）
    ///
    /// 例如：`test_data,iccid=234234,imei=123123 speed=20.33 1704067200000000000`
    pub fn to_line_protocol(&self, precision: WritePrecision) -> InfluxResult<String> {
        self.validate()?;

        let mut line = String::new();
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        for (k, v) in &self.tags {
            line.push(',');
            escape_into(&mut line, k, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, v, &[',', '=', ' ']);
        }

        line.push(' ');

        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            escape_into(&mut line, k, &[',', '=', ' ']);
            line.push('=');
            v.write_line_protocol(&mut line);
        }

        line.push(' ');
        line.push_str(&precision.timestamp(&self.timestamp)?.to_string());

        Ok(line)
    }
}

fn escape_into(out: &mut String, s: &str, specials: &[char]) {
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            c if specials.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}
