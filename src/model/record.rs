use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};

/// 查询结果中的单元格的值。类型由注解 CSV 中的 `#datatype` 决定
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    String(String),
    Long(i64),
    UnsignedLong(u64),
    Double(f64),
    Boolean(bool),
    Time(DateTime<FixedOffset>),
    Duration(String),
}

impl Value {
    /// 根据数据类型解析单元格文本。无法按类型解析的，保留为字符串
    pub(crate) fn parse(data_type: &str, s: &str) -> Self {
        let parsed = match data_type {
            "long" => s.parse().ok().map(Self::Long),
            "unsignedLong" => s.parse().ok().map(Self::UnsignedLong),
            "double" => match s {
                "+Inf" => Some(Self::Double(f64::INFINITY)),
                "-Inf" => Some(Self::Double(f64::NEG_INFINITY)),
                _ => s.parse().ok().map(Self::Double),
            },
            "boolean" => s.parse().ok().map(Self::Boolean),
            "dateTime:RFC3339" | "dateTime:RFC3339Nano" => DateTime::parse_from_rfc3339(s).ok().map(Self::Time),
            "duration" => Some(Self::Duration(s.to_string())),
            _ => None,
        };

        parsed.unwrap_or_else(|| Self::String(s.to_string()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// 数值类型统一转换成 `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Long(n) => Some(*n as f64),
            Self::UnsignedLong(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// 查询结果中的一行数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxRecord {
    /// 所在表的序号
    pub table: usize,

    /// 列名 -> 值
    pub values: HashMap<String, Value>,
}

impl FluxRecord {
    pub fn value_by_key(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// `_field` 列
    pub fn field(&self) -> Option<&str> {
        self.value_by_key("_field").and_then(Value::as_str)
    }

    /// `_value` 列
    pub fn value(&self) -> Option<&Value> {
        self.value_by_key("_value")
    }

    /// `_measurement` 列
    pub fn measurement(&self) -> Option<&str> {
        self.value_by_key("_measurement").and_then(Value::as_str)
    }

    /// `_time` 列
    pub fn time(&self) -> Option<DateTime<FixedOffset>> {
        self.value_by_key("_time").and_then(Value::as_time)
    }

    pub fn start(&self) -> Option<DateTime<FixedOffset>> {
        self.value_by_key("_start").and_then(Value::as_time)
    }

    pub fn stop(&self) -> Option<DateTime<FixedOffset>> {
        self.value_by_key("_stop").and_then(Value::as_time)
    }
}
