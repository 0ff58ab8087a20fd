use chrono::{DateTime, FixedOffset};

use crate::{
    InfluxResult, flux,
    error::StageError,
    util::{format_flux_date_time, parse_date_time},
};

use super::Session;

impl Session {
    /// `from(bucket: "<bucket>")`
    pub fn from_bucket(self, bucket: impl AsRef<str>) -> Self {
        self.push(flux::from_bucket(bucket.as_ref()))
    }

    /// 从配置中的 bucket 读取
    pub fn from_default_bucket(self) -> Self {
        let fragment = flux::from_bucket(&self.config.bucket);
        self.push(fragment)
    }

    fn parse_range(&self, start: &str, stop: &str) -> Result<String, StageError> {
        let parse = |s: &str| {
            parse_date_time(s, &self.time_offset).map_err(|reason| StageError {
                stage: "range",
                input: s.to_string(),
                reason,
            })
        };

        let start = parse(start)?;
        let stop = parse(stop)?;

        Ok(flux::range(
            &format_flux_date_time(&start, &self.time_offset),
            &format_flux_date_time(&stop, &self.time_offset),
        ))
    }

    /// 设置绝对时间范围。时间格式为 [`DATE_TIME_LAYOUT`](`crate::util::DATE_TIME_LAYOUT`)，
    /// 按照客户端配置的时区解析。
    ///
    /// 解析失败的时候不会追加任何片段，错误记录在会话上（见 [`Session::error`]），执行查询的时候返回
    pub fn range(self, start: &str, stop: &str) -> Self {
        match self.parse_range(start, stop) {
            Ok(fragment) => self.push(fragment),
            Err(e) => self.capture(e),
        }
    }

    /// 和 [`Session::range`] 一样，但是解析失败的时候直接返回错误
    pub fn try_range(self, start: &str, stop: &str) -> InfluxResult<Self> {
        let fragment = self.parse_range(start, stop)?;
        Ok(self.push(fragment))
    }

    /// 使用时间类型设置绝对时间范围
    pub fn range_time(self, start: impl Into<DateTime<FixedOffset>>, stop: impl Into<DateTime<FixedOffset>>) -> Self {
        let fragment = flux::range(
            &format_flux_date_time(&start.into(), &self.time_offset),
            &format_flux_date_time(&stop.into(), &self.time_offset),
        );

        self.push(fragment)
    }

    /// 相对时间范围，例如 `-1h`, `-30m`
    pub fn range_recent(self, start: impl AsRef<str>) -> Self {
        self.push(flux::range_start(start.as_ref()))
    }

    pub fn measurement(self, measurement: impl AsRef<str>) -> Self {
        self.push(flux::measurement(measurement.as_ref()))
    }

    /// 标签等于任意一个值。没有值的时候什么也不做
    pub fn tag(self, key: impl AsRef<str>, values: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let values = values.into_iter().collect::<Vec<_>>();

        match flux::tag(key.as_ref(), &values) {
            Some(fragment) => self.push(fragment),
            None => self,
        }
    }

    /// 字段名称等于任意一个值。没有值的时候什么也不做
    pub fn field(self, fields: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let fields = fields.into_iter().collect::<Vec<_>>();

        match flux::field(&fields) {
            Some(fragment) => self.push(fragment),
            None => self,
        }
    }

    /// 自定义过滤条件，原样写入 `filter(fn: (r) => ...)`
    pub fn filter(self, expression: impl AsRef<str>) -> Self {
        self.push(flux::filter(expression.as_ref()))
    }

    /// `func`: mean, first, last, sum ...
    pub fn aggregate_window(self, every: impl AsRef<str>, func: impl AsRef<str>, create_empty: bool) -> Self {
        self.push(flux::aggregate_window(every.as_ref(), func.as_ref(), create_empty))
    }

    pub fn group(self, columns: impl IntoIterator<Item = impl AsRef<str>>, mode: impl AsRef<str>) -> Self {
        let columns = columns.into_iter().collect::<Vec<_>>();
        self.push(flux::group(&columns, mode.as_ref()))
    }

    pub fn sort(self, columns: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let columns = columns.into_iter().collect::<Vec<_>>();
        self.push(flux::sort(&columns))
    }

    pub fn sort_desc(self, columns: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let columns = columns.into_iter().collect::<Vec<_>>();
        self.push(flux::sort_desc(&columns))
    }

    pub fn limit(self, n: usize) -> Self {
        self.push(flux::limit(n))
    }

    /// 使用前一个非空值填充
    pub fn fill(self, use_previous: bool) -> Self {
        self.push(flux::fill(use_previous))
    }

    /// 使用固定值填充
    pub fn fill_value(self, value: f64) -> Self {
        self.push(flux::fill_value(value))
    }

    pub fn moving_average(self, n: usize) -> Self {
        self.push(flux::moving_average(n))
    }

    pub fn timed_moving_average(self, every: impl AsRef<str>, period: impl AsRef<str>) -> Self {
        self.push(flux::timed_moving_average(every.as_ref(), period.as_ref()))
    }

    pub fn derivative(self, unit: impl AsRef<str>, non_negative: bool) -> Self {
        self.push(flux::derivative(unit.as_ref(), non_negative))
    }

    pub fn first(self) -> Self {
        self.push(flux::first())
    }

    pub fn last(self) -> Self {
        self.push(flux::last())
    }

    pub fn median(self) -> Self {
        self.push(flux::median())
    }

    pub fn cumulative_sum(self) -> Self {
        self.push(flux::cumulative_sum())
    }

    pub fn increase(self) -> Self {
        self.push(flux::increase())
    }

    /// 在当前位置原样追加一段 Flux 文本
    pub fn append(self, flux: impl AsRef<str>) -> Self {
        self.push(flux.as_ref().to_string())
    }
}
