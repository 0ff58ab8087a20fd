//! Flux 查询语句的片段（stage）格式。
//!
//! 每个函数生成一个完整的 stage 文本，除了 [`from_bucket`] 之外都以 `|> ` 开头。
//! 所有的参数都是直接拼接进文本的，不做任何转义，调用者需要自己保证输入是可信的。

/// `from(bucket: "<bucket>")`
pub fn from_bucket(bucket: &str) -> String {
    format!("from(bucket: \"{}\")", bucket)
}

/// `|> range(start: <start>, stop: <stop>)`
pub fn range(start: &str, stop: &str) -> String {
    format!("|> range(start: {}, stop: {})", start, stop)
}

/// 只有开始时间的范围，一般是相对时间，例如 `-1h`
pub fn range_start(start: &str) -> String {
    format!("|> range(start: {})", start)
}

/// `|> filter(fn: (r) => r._measurement == "<measurement>")`
pub fn measurement(measurement: &str) -> String {
    format!("|> filter(fn: (r) => r._measurement == \"{}\")", measurement)
}

/// 多个值之间是 `or` 的关系。没有值的时候返回 `None`
fn any_of<S: AsRef<str>>(column: &str, values: &[S]) -> Option<String> {
    if values.is_empty() {
        return None;
    }

    let predicate = values
        .iter()
        .map(|v| format!("r.{} == \"{}\"", column, v.as_ref()))
        .collect::<Vec<_>>()
        .join(" or ");

    Some(filter(&predicate))
}

/// 按照标签值过滤
pub fn tag<S: AsRef<str>>(key: &str, values: &[S]) -> Option<String> {
    any_of(key, values)
}

/// 按照字段名称过滤
pub fn field<S: AsRef<str>>(fields: &[S]) -> Option<String> {
    any_of("_field", fields)
}

/// `|> filter(fn: (r) => <expression>)`
pub fn filter(expression: &str) -> String {
    format!("|> filter(fn: (r) => {})", expression)
}

fn columns<S: AsRef<str>>(columns: &[S]) -> String {
    columns.iter().map(|c| format!("\"{}\"", c.as_ref())).collect::<Vec<_>>().join(", ")
}

/// `|> group(columns: ["c1", "c2"], mode: "<mode>")`
pub fn group<S: AsRef<str>>(cols: &[S], mode: &str) -> String {
    format!("|> group(columns: [{}], mode: \"{}\")", columns(cols), mode)
}

/// `|> sort(columns: ["c1", "c2"])`
pub fn sort<S: AsRef<str>>(cols: &[S]) -> String {
    format!("|> sort(columns: [{}])", columns(cols))
}

/// `|> sort(columns: ["c1", "c2"], desc: true)`
pub fn sort_desc<S: AsRef<str>>(cols: &[S]) -> String {
    format!("|> sort(columns: [{}], desc: true)", columns(cols))
}

/// `|> limit(n: <n>)`
pub fn limit(n: usize) -> String {
    format!("|> limit(n: {})", n)
}

/// `fn` 可以是 `mean`, `first`, `last`, `sum`, `max` ...
pub fn aggregate_window(every: &str, func: &str, create_empty: bool) -> String {
    format!("|> aggregateWindow(every: {}, fn: {}, createEmpty: {})", every, func, create_empty)
}

/// `|> fill(usePrevious: <bool>)`
pub fn fill(use_previous: bool) -> String {
    format!("|> fill(usePrevious: {})", use_previous)
}

/// `|> fill(value: <float>)`。浮点数总是带小数点，否则 Flux 会把它当作整数
pub fn fill_value(value: f64) -> String {
    format!("|> fill(value: {:?})", value)
}

pub fn moving_average(n: usize) -> String {
    format!("|> movingAverage(n: {})", n)
}

pub fn timed_moving_average(every: &str, period: &str) -> String {
    format!("|> timedMovingAverage(every: {}, period: {})", every, period)
}

pub fn derivative(unit: &str, non_negative: bool) -> String {
    format!("|> derivative(unit: {}, nonNegative: {})", unit, non_negative)
}

pub fn first() -> String {
    "|> first()".to_string()
}

pub fn last() -> String {
    "|> last()".to_string()
}

pub fn median() -> String {
    "|> median()".to_string()
}

pub fn cumulative_sum() -> String {
    "|> cumulativeSum()".to_string()
}

pub fn increase() -> String {
    "|> increase()".to_string()
}
