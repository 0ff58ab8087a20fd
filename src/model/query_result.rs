use std::{collections::HashMap, io::Cursor};

use csv::StringRecord;

use crate::{InfluxResult, error::InfluxError};

use super::{FluxRecord, Value};

/// 查询结果中的一列的定义
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxColumn {
    pub name: String,
    pub data_type: String,
    pub group: bool,
    pub default_value: String,
}

/// 查询结果中的一张表的定义
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxTableMetadata {
    /// 表的序号，从 0 开始
    pub position: usize,
    pub columns: Vec<FluxColumn>,
}

impl FluxTableMetadata {
    fn is_error_table(&self) -> bool {
        self.columns.first().is_some_and(|c| c.name == "error")
    }
}

#[derive(Debug, Default)]
struct Annotations {
    data_types: Vec<String>,
    groups: Vec<String>,
    defaults: Vec<String>,
}

/// 查询结果的游标。只能向前逐行读取，按需解析注解 CSV（annotated CSV）。
///
/// # Examples
///
/// ```ignore
/// let mut result = client.from_bucket("test").range_recent("-1h").query().send().await?;
/// while let Some(record) = result.next() {
///     let record = record?;
///     println!("{:?} {:?} {:?}", record.field(), record.value(), record.time());
/// }
/// ```
pub struct QueryTableResult {
    reader: csv::Reader<Cursor<Vec<u8>>>,
    annotations: Annotations,
    table: Option<FluxTableMetadata>,
    tables_seen: usize,
    last_table_id: Option<usize>,
    expect_header: bool,
    table_changed: bool,
    done: bool,
}

impl std::fmt::Debug for QueryTableResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryTableResult")
            .field("table", &self.table)
            .field("tables_seen", &self.tables_seen)
            .field("done", &self.done)
            .finish()
    }
}

impl QueryTableResult {
    /// 从查询接口返回的 CSV 数据构建游标
    pub fn from_csv(body: impl Into<Vec<u8>>) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(Cursor::new(body.into()));

        Self {
            reader,
            annotations: Annotations::default(),
            table: None,
            tables_seen: 0,
            last_table_id: None,
            expect_header: true,
            table_changed: false,
            done: false,
        }
    }

    /// 当前所在表的定义
    pub fn table_metadata(&self) -> Option<&FluxTableMetadata> {
        self.table.as_ref()
    }

    /// 最近一次读取的行是否是一张新表的第一行。
    ///
    /// 结构相同的多张表共用一个注解块，只有 `table` 列不同，所以按照 `table` 列的值判断
    pub fn table_changed(&self) -> bool {
        self.table_changed
    }

    fn start_table(&mut self, header: &StringRecord) {
        let Annotations { data_types, groups, defaults } = std::mem::take(&mut self.annotations);

        let columns = header
            .iter()
            .skip(1)
            .enumerate()
            .map(|(i, name)| FluxColumn {
                name: name.to_string(),
                data_type: data_types.get(i).cloned().unwrap_or_else(|| "string".to_string()),
                group: groups.get(i).is_some_and(|g| g == "true"),
                default_value: defaults.get(i).cloned().unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        log::debug!("start table {} with columns: {:?}", self.tables_seen, columns);

        self.table = Some(FluxTableMetadata {
            position: self.tables_seen,
            columns,
        });
        self.tables_seen += 1;
        self.expect_header = false;
    }

    fn read_next(&mut self) -> InfluxResult<Option<FluxRecord>> {
        let mut row = StringRecord::new();

        loop {
            if !self.reader.read_record(&mut row)? {
                return Ok(None);
            }

            if row.iter().all(|s| s.is_empty()) {
                continue;
            }

            let first = row.get(0).unwrap_or("");

            if first.starts_with('#') {
                let rest = row.iter().skip(1).map(|s| s.to_string()).collect::<Vec<_>>();
                match first {
                    "#datatype" => self.annotations.data_types = rest,
                    "#group" => self.annotations.groups = rest,
                    "#default" => self.annotations.defaults = rest,
                    other => log::debug!("ignore unknown annotation: {}", other),
                }
                self.expect_header = true;
                continue;
            }

            if self.expect_header || self.table.is_none() {
                self.start_table(&row);
                continue;
            }

            let Some(table) = &self.table else {
                continue;
            };

            if table.is_error_table() {
                let message = row.get(1).unwrap_or("").to_string();
                let reference = row.get(2).unwrap_or("");
                return Err(InfluxError::QueryFailed(if reference.is_empty() {
                    message
                } else {
                    format!("{} (reference: {})", message, reference)
                }));
            }

            let values: HashMap<String, Value> = table
                .columns
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    let cell = row.get(i + 1).unwrap_or("");
                    let text = if cell.is_empty() { col.default_value.as_str() } else { cell };
                    let value = if text.is_empty() { Value::Null } else { Value::parse(&col.data_type, text) };
                    (col.name.clone(), value)
                })
                .collect();

            // 没有 `table` 列的时候退回到注解块的序号
            let table_id = match values.get("table") {
                Some(Value::Long(n)) => usize::try_from(*n).unwrap_or(table.position),
                _ => table.position,
            };

            if self.last_table_id != Some(table_id) {
                self.last_table_id = Some(table_id);
                self.table_changed = true;
            }

            return Ok(Some(FluxRecord { table: table_id, values }));
        }
    }
}

impl Iterator for QueryTableResult {
    type Item = InfluxResult<FluxRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.table_changed = false;

        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
