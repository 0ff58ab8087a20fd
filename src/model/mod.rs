//! 数据模型：写入的数据点、查询结果

mod point;
mod query_result;
mod record;

pub use point::*;
pub use query_result::*;
pub use record::*;
