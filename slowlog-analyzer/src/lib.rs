//! 慢查询日志分析
//!
//! 提供以下功能：
//! - 通过日志服务（日志组 / 日志流 / 日志事件）拉取数据库日志
//! - 按优先级匹配多种日志格式，提取慢查询记录
//! - 汇总统计（平均/最大/最小耗时、耗时分布、Top 10）

pub mod analyzer;
pub mod parser;
pub mod report;
pub mod source;

pub use analyzer::SlowQueryLogAnalyzer;
pub use parser::SlowQueryParser;
pub use report::aggregate;
pub use source::{LogEvent, LogSource, StaticLogSource};
