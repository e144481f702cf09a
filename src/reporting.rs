//! # Reporting Module / 报告模块
//!
//! This module turns job transitions and finished runs into output for humans
//! and tools: colourful console lines, a JSON Lines event log, and a
//! standalone HTML page.
//!
//! 此模块将作业状态转换和完成的运行转换为面向人和工具的输出：
//! 彩色控制台行、JSON Lines 事件日志以及独立的 HTML 页面。

pub mod console;
pub mod html;
pub mod json;

// Re-export common reporting items
pub use console::{ConsoleSink, print_failure_details, print_summary};
pub use html::generate_html_report;
pub use json::JsonLinesSink;
