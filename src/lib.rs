//! # Matrix CI Library / Matrix CI 库
//!
//! This library provides the core of the Matrix CI tool, a configuration-driven
//! CI orchestrator that expands a job matrix and runs every combination in
//! parallel with fail-fast control.
//!
//! 此库为 Matrix CI 工具提供核心功能，
//! 这是一个配置驱动的 CI 编排器，它展开作业矩阵并在快速失败控制下并行运行每个组合。
//!
//! ## Modules / 模块
//!
//! - `core` - Matrix expansion, job model, executor, scheduler and run coordinator
//! - `infra` - Local collaborators: process spawning, runner workspaces, file system
//! - `reporting` - Console, JSON Lines and HTML reporting sinks
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 矩阵展开、作业模型、执行器、调度器和运行协调器
//! - `infra` - 本地协作者：进程派生、运行器工作区、文件系统
//! - `reporting` - 控制台、JSON Lines 和 HTML 报告接收器
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::matrix;
pub use core::{JobSpec, JobStatus, RunCoordinator, RunRecord, RunStatus, Workflow};

/// Resolves the language for user-facing messages.
///
/// An explicit request (from `--lang` or the workflow's `language`) wins,
/// then the system locale. The full locale (e.g. "zh-CN") is tried first,
/// then just the language code (e.g. "en"), and finally "en".
///
/// 解析面向用户消息的语言。
/// 显式请求（来自 `--lang` 或工作流的 `language`）优先，其次是系统语言环境。
pub fn resolve_locale(requested: Option<&str>) -> String {
    let locale = requested
        .map(str::to_string)
        .or_else(sys_locale::get_locale)
        .unwrap_or_else(|| "en".to_string());
    let available_locales = rust_i18n::available_locales!();

    if available_locales.iter().any(|l| *l == locale) {
        return locale;
    }
    locale
        .split(['-', '_'])
        .next()
        .and_then(|code| available_locales.iter().find(|l| **l == code || l.starts_with(&format!("{code}-"))))
        .map(|l| l.to_string())
        .unwrap_or_else(|| "en".to_string())
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
