//! # Infrastructure Module / 基础设施模块
//!
//! This module provides the default local collaborators for the
//! orchestrator: a process-spawning step runner, a runner provider backed by
//! temporary workspaces, file system helpers, and diagnostic logging setup.
//!
//! 此模块为编排器提供默认的本地协作者：
//! 派生进程的步骤运行器、基于临时工作区的运行器提供者以及文件系统辅助函数。

pub mod command;
pub mod fs;
pub mod runner;
pub mod telemetry;

pub use command::ShellStepRunner;
pub use runner::LocalRunnerProvider;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
