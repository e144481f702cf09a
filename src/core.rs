//! # Core Module / 核心模块
//!
//! This module contains the orchestrator itself: workflow configuration,
//! matrix expansion, the job model and state machine, the job executor, the
//! scheduler, and the run coordinator.
//!
//! 此模块包含编排器本身：工作流配置、矩阵展开、作业模型与状态机、
//! 作业执行器、调度器以及运行协调器。

pub mod artifacts;
pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod executor;
pub mod job;
pub mod matrix;
pub mod planner;
pub mod runner;
pub mod scheduler;
pub mod trigger;

// Re-exports
pub use config::Workflow;
pub use coordinator::{RunCoordinator, RunRecord, RunStatus};
pub use job::{JobSpec, JobStatus};
pub use matrix::expand;
