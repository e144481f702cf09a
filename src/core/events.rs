//! # Run Events Module / 运行事件模块
//!
//! Job-state transition events and the reporting sink interface. Executors
//! send one [`JobEvent`] per transition over an unbounded channel; the
//! coordinator forwards each event to every registered [`ReportSink`] and
//! calls [`ReportSink::run_finished`] once with the final record.
//!
//! 作业状态转换事件和报告接收器接口。执行器在每次状态转换时通过无界通道
//! 发送一个 [`JobEvent`]；协调器将每个事件转发给所有已注册的 [`ReportSink`]，
//! 并在运行结束时调用一次 [`ReportSink::run_finished`]。

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::coordinator::RunRecord;
use crate::core::job::JobStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub job_index: usize,
    pub job_id: String,
    pub job_name: String,
    pub from: JobStatus,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
    /// Runner label on `Running`, error or cancel reason on terminal states.
    pub detail: Option<String>,
}

pub type EventSender = mpsc::UnboundedSender<JobEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<JobEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Receives status updates from the coordinator. Format and transport are
/// up to the implementation.
///
/// 接收来自协调器的状态更新。格式和传输方式由实现决定。
pub trait ReportSink: Send + Sync {
    fn job_transition(&self, event: &JobEvent);

    fn run_finished(&self, record: &RunRecord);
}

/// Emits every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn job_transition(&self, event: &JobEvent) {
        match event.to {
            JobStatus::Failed => warn!(
                job = %event.job_id,
                from = %event.from,
                to = %event.to,
                detail = event.detail.as_deref().unwrap_or(""),
                "job transition"
            ),
            _ => info!(
                job = %event.job_id,
                from = %event.from,
                to = %event.to,
                detail = event.detail.as_deref().unwrap_or(""),
                "job transition"
            ),
        }
    }

    fn run_finished(&self, record: &RunRecord) {
        let counts = record.counts();
        info!(
            run = %record.run_id(),
            status = %record.status(),
            succeeded = counts.succeeded,
            failed = counts.failed,
            cancelled = counts.cancelled,
            "run finished"
        );
    }
}
