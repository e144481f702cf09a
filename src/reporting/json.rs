//! # JSON Lines Reporting Module / JSON Lines 报告模块
//!
//! Writes every job transition, then the final run record, as one JSON
//! object per line. Suitable for piping into other tools.
//!
//! 将每次作业状态转换以及最终运行记录按每行一个 JSON 对象写出。

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

use crate::core::coordinator::RunRecord;
use crate::core::events::{JobEvent, ReportSink};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    JobTransition(&'a JobEvent),
    RunFinished(&'a RunRecord),
}

pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create events log: {}", path.display()))?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    fn write_line(&self, line: &Line<'_>) {
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let result = serde_json::to_writer(&mut *writer, line)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        if let Err(e) = result {
            warn!("failed to write events log: {e}");
        }
    }
}

impl ReportSink for JsonLinesSink {
    fn job_transition(&self, event: &JobEvent) {
        self.write_line(&Line::JobTransition(event));
    }

    fn run_finished(&self, record: &RunRecord) {
        self.write_line(&Line::RunFinished(record));
    }
}
