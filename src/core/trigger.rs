//! Trigger context: the event that caused a run. The coordinator passes it
//! through to jobs untouched; deciding whether an event starts a run at all is
//! the caller's job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    Manual,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => f.write_str("push"),
            EventKind::PullRequest => f.write_str("pull_request"),
            EventKind::Manual => f.write_str("manual"),
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" | "pull-request" => Ok(EventKind::PullRequest),
            "manual" | "workflow_dispatch" => Ok(EventKind::Manual),
            other => Err(format!("unknown event kind '{other}'")),
        }
    }
}

/// The event descriptor a run was started for.
/// 启动运行的事件描述。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub event: EventKind,
    /// Repository reference, e.g. a path or `owner/name`.
    pub repository: String,
    /// Branch or tag ref, e.g. `refs/heads/main`.
    pub git_ref: String,
    pub commit: Option<String>,
}

impl TriggerContext {
    pub fn manual(repository: impl Into<String>) -> Self {
        Self {
            event: EventKind::Manual,
            repository: repository.into(),
            git_ref: String::new(),
            commit: None,
        }
    }
}
