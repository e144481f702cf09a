//! # Local Runner Module / 本地运行器模块
//!
//! A runner provider backed by the current machine. Each acquired lease owns
//! a fresh temporary workspace that is deleted when the lease is released or
//! dropped.
//!
//! 基于当前机器的运行器提供者。每个获取的租约拥有一个新的临时工作区，
//! 在租约释放或被丢弃时删除。

use async_trait::async_trait;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::core::error::EnvironmentError;
use crate::core::job::JobSpec;
use crate::core::runner::{RunnerLease, RunnerProvider};
use crate::infra::fs;

/// Serves selectors that describe the host: `local`, `self-hosted`, the host
/// OS name, vendor image names such as `ubuntu-latest` or `macos-14` that map
/// to the host OS, and any extra labels configured.
///
/// 服务于描述主机的选择器：`local`、`self-hosted`、主机操作系统名称、
/// 映射到主机操作系统的供应商镜像名称（如 `ubuntu-latest` 或 `macos-14`），
/// 以及配置的任何额外标签。
#[derive(Debug, Clone, Default)]
pub struct LocalRunnerProvider {
    extra_labels: Vec<String>,
    seed_from: Option<PathBuf>,
}

impl LocalRunnerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_labels
            .extend(labels.into_iter().map(|l| l.into().to_lowercase()));
        self
    }

    /// Copy `project` into every workspace before the first step runs.
    pub fn seed_from(mut self, project: impl Into<PathBuf>) -> Self {
        self.seed_from = Some(project.into());
        self
    }

    pub fn matches(&self, selector: &str) -> bool {
        let selector = selector.trim().to_lowercase();
        if selector.is_empty() {
            return false;
        }
        if selector == "local" || selector == "self-hosted" {
            return true;
        }
        if self.extra_labels.iter().any(|l| *l == selector) {
            return true;
        }
        platform_of(&selector) == Some(env::consts::OS)
    }
}

/// Maps a selector to the OS name reported by `std::env::consts::OS`.
fn platform_of(selector: &str) -> Option<&'static str> {
    let family = selector.split('-').next().unwrap_or(selector);
    match family {
        "linux" | "ubuntu" | "debian" | "fedora" => Some("linux"),
        "macos" | "mac" | "darwin" | "osx" => Some("macos"),
        "windows" | "win" => Some("windows"),
        _ => None,
    }
}

#[async_trait]
impl RunnerProvider for LocalRunnerProvider {
    async fn acquire(
        &self,
        selector: &str,
        job: &JobSpec,
    ) -> Result<Box<dyn RunnerLease>, EnvironmentError> {
        if !self.matches(selector) {
            return Err(EnvironmentError::RunnerUnavailable {
                selector: selector.to_string(),
            });
        }

        let provisioning = |e: anyhow::Error| EnvironmentError::Provisioning {
            selector: selector.to_string(),
            message: format!("{e:#}"),
        };

        let workspace = fs::create_workspace(&job.id).map_err(provisioning)?;
        if let Some(project) = &self.seed_from {
            fs::copy_project(project, workspace.path()).map_err(provisioning)?;
        }

        let label = format!("local:{}", env::consts::OS);
        debug!(job = %job.id, runner = %label, workspace = %workspace.path().display(), "runner acquired");
        Ok(Box::new(LocalLease { label, workspace }))
    }
}

pub struct LocalLease {
    label: String,
    workspace: TempDir,
}

#[async_trait]
impl RunnerLease for LocalLease {
    fn label(&self) -> &str {
        &self.label
    }

    fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    async fn release(self: Box<Self>) -> Result<(), EnvironmentError> {
        let LocalLease { label, workspace } = *self;
        workspace.close().map_err(|e| EnvironmentError::Release {
            label,
            message: e.to_string(),
        })
    }
}
