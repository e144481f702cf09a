//! # Job Model Module / 作业模型模块
//!
//! Job specifications produced from expanded matrix combinations, their
//! resolved steps, and the job state machine.
//!
//! 由展开的矩阵组合生成的作业规范、其解析后的步骤以及作业状态机。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::config::{
    ArtifactSettings, DEFAULT_RETRY_BACKOFF_MS, MAX_STEP_RETRIES, StepDefinition, Workflow,
};
use crate::core::error::InvalidTransition;
use crate::core::matrix::{Attributes, Combination};

/// Lifecycle state of one job.
///
/// ```text
/// Pending ──> Running ──> Succeeded | Failed | Cancelled
///    └──────> Failed | Cancelled
/// ```
///
/// `Pending -> Failed` happens when no runner target can be acquired.
/// `Pending -> Failed` 发生在无法获取运行目标时。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Returns `next` if the edge exists in the state machine.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What a step does once matrix values have been substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// An inline command.
    Run {
        command: String,
        shell: Option<String>,
    },
    /// An action identifier. `command` is set when the workflow registers a
    /// command template for the action.
    Uses {
        action: String,
        command: Option<String>,
        shell: Option<String>,
    },
}

impl StepAction {
    pub fn describe(&self) -> &str {
        match self {
            StepAction::Run { command, .. } => command,
            StepAction::Uses { action, .. } => action,
        }
    }
}

/// A resolved step, ready to be handed to a step runner.
/// 已解析的步骤，可以交给步骤运行器执行。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub action: StepAction,
    pub params: IndexMap<String, String>,
    pub env: IndexMap<String, String>,
    pub working_directory: Option<String>,
    pub continue_on_error: bool,
    pub retries: u8,
    pub retry_backoff_ms: u64,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub record_artifacts: bool,
}

/// One fully resolved, executable unit of the matrix. Created once at
/// expansion time and never mutated afterwards.
///
/// 矩阵中一个完全解析的可执行单元。在展开时创建一次，之后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Position in the expanded job list. / 在展开作业列表中的位置。
    pub index: usize,
    pub id: String,
    pub name: String,
    pub attributes: Attributes,
    /// Resolved runner selector. / 解析后的运行器选择器。
    pub runs_on: String,
    pub env: IndexMap<String, String>,
    pub steps: Vec<Step>,
    /// Settings for steps that record artifacts.
    #[serde(default, skip_serializing_if = "ArtifactSettings::is_default")]
    pub artifacts: ArtifactSettings,
}

impl JobSpec {
    /// Builds the job for one expanded combination, substituting
    /// `${{ matrix.<key> }}` placeholders in the runner selector, env values,
    /// step commands and step parameters.
    ///
    /// 为一个展开的组合构建作业，替换运行器选择器、环境变量值、
    /// 步骤命令和步骤参数中的 `${{ matrix.<key> }}` 占位符。
    pub fn from_combination(workflow: &Workflow, index: usize, combination: &Combination) -> Self {
        let matrix: IndexMap<String, String> = combination
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        let render = |template: &str| render_template(template, "matrix", &matrix);

        let name = if combination.attributes.is_empty() {
            workflow.name.clone()
        } else {
            format!("{} ({})", workflow.name, combination.label())
        };

        let env = workflow
            .env
            .iter()
            .map(|(k, v)| (k.clone(), render(v)))
            .collect();

        let steps = workflow
            .steps
            .iter()
            .map(|definition| resolve_step(workflow, definition, &render))
            .collect();

        Self {
            index,
            id: format!("{}-{}", workflow.name, index + 1),
            name,
            attributes: combination.attributes.clone(),
            runs_on: render(&workflow.runs_on),
            env,
            steps,
            artifacts: workflow.artifacts.clone(),
        }
    }
}

fn resolve_step(
    workflow: &Workflow,
    definition: &StepDefinition,
    render: &impl Fn(&str) -> String,
) -> Step {
    let params: IndexMap<String, String> = definition
        .with
        .iter()
        .map(|(k, v)| (k.clone(), render(&v.to_string())))
        .collect();

    let action = match (&definition.run, &definition.uses) {
        (Some(run), _) => StepAction::Run {
            command: render(run),
            shell: definition.shell.clone(),
        },
        (None, Some(uses)) => {
            let action_id = uses.split('@').next().unwrap_or(uses);
            let command = workflow
                .actions
                .get(action_id)
                .map(|template| render_template(&render(template), "inputs", &params));
            StepAction::Uses {
                action: uses.clone(),
                command,
                shell: definition.shell.clone(),
            }
        }
        // Rejected by `Workflow::validate` before jobs are built.
        (None, None) => StepAction::Run {
            command: String::new(),
            shell: None,
        },
    };

    Step {
        name: render(&definition.display_name()),
        action,
        params,
        env: definition
            .env
            .iter()
            .map(|(k, v)| (k.clone(), render(v)))
            .collect(),
        working_directory: definition.working_directory.as_deref().map(render),
        continue_on_error: definition.continue_on_error,
        retries: definition.retries.unwrap_or(0).min(MAX_STEP_RETRIES),
        retry_backoff_ms: definition
            .retry_backoff_ms
            .unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
        timeout_secs: definition.timeout_secs,
        record_artifacts: definition.record_artifacts,
    }
}

/// Replaces every `${{ <namespace>.<key> }}` in `template` with the value of
/// `key`. Missing keys render as an empty string; placeholders for other
/// namespaces are left untouched.
///
/// 将 `template` 中的每个 `${{ <namespace>.<key> }}` 替换为 `key` 的值。
/// 缺失的键渲染为空字符串；其他命名空间的占位符保持不变。
pub fn render_template(template: &str, namespace: &str, values: &IndexMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${{") {
        let Some(len) = rest[start..].find("}}") else {
            break;
        };
        let end = start + len;
        let expr = rest[start + 3..end].trim();
        out.push_str(&rest[..start]);

        match expr.split_once('.') {
            Some((ns, key)) if ns.trim() == namespace => {
                if let Some(value) = values.get(key.trim()) {
                    out.push_str(value);
                }
            }
            _ => out.push_str(&rest[start..end + 2]),
        }
        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    out
}
