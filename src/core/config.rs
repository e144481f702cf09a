//! # Workflow Configuration Module / 工作流配置模块
//!
//! Defines the TOML workflow file format and loads it into explicit
//! configuration structs that are passed to the expander and coordinator.
//!
//! 定义 TOML 工作流文件格式，并将其加载为显式配置结构体，
//! 传递给展开器和协调器。

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::artifacts::ArtifactRecorder;
use crate::core::error::SpecificationError;
use crate::core::matrix::{Attributes, Axis, MatrixSpec, MatrixValue};
use crate::core::trigger::EventKind;

/// The matrix section of a workflow. Every key other than `include` and
/// `exclude` is an axis, kept in the order it appears in the file.
///
/// 工作流的矩阵部分。除 `include` 和 `exclude` 之外的每个键都是一个轴，
/// 并保持其在文件中出现的顺序。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MatrixDefinition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<Attributes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<Attributes>,
    #[serde(flatten)]
    pub axes: IndexMap<String, Vec<MatrixValue>>,
}

impl MatrixDefinition {
    /// Converts the file representation into the expander's input.
    pub fn to_spec(&self) -> MatrixSpec {
        MatrixSpec {
            axes: self
                .axes
                .iter()
                .map(|(name, values)| Axis {
                    name: name.clone(),
                    values: values.clone(),
                })
                .collect(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
        }
    }
}

/// One step as written in the workflow file, before matrix values are
/// substituted into it.
///
/// 工作流文件中编写的单个步骤（在替换矩阵值之前）。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StepDefinition {
    /// Display name. Defaults to the command or action identifier.
    /// 显示名称。默认为命令或动作标识符。
    #[serde(default)]
    pub name: Option<String>,
    /// Inline command to execute. / 要执行的内联命令。
    #[serde(default)]
    pub run: Option<String>,
    /// Action identifier, resolved through the workflow's `[actions]` table.
    /// 动作标识符，通过工作流的 `[actions]` 表解析。
    #[serde(default)]
    pub uses: Option<String>,
    /// Parameters handed to the action or exposed to the command as `INPUT_*`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub with: IndexMap<String, MatrixValue>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    /// If `true`, a failure of this step is recorded but the job proceeds.
    /// 如果为 `true`，则记录此步骤的失败，但作业继续执行。
    #[serde(default)]
    pub continue_on_error: bool,
    /// How many times to retry this step after a failure. Capped at
    /// [`MAX_STEP_RETRIES`].
    /// 此步骤失败后重试的次数。上限为 [`MAX_STEP_RETRIES`]。
    #[serde(default)]
    pub retries: Option<u8>,
    /// Initial delay between retries; doubles after each attempt.
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Run the command through a shell (`sh`, `bash`, `cmd`, `pwsh`) instead
    /// of splitting it into program and arguments.
    #[serde(default)]
    pub shell: Option<String>,
    /// Working directory relative to the job workspace.
    #[serde(default)]
    pub working_directory: Option<String>,
    /// Hash the workspace files before and after this step and keep both
    /// sets in the step record. See [`ArtifactSettings`].
    /// 在此步骤前后对工作区文件进行哈希，并将两组结果保存在步骤记录中。
    #[serde(default)]
    pub record_artifacts: bool,
}

/// How steps with `record_artifacts = true` hash the job workspace.
///
/// ```toml
/// [artifacts]
/// exclude = ["target/", "*.log"]
/// lstrip_paths = ["build/"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArtifactSettings {
    /// `.gitignore` style patterns for paths left out of the record.
    /// 不计入记录的路径，使用 `.gitignore` 风格的模式。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Prefixes removed from recorded paths. The first matching prefix wins.
    /// 从记录路径中移除的前缀。第一个匹配的前缀生效。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lstrip_paths: Vec<String>,
    /// Hash `\r\n` and `\r` as `\n`.
    #[serde(default)]
    pub normalize_line_endings: bool,
}

impl ArtifactSettings {
    pub fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

pub const MAX_STEP_RETRIES: u8 = 5;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// A complete workflow definition, loaded from a TOML file.
/// 从 TOML 文件加载的完整工作流定义。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Workflow {
    /// Workflow name, used as the prefix of every job name.
    /// 工作流名称，用作每个作业名称的前缀。
    #[serde(default = "default_name")]
    pub name: String,

    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,

    /// Events this workflow runs for. Empty means every event.
    /// 此工作流响应的事件。为空表示所有事件。
    #[serde(default)]
    pub on: Vec<EventKind>,

    /// Runner selector template, e.g. `"${{ matrix.os }}"`.
    /// 运行器选择器模板，例如 `"${{ matrix.os }}"`。
    #[serde(default = "default_runs_on")]
    pub runs_on: String,

    /// Cancel remaining jobs as soon as one fails. Defaults to `true`.
    /// 一旦有作业失败就取消剩余作业。默认为 `true`。
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,

    #[serde(default)]
    pub max_parallel: Option<usize>,

    /// Overall run timeout in seconds. On expiry every unfinished job is
    /// cancelled.
    /// 整体运行超时（秒）。到期时取消所有未完成的作业。
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    #[serde(default)]
    pub matrix: Option<MatrixDefinition>,

    /// Action identifier (without `@version`) to command template.
    /// 动作标识符（不含 `@version`）到命令模板的映射。
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub actions: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "ArtifactSettings::is_default")]
    pub artifacts: ArtifactSettings,

    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

fn default_name() -> String {
    "ci".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_runs_on() -> String {
    "local".to_string()
}

fn default_fail_fast() -> bool {
    true
}

impl Workflow {
    /// Whether a run should be started for `event`.
    pub fn accepts(&self, event: EventKind) -> bool {
        self.on.is_empty() || self.on.contains(&event)
    }

    /// Checks the parts of the workflow that are not covered by matrix
    /// expansion.
    ///
    /// # Errors
    /// Returns a [`SpecificationError`] if there are no steps, a step sets
    /// both or neither of `run` and `uses`, `max_parallel` is zero, or the
    /// `[artifacts]` table does not compile.
    pub fn validate(&self) -> Result<(), SpecificationError> {
        if self.steps.is_empty() {
            return Err(SpecificationError::NoSteps {
                workflow: self.name.clone(),
            });
        }
        if self.max_parallel == Some(0) {
            return Err(SpecificationError::ZeroParallelism);
        }
        ArtifactRecorder::new(&self.artifacts)?;

        for (index, step) in self.steps.iter().enumerate() {
            let invalid = |reason: &str| SpecificationError::InvalidStep {
                index,
                name: step.display_name(),
                reason: reason.to_string(),
            };
            match (&step.run, &step.uses) {
                (Some(_), Some(_)) => return Err(invalid("set either `run` or `uses`, not both")),
                (None, None) => return Err(invalid("one of `run` or `uses` is required")),
                (Some(run), None) if run.trim().is_empty() => {
                    return Err(invalid("`run` must not be empty"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl StepDefinition {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.run.clone())
            .or_else(|| self.uses.clone())
            .unwrap_or_else(|| "unnamed".to_string())
    }
}

/// Parses a workflow from TOML text.
pub fn parse_workflow(content: &str) -> Result<Workflow> {
    let workflow: Workflow = toml::from_str(content).context("Failed to parse workflow TOML")?;
    Ok(workflow)
}

/// Loads and parses a workflow file.
///
/// 加载并解析工作流文件。
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;
    parse_workflow(&content)
        .with_context(|| format!("Invalid workflow file: {}", path.display()))
}
