//! # Init Command Module / 初始化命令模块
//!
//! This module implements the `init` command for the Matrix CI CLI, which
//! creates a new workflow file either from a commented template or through
//! an interactive wizard.
//!
//! 此模块实现了 Matrix CI CLI 的 `init` 命令，
//! 通过带注释的模板或交互式向导创建新的工作流文件。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use indexmap::IndexMap;
use std::{fs, path::Path};

use crate::core::config::{MatrixDefinition, StepDefinition, Workflow};
use crate::core::matrix::MatrixValue;
use crate::infra::t;

const DEFAULT_WORKFLOW: &str = r#"# Matrix CI workflow / Matrix CI 工作流

# Workflow name, used as the prefix of every job name / 工作流名称
name = "ci"
# Language for output messages / 输出消息的语言
language = "en"
# Events this workflow runs for (empty = all) / 响应的事件（为空表示全部）
on = ["push", "pull_request", "manual"]
# Runner selector; may use matrix values / 运行器选择器，可使用矩阵值
runs_on = "${{ matrix.os }}"
# Cancel remaining jobs on the first failure / 首次失败时取消剩余作业
fail_fast = true
# max_parallel = 4
# timeout_secs = 1800

[env]
RUST_BACKTRACE = "1"

# Every key is an axis / 每个键都是一个轴
[matrix]
os = ["local"]
toolchain = ["stable", "beta"]

# Add an extra job / 添加额外作业
[[matrix.include]]
os = "local"
toolchain = "nightly"
experimental = true

[actions]
"rust/toolchain" = "rustup toolchain install ${{ inputs.toolchain }}"

[[steps]]
name = "Install toolchain"
uses = "rust/toolchain@v1"
with = { toolchain = "${{ matrix.toolchain }}" }

[[steps]]
name = "Test"
run = "cargo +${{ matrix.toolchain }} test"
retries = 1
timeout_secs = 900
"#;

/// Creates a workflow file at `output`.
///
/// # Arguments
/// * `output` - Path for the new workflow file
/// * `locale` - Language for prompts and messages
/// * `non_interactive` - Write the default template without prompting
pub fn execute(output: &Path, locale: &str, non_interactive: bool) -> Result<()> {
    if non_interactive {
        if output.exists() {
            anyhow::bail!(
                t!("init.file_exists", locale = locale, path = output.display()).to_string()
            );
        }
        write_workflow(output, DEFAULT_WORKFLOW, locale)?;
    } else {
        run_init_wizard(output, locale)?;
    }
    Ok(())
}

/// Runs the interactive wizard to generate a workflow file.
pub fn run_init_wizard(output: &Path, locale: &str) -> Result<()> {
    let theme = ColorfulTheme::default();
    println!("\n{}", t!("init.wizard_welcome", locale = locale).bold().cyan());
    println!("{}\n", t!("init.wizard_description", locale = locale));

    if output.exists() {
        let overwrite = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = locale, path = output.display()))
            .default(false)
            .interact()
            .context(t!("init.user_confirmation_failed", locale = locale).to_string())?;
        if !overwrite {
            println!("{}", t!("init.aborted", locale = locale).yellow());
            return Ok(());
        }
    }

    let name: String = Input::with_theme(&theme)
        .with_prompt(t!("init.name_prompt", locale = locale))
        .default("ci".to_string())
        .interact_text()?;
    let axis: String = Input::with_theme(&theme)
        .with_prompt(t!("init.axis_prompt", locale = locale))
        .default("toolchain".to_string())
        .allow_empty(true)
        .interact_text()?;
    let values: String = if axis.trim().is_empty() {
        String::new()
    } else {
        Input::with_theme(&theme)
            .with_prompt(t!("init.values_prompt", locale = locale, axis = axis.trim()))
            .default("stable, beta".to_string())
            .interact_text()?
    };
    let command: String = Input::with_theme(&theme)
        .with_prompt(t!("init.command_prompt", locale = locale))
        .default("cargo test".to_string())
        .interact_text()?;
    let fail_fast = Confirm::with_theme(&theme)
        .with_prompt(t!("init.fail_fast_prompt", locale = locale))
        .default(true)
        .interact()?;

    let workflow = build_workflow(&name, &axis, &values, &command, fail_fast, locale);
    let toml_string = toml::to_string_pretty(&workflow)
        .context(t!("init.serialize_failed", locale = locale).to_string())?;
    write_workflow(output, &toml_string, locale)
}

/// Assembles the workflow produced by the wizard's answers. An empty axis
/// name produces a workflow without a matrix.
pub fn build_workflow(
    name: &str,
    axis: &str,
    values: &str,
    command: &str,
    fail_fast: bool,
    locale: &str,
) -> Workflow {
    let axis = axis.trim();
    let matrix = (!axis.is_empty()).then(|| {
        let values: Vec<MatrixValue> = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(MatrixValue::from)
            .collect();
        MatrixDefinition {
            axes: IndexMap::from([(axis.to_string(), values)]),
            ..Default::default()
        }
    });

    Workflow {
        name: name.trim().to_string(),
        language: locale.to_string(),
        on: Vec::new(),
        runs_on: "local".to_string(),
        fail_fast,
        max_parallel: None,
        timeout_secs: None,
        env: IndexMap::new(),
        matrix,
        actions: IndexMap::new(),
        artifacts: Default::default(),
        steps: vec![StepDefinition {
            name: Some("Test".to_string()),
            run: Some(command.trim().to_string()),
            ..Default::default()
        }],
    }
}

fn write_workflow(output: &Path, content: &str, locale: &str) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            t!("init.create_parent_dir_failed", locale = locale, path = parent.display()).to_string()
        })?;
    }
    fs::write(output, content).with_context(|| {
        t!("init.write_failed", locale = locale, path = output.display()).to_string()
    })?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init.success_created", locale = locale, path = output.display()).bold()
    );
    println!("{}", t!("init.usage_hint", locale = locale));
    Ok(())
}
