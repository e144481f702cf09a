//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command for the Matrix CI CLI, which
//! expands the workflow matrix and runs every job on local runners.
//!
//! 此模块实现了 Matrix CI CLI 的 `run` 命令，
//! 展开工作流矩阵并在本地运行器上运行每个作业。

use anyhow::{Context, Result};
use colored::*;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::signal;

use crate::{
    core::{
        cancel::CancelSignal,
        config,
        coordinator::{RunCoordinator, RunOptions, RunStatus},
        error::CancelReason,
        events::TracingSink,
        planner::{self, Shard},
        trigger::{EventKind, TriggerContext},
    },
    infra::{LocalRunnerProvider, ShellStepRunner, fs, t},
    reporting::{ConsoleSink, JsonLinesSink, generate_html_report},
};

/// Arguments of the `run` subcommand.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    pub jobs: Option<usize>,
    pub project_dir: PathBuf,
    pub timeout_secs: Option<u64>,
    pub event: EventKind,
    pub git_ref: Option<String>,
    pub sha: Option<String>,
    pub labels: Vec<String>,
    pub shard: Option<Shard>,
    pub html: Option<PathBuf>,
    pub events_log: Option<PathBuf>,
    /// Language given on the command line; overrides the workflow's.
    pub lang: Option<String>,
}

/// Executes the run command with the provided arguments.
///
/// # Returns
/// An error if the workflow cannot be loaded or is invalid, or if the run
/// does not succeed.
pub async fn execute(args: RunArgs) -> Result<()> {
    let config_path = fs::absolute_path(&args.config)?;
    let workflow = config::load_workflow(&config_path)?;

    let locale = crate::resolve_locale(Some(args.lang.as_deref().unwrap_or(&workflow.language)));
    rust_i18n::set_locale(&locale);

    println!(
        "{}",
        t!("run.loading_workflow", locale = locale, path = config_path.display())
    );

    if !workflow.accepts(args.event) {
        println!(
            "{}",
            t!(
                "run.event_not_accepted",
                locale = locale,
                name = &workflow.name,
                event = args.event
            )
            .yellow()
        );
        return Ok(());
    }

    let project_root = fs::absolute_path(&args.project_dir)?;
    let plan = planner::plan_execution(&workflow, args.shard)?;
    match args.shard {
        Some(Shard { index, total }) => println!(
            "{}",
            t!(
                "run.running_as_split_runner",
                locale = locale,
                index = index + 1,
                total = total,
                count = plan.jobs.len()
            )
            .bold()
        ),
        None => println!(
            "{}",
            t!("run.running_as_single_runner", locale = locale, count = plan.jobs.len()).bold()
        ),
    }
    if plan.jobs.is_empty() {
        println!("{}", t!("run.no_jobs_to_run", locale = locale).green());
        return Ok(());
    }

    let provider = LocalRunnerProvider::new()
        .with_labels(args.labels)
        .seed_from(project_root.clone());
    let mut coordinator = RunCoordinator::new(Arc::new(provider), Arc::new(ShellStepRunner))
        .with_options(RunOptions {
            max_parallel: args.jobs,
            timeout: args.timeout_secs.map(Duration::from_secs),
            shard: args.shard,
        })
        .with_sink(Arc::new(ConsoleSink::new(locale.clone())))
        .with_sink(Arc::new(TracingSink));
    if let Some(path) = &args.events_log {
        coordinator = coordinator.with_sink(Arc::new(JsonLinesSink::create(path)?));
    }

    setup_signal_handler(coordinator.cancel_signal(), &locale);

    let trigger = TriggerContext {
        event: args.event,
        repository: project_root.display().to_string(),
        git_ref: args.git_ref.unwrap_or_default(),
        commit: args.sha,
    };
    let record = coordinator
        .run_plan(trigger, &workflow, plan)
        .await
        .context(t!("run.invalid_workflow", locale = locale).to_string())?;

    if let Some(report_path) = &args.html {
        println!(
            "\n{}",
            t!("run.generating_html", locale = locale, path = report_path.display())
        );
        if let Err(e) = generate_html_report(&record, report_path, &locale) {
            eprintln!("{} {:#}", t!("run.html_failed", locale = locale).red(), e);
        }
    }

    match record.status() {
        RunStatus::Succeeded => Ok(()),
        status => anyhow::bail!(
            t!("run.run_not_succeeded", locale = locale, status = status).to_string()
        ),
    }
}

/// Cancels the run with `Interrupted` on the first Ctrl-C.
fn setup_signal_handler(cancel: CancelSignal, locale: &str) {
    let locale = locale.to_string();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() && cancel.cancel(CancelReason::Interrupted) {
            println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
        }
    });
}
