//! # Plan Command Module / 计划命令模块
//!
//! Shows the jobs a workflow expands into without running anything.
//!
//! 显示工作流展开后的作业，但不运行任何内容。

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;

use crate::core::{
    config,
    planner::{self, Shard},
};
use crate::infra::t;

pub fn execute(config_path: &Path, shard: Option<Shard>, json: bool, locale: &str) -> Result<()> {
    let workflow = config::load_workflow(config_path)?;
    let plan = planner::plan_execution(&workflow, shard)
        .context(t!("run.invalid_workflow", locale = locale).to_string())?;

    if json {
        let output = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
        println!("{output}");
        return Ok(());
    }

    println!(
        "{}",
        t!(
            "plan.header",
            locale = locale,
            name = &workflow.name,
            count = plan.jobs.len(),
            cross = plan.cross_product_size,
            standalone = plan.standalone_count
        )
        .bold()
    );
    if plan.skipped_by_shard > 0 {
        println!(
            "{}",
            t!("plan.skipped_by_shard", locale = locale, count = plan.skipped_by_shard).cyan()
        );
    }

    for job in &plan.jobs {
        println!(
            "  {:>3}. {:<40} {} {}",
            job.index + 1,
            job.name.cyan(),
            t!("plan.runs_on", locale = locale),
            if job.runs_on.is_empty() {
                "-".dimmed()
            } else {
                job.runs_on.normal()
            }
        );
        for step in &job.steps {
            println!("         - {}", step.action.describe().dimmed());
        }
    }
    Ok(())
}
