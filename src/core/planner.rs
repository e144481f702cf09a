//! # Job Planning Module / 作业计划模块
//!
//! Turns a validated workflow into the list of job specifications to run,
//! optionally keeping only the share assigned to one of several CI runners.
//!
//! 将经过验证的工作流转换为要运行的作业规范列表，
//! 并可选择仅保留分配给多个 CI 运行器之一的部分。

use serde::Serialize;

use crate::core::config::Workflow;
use crate::core::error::SpecificationError;
use crate::core::job::JobSpec;
use crate::core::matrix::{self, Combination, Origin};

/// A slice of the job list for distributed execution: this runner takes
/// every job whose index modulo `total` equals `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub index: usize,
    pub total: usize,
}

/// Represents the complete execution plan for a workflow.
/// 表示工作流的完整执行计划。
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    /// Jobs to run, in expansion order. / 要运行的作业，按展开顺序排列。
    pub jobs: Vec<JobSpec>,
    /// Size of the bare cross product before include/exclude adjustments.
    /// include/exclude 调整前的笛卡尔积大小。
    pub cross_product_size: usize,
    /// Jobs added by include entries that matched no combination.
    pub standalone_count: usize,
    /// Jobs left out because they belong to another shard.
    pub skipped_by_shard: usize,
}

/// Validates the workflow, expands its matrix, and builds one job
/// specification per combination.
///
/// A workflow without a `[matrix]` section runs a single job with no
/// attributes.
///
/// 验证工作流，展开其矩阵，并为每个组合构建一个作业规范。
/// 没有 `[matrix]` 部分的工作流运行一个没有属性的作业。
pub fn plan_execution(
    workflow: &Workflow,
    shard: Option<Shard>,
) -> Result<ExecutionPlan, SpecificationError> {
    workflow.validate()?;

    let (combinations, cross_product_size) = match &workflow.matrix {
        Some(definition) => {
            let spec = definition.to_spec();
            (matrix::expand(&spec)?, matrix::cross_product_size(&spec.axes))
        }
        None => (
            vec![Combination {
                attributes: Default::default(),
                origin: Origin::CrossProduct,
            }],
            1,
        ),
    };

    let standalone_count = combinations
        .iter()
        .filter(|c| matches!(c.origin, Origin::Included { .. }))
        .count();

    let all_jobs: Vec<JobSpec> = combinations
        .iter()
        .enumerate()
        .map(|(index, combination)| JobSpec::from_combination(workflow, index, combination))
        .collect();
    let total_jobs = all_jobs.len();

    let jobs = match shard {
        Some(Shard { index, total }) => {
            if total == 0 || index >= total {
                return Err(SpecificationError::InvalidShard { index, total });
            }
            all_jobs
                .into_iter()
                .filter(|job| job.index % total == index)
                .collect()
        }
        None => all_jobs,
    };

    Ok(ExecutionPlan {
        skipped_by_shard: total_jobs - jobs.len(),
        jobs,
        cross_product_size,
        standalone_count,
    })
}
