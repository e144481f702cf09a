//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for job workspaces: creating a unique
//! temporary directory per job and seeding it with a copy of the project.
//!
//! 此模块提供作业工作区的实用功能：为每个作业创建唯一的临时目录，
//! 并用项目副本填充它。

use anyhow::{Context, Result};
use fs_extra::dir::CopyOptions;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Directory names never copied into a workspace.
const SKIPPED_ENTRIES: &[&str] = &[".git", "target"];

/// Creates a unique, temporary workspace directory for a job. The directory
/// is removed when the returned `TempDir` is dropped or closed.
///
/// # Arguments
/// * `job_id` - Identifier of the job, used to build a readable prefix
///
/// # Returns
/// The `TempDir` guard owning the workspace
pub fn create_workspace(job_id: &str) -> Result<TempDir> {
    let sanitized_name = job_id
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();

    tempfile::Builder::new()
        .prefix(&format!("matrix_ci_{sanitized_name}_"))
        .tempdir()
        .with_context(|| format!("Failed to create workspace for job {job_id}"))
}

/// Copies the content of `from` into `to`, skipping VCS metadata and build
/// output.
///
/// # Arguments
/// * `from` - Source directory path
/// * `to` - Destination directory path, which must exist
pub fn copy_project(from: &Path, to: &Path) -> Result<()> {
    let entries: Vec<PathBuf> = fs::read_dir(from)
        .with_context(|| format!("Failed to read project directory: {}", from.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_none_or(|name| !SKIPPED_ENTRIES.contains(&name))
        })
        .collect();

    if entries.is_empty() {
        return Ok(());
    }

    let mut options = CopyOptions::new();
    options.overwrite = true;
    fs_extra::copy_items(&entries, to, &options).with_context(|| {
        format!(
            "Failed to copy {} into {}",
            from.display(),
            to.display()
        )
    })?;
    Ok(())
}

/// Gets the absolute path from a potentially relative path.
///
/// # Arguments
/// * `path` - Path to canonicalize
///
/// # Returns
/// Canonicalized absolute path, or an error if the path doesn't exist
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}
