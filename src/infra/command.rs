//! # Command Execution Module / 命令执行模块
//!
//! The default step runner: spawns each step as a local process, captures
//! its standard streams, and enforces the step timeout.
//!
//! 默认的步骤运行器：将每个步骤作为本地进程启动，捕获其标准输出流，
//! 并执行步骤超时。

use async_trait::async_trait;
use indexmap::IndexMap;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::core::error::StepError;
use crate::core::job::StepAction;
use crate::core::runner::{StepInvocation, StepOutput, StepRunner};

/// Runs steps as local processes.
///
/// `run` commands without a `shell` are environment-expanded and split with
/// shell-like quoting rules, then executed directly. With a `shell` they are
/// handed to that shell verbatim. `uses` steps run the command template the
/// workflow registered for the action.
///
/// 以本地进程方式运行步骤。
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellStepRunner;

#[async_trait]
impl StepRunner for ShellStepRunner {
    async fn run(&self, invocation: StepInvocation) -> Result<StepOutput, StepError> {
        let step = invocation.step_name.clone();
        let fault = |message: String| StepError::Fault {
            step: step.clone(),
            message,
        };

        let (command, shell) = match &invocation.action {
            StepAction::Run { command, shell } => (command.as_str(), shell.as_deref()),
            StepAction::Uses {
                action,
                command: Some(command),
                shell,
            } => {
                tracing::debug!(step = %step, action = %action, "running action command");
                (command.as_str(), shell.as_deref())
            }
            StepAction::Uses {
                action,
                command: None,
                ..
            } => {
                return Err(fault(format!(
                    "no command is registered for action '{action}'"
                )));
            }
        };

        let argv = build_argv(command, shell, &invocation.env).map_err(fault)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| fault("empty command after parsing".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .kill_on_drop(true);

        let start = Instant::now();
        let captured = spawn_and_capture(cmd, invocation.timeout)
            .await
            .map_err(|e| fault(format!("failed to run '{program}': {e}")))?;

        match captured {
            Captured::Exited {
                status,
                stdout,
                stderr,
            } => Ok(StepOutput {
                exit_code: status.code(),
                duration: start.elapsed(),
                stdout,
                stderr,
            }),
            Captured::TimedOut(limit) => Err(StepError::TimedOut {
                step,
                secs: limit.as_secs(),
            }),
        }
    }
}

/// Turns a step command into program and arguments.
///
/// 将步骤命令转换为程序及其参数。
pub fn build_argv(
    command: &str,
    shell: Option<&str>,
    env: &IndexMap<String, String>,
) -> Result<Vec<String>, String> {
    if let Some(shell) = shell {
        let flag = match shell {
            "cmd" => "/C",
            "pwsh" | "powershell" => "-Command",
            _ => "-c",
        };
        return Ok(vec![shell.to_string(), flag.to_string(), command.to_string()]);
    }

    let expanded = shellexpand::full_with_context_no_errors(
        command,
        || std::env::var("HOME").ok(),
        |var: &str| env.get(var).cloned().or_else(|| std::env::var(var).ok()),
    );
    let parts = shlex::split(&expanded)
        .ok_or_else(|| format!("failed to parse command: {expanded}"))?;
    if parts.is_empty() {
        return Err("empty command after parsing".to_string());
    }
    Ok(parts)
}

pub enum Captured {
    Exited {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    TimedOut(Duration),
}

/// Spawns a command and captures stdout and stderr separately. If `timeout`
/// elapses the process is killed.
///
/// 派生一个命令并分别捕获 stdout 和 stderr。如果超过 `timeout`，进程将被终止。
pub async fn spawn_and_capture(
    mut cmd: Command,
    timeout: Option<Duration>,
) -> std::io::Result<Captured> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("failed to capture stderr"))?;

    let stdout_handle = read_to_string_lossy(stdout);
    let stderr_handle = read_to_string_lossy(stderr);

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                child.kill().await?;
                stdout_handle.abort();
                stderr_handle.abort();
                return Ok(Captured::TimedOut(limit));
            }
        },
        None => child.wait().await?,
    };

    let stdout = join_reader(stdout_handle, "stdout").await;
    let stderr = join_reader(stderr_handle, "stderr").await;
    Ok(Captured::Exited {
        status,
        stdout,
        stderr,
    })
}

/// Reads `stream` to EOF. Output that is not valid UTF-8 is kept with
/// replacement characters; the pipe is always drained so the child never
/// blocks or gets SIGPIPE on a full or closed pipe.
fn read_to_string_lossy<R>(mut stream: R) -> JoinHandle<std::io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    })
}

async fn join_reader(handle: JoinHandle<std::io::Result<String>>, name: &str) -> String {
    match handle.await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::warn!("failed to read {name}: {e}");
            String::new()
        }
        Err(e) => {
            tracing::warn!("failed to join {name} reader: {e}");
            String::new()
        }
    }
}
