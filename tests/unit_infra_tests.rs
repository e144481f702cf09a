//! # Infrastructure Unit Tests / 基础设施单元测试
//!
//! Tests for the local collaborators: command parsing and process execution,
//! the local runner provider, and workspace file helpers.
//!
//! 测试本地协作者：命令解析和进程执行、本地运行器提供者以及工作区文件辅助函数。

mod common;

use indexmap::IndexMap;
use matrix_ci::core::error::StepError;
use matrix_ci::core::job::StepAction;
use matrix_ci::core::planner::plan_execution;
use matrix_ci::core::runner::{RunnerLease, RunnerProvider, StepInvocation, StepRunner};
use matrix_ci::infra::command::build_argv;
use matrix_ci::infra::{LocalRunnerProvider, ShellStepRunner, fs};
use std::env;
use std::time::Duration;
use tempfile::tempdir;

fn env_of(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod argv_tests {
    use super::*;

    #[test]
    fn test_plain_command_is_split_with_quotes() {
        let argv = build_argv(r#"cargo test --features "a b""#, None, &env_of(&[])).unwrap();
        assert_eq!(argv, vec!["cargo", "test", "--features", "a b"]);
    }

    #[test]
    fn test_variables_expand_from_step_env_first() {
        let argv = build_argv(
            "echo $TOOLCHAIN ${TARGET}",
            None,
            &env_of(&[("TOOLCHAIN", "nightly"), ("TARGET", "wasm32")]),
        )
        .unwrap();
        assert_eq!(argv, vec!["echo", "nightly", "wasm32"]);
    }

    #[test]
    fn test_shell_receives_command_verbatim() {
        let argv = build_argv("make && make check", Some("bash"), &env_of(&[])).unwrap();
        assert_eq!(argv, vec!["bash", "-c", "make && make check"]);

        let argv = build_argv("dir", Some("cmd"), &env_of(&[])).unwrap();
        assert_eq!(argv, vec!["cmd", "/C", "dir"]);
    }

    #[test]
    fn test_unbalanced_quotes_are_an_error() {
        assert!(build_argv("echo \"oops", None, &env_of(&[])).is_err());
        assert!(build_argv("   ", None, &env_of(&[])).is_err());
    }
}

#[cfg(all(test, unix))]
mod shell_runner_tests {
    use super::*;

    fn invocation(command: &str, shell: Option<&str>, timeout: Option<Duration>) -> StepInvocation {
        StepInvocation {
            step_name: "step".to_string(),
            action: StepAction::Run {
                command: command.to_string(),
                shell: shell.map(str::to_string),
            },
            params: IndexMap::new(),
            working_dir: env::temp_dir(),
            env: env_of(&[("GREETING", "hello")]),
            timeout,
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let output = ShellStepRunner
            .run(invocation("echo $GREETING world", None, None))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello world\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported_in_output() {
        let output = ShellStepRunner
            .run(invocation("echo boom >&2; exit 3", Some("sh"), None))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr, "boom\n");
    }

    /// Output that is not valid UTF-8 is kept lossily and the pipe is
    /// drained, so a chatty step still exits cleanly.
    ///
    /// 非 UTF-8 输出以有损方式保留且管道被完全读取，因此输出较多的步骤仍能正常退出。
    #[tokio::test]
    async fn test_invalid_utf8_output_is_drained() {
        let script = r#"printf '\377\n'
i=0
while [ $i -lt 20000 ]; do echo aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa; i=$((i+1)); done
exit 0"#;
        let output = ShellStepRunner
            .run(invocation(script, Some("sh"), None))
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.starts_with('\u{FFFD}'));
        assert_eq!(output.stdout.lines().count(), 20001);
    }

    #[tokio::test]
    async fn test_timeout_kills_the_process() {
        let result = ShellStepRunner
            .run(invocation("sleep 5", None, Some(Duration::from_millis(100))))
            .await;
        assert!(matches!(result, Err(StepError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_fault() {
        let result = ShellStepRunner
            .run(invocation("this_command_definitely_does_not_exist_12345", None, None))
            .await;
        assert!(matches!(result, Err(StepError::Fault { .. })));
    }

    #[tokio::test]
    async fn test_unregistered_action_is_a_fault() {
        let mut unregistered = invocation("unused", None, None);
        unregistered.action = StepAction::Uses {
            action: "acme/unknown@v1".to_string(),
            command: None,
            shell: None,
        };
        let result = ShellStepRunner.run(unregistered).await;
        assert!(matches!(result, Err(StepError::Fault { .. })));
    }
}

#[cfg(test)]
mod local_runner_tests {
    use super::*;

    #[test]
    fn test_selector_matching() {
        let provider = LocalRunnerProvider::new().with_labels(["GPU"]);

        assert!(provider.matches("local"));
        assert!(provider.matches("self-hosted"));
        assert!(provider.matches("gpu"));
        assert!(provider.matches(env::consts::OS));
        assert!(!provider.matches(""));
        assert!(!provider.matches("mainframe"));

        let host_alias = match env::consts::OS {
            "linux" => "ubuntu-latest",
            "macos" => "macos-14",
            "windows" => "windows-2022",
            other => other,
        };
        assert!(provider.matches(host_alias));
        if env::consts::OS != "windows" {
            assert!(!provider.matches("windows-latest"));
        }
    }

    #[tokio::test]
    async fn test_lease_owns_a_seeded_workspace() {
        let project = tempdir().unwrap();
        std::fs::write(project.path().join("README.md"), "hi").unwrap();
        std::fs::create_dir(project.path().join(".git")).unwrap();

        let wf = common::workflow("name = \"seed\"\n[[steps]]\nrun = \"ls\"\n");
        let job = plan_execution(&wf, None).unwrap().jobs.remove(0);
        let provider = LocalRunnerProvider::new().seed_from(project.path());

        let lease = provider.acquire("local", &job).await.unwrap();
        let workspace = lease.workspace().to_path_buf();
        assert!(lease.label().starts_with("local:"));
        assert!(workspace.join("README.md").exists());
        assert!(!workspace.join(".git").exists());

        lease.release().await.unwrap();
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn test_unknown_selector_is_unavailable() {
        let wf = common::workflow("[[steps]]\nrun = \"ls\"\n");
        let job = plan_execution(&wf, None).unwrap().jobs.remove(0);

        let result = LocalRunnerProvider::new().acquire("mainframe", &job).await;
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod fs_tests {
    use super::*;

    #[test]
    fn test_workspace_prefix_is_sanitized() {
        let workspace = fs::create_workspace("tests (3.7, linux)").unwrap();
        let name = workspace
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(name.starts_with("matrix_ci_tests__3_7__linux__"), "{name}");
    }

    #[test]
    fn test_absolute_path_requires_existing_path() {
        let dir = tempdir().unwrap();
        assert!(fs::absolute_path(dir.path()).unwrap().is_absolute());
        assert!(fs::absolute_path(&dir.path().join("missing")).is_err());
    }
}
