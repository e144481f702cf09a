// Shared test helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use matrix_ci::config::{Workflow, parse_workflow};
use matrix_ci::core::coordinator::RunRecord;
use matrix_ci::core::error::{EnvironmentError, StepError};
use matrix_ci::core::events::{JobEvent, ReportSink};
use matrix_ci::core::job::JobSpec;
use matrix_ci::core::runner::{
    RunnerLease, RunnerProvider, StepInvocation, StepOutput, StepRunner,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// Parses a workflow from inline TOML, panicking on error.
pub fn workflow(toml: &str) -> Workflow {
    parse_workflow(toml).expect("test workflow should parse")
}

/// A step runner whose exit codes are scripted per command.
///
/// Commands with no script exit 0. A script is a sequence of exit codes
/// consumed one attempt at a time; the last code repeats.
#[derive(Default)]
pub struct ScriptedStepRunner {
    scripts: Mutex<HashMap<String, VecDeque<i32>>>,
    panics: HashSet<String>,
    writes: HashMap<String, Vec<(String, String)>>,
    delay: Duration,
    invocations: Mutex<Vec<StepInvocation>>,
}

impl ScriptedStepRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit(self, command: &str, code: i32) -> Self {
        self.sequence(command, &[code])
    }

    pub fn sequence(self, command: &str, codes: &[i32]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), codes.iter().copied().collect());
        self
    }

    pub fn panic_on(mut self, command: &str) -> Self {
        self.panics.insert(command.to_string());
        self
    }

    /// Makes `command` write `content` to `path`, relative to its working
    /// directory.
    pub fn writes(mut self, command: &str, path: &str, content: &str) -> Self {
        self.writes
            .entry(command.to_string())
            .or_default()
            .push((path.to_string(), content.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invocations(&self) -> Vec<StepInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Commands in the order they were run, one entry per attempt.
    pub fn commands(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(|i| i.action.describe().to_string())
            .collect()
    }

    fn next_code(&self, command: &str) -> i32 {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(command) {
            Some(codes) if codes.len() > 1 => codes.pop_front().unwrap(),
            Some(codes) => codes.front().copied().unwrap_or(0),
            None => 0,
        }
    }
}

#[async_trait]
impl StepRunner for ScriptedStepRunner {
    async fn run(&self, invocation: StepInvocation) -> Result<StepOutput, StepError> {
        let command = invocation.action.describe().to_string();
        for (path, content) in self.writes.get(&command).into_iter().flatten() {
            let target = invocation.working_dir.join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, content).unwrap();
        }
        self.invocations.lock().unwrap().push(invocation);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panics.contains(&command) {
            panic!("scripted panic in '{command}'");
        }
        let code = self.next_code(&command);
        Ok(StepOutput {
            exit_code: Some(code),
            duration: self.delay,
            stdout: format!("ran {command}\n"),
            stderr: String::new(),
        })
    }
}

/// A runner provider that serves every selector except the ones marked
/// unavailable, and counts acquisitions and releases.
#[derive(Default)]
pub struct FakeProvider {
    unavailable: HashSet<String>,
    panicking: HashSet<String>,
    pub acquired: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without(mut self, selector: &str) -> Self {
        self.unavailable.insert(selector.to_string());
        self
    }

    /// Panics inside `acquire` for `selector`, before any lease exists.
    pub fn panic_on(mut self, selector: &str) -> Self {
        self.panicking.insert(selector.to_string());
        self
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunnerProvider for FakeProvider {
    async fn acquire(
        &self,
        selector: &str,
        _job: &JobSpec,
    ) -> Result<Box<dyn RunnerLease>, EnvironmentError> {
        if self.panicking.contains(selector) {
            panic!("scripted panic acquiring '{selector}'");
        }
        if selector.is_empty() || self.unavailable.contains(selector) {
            return Err(EnvironmentError::RunnerUnavailable {
                selector: selector.to_string(),
            });
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeLease {
            label: format!("fake:{selector}"),
            workspace: tempdir().expect("Failed to create temporary directory"),
            released: Arc::clone(&self.released),
        }))
    }
}

struct FakeLease {
    label: String,
    workspace: TempDir,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl RunnerLease for FakeLease {
    fn label(&self) -> &str {
        &self.label
    }

    fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    async fn release(self: Box<Self>) -> Result<(), EnvironmentError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records everything the coordinator reports.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<JobEvent>>,
    pub finished: Mutex<Vec<RunRecord>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, job_index: usize) -> Vec<JobEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.job_index == job_index)
            .collect()
    }
}

impl ReportSink for RecordingSink {
    fn job_transition(&self, event: &JobEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn run_finished(&self, record: &RunRecord) {
        self.finished.lock().unwrap().push(record.clone());
    }
}
