#![allow(dead_code)]

use gitkeeper::core::{MaintenanceError, Result};
use gitkeeper::{
    GitOutput, GitProcess, GitProcessFactory, HostControl, KillOutcome, MaintenanceConfig,
    MaintenanceStep, MaintenanceTask,
};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

type Responder = dyn Fn(&[&str]) -> GitOutput + Send + Sync;

/// Scripted stand-in for a git child process
pub struct FakeGit {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    kills: Arc<AtomicUsize>,
    /// Invocations whose first argument matches block until `try_kill`
    block_on: Option<String>,
    killed: Mutex<bool>,
    killed_signal: Condvar,
}

impl GitProcess for FakeGit {
    fn name(&self) -> &str {
        "fake-git"
    }

    fn invoke(&self, args: &[&str]) -> GitOutput {
        self.calls
            .lock()
            .unwrap()
            .push(args.iter().map(|arg| arg.to_string()).collect());

        if matches!((&self.block_on, args.first()), (Some(block), Some(first)) if block.as_str() == *first) {
            let mut killed = self.killed.lock().unwrap();
            while !*killed {
                killed = self.killed_signal.wait(killed).unwrap();
            }
            return GitOutput::new(None, "", "killed");
        }

        (self.responder)(args)
    }

    fn try_kill(&self) -> KillOutcome {
        self.kills.fetch_add(1, Ordering::SeqCst);
        *self.killed.lock().unwrap() = true;
        self.killed_signal.notify_all();
        KillOutcome {
            process_name: "fake-git".to_string(),
            exit_code: None,
            error: None,
        }
    }
}

pub struct FakeGitFactory {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    kills: Arc<AtomicUsize>,
    created: AtomicUsize,
    block_on: Option<String>,
    fail_create: bool,
}

impl FakeGitFactory {
    /// Every command succeeds with empty output
    pub fn succeeding() -> Self {
        Self::with_responder(|_| GitOutput::success(""))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&[&str]) -> GitOutput + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
            kills: Arc::new(AtomicUsize::new(0)),
            created: AtomicUsize::new(0),
            block_on: None,
            fail_create: false,
        }
    }

    /// Make commands starting with `subcommand` hang until killed
    pub fn blocking_on(mut self, subcommand: &str) -> Self {
        self.block_on = Some(subcommand.to_string());
        self
    }

    pub fn failing_to_launch(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations rendered as space-separated strings
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(|call| call.join(" ")).collect()
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl GitProcessFactory for FakeGitFactory {
    fn create(&self) -> Result<Arc<dyn GitProcess>> {
        if self.fail_create {
            return Err(MaintenanceError::Git("git binary missing".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeGit {
            responder: Arc::clone(&self.responder),
            calls: Arc::clone(&self.calls),
            kills: Arc::clone(&self.kills),
            block_on: self.block_on.clone(),
            killed: Mutex::new(false),
            killed_signal: Condvar::new(),
        }))
    }
}

type PerformFn = dyn Fn(&MaintenanceTask) -> Result<()> + Send + Sync;

/// Step whose body is supplied by the test
pub struct ClosureStep {
    area: String,
    requires_lock: bool,
    min_interval: Duration,
    perform: Box<PerformFn>,
}

impl ClosureStep {
    pub fn new<F>(area: &str, perform: F) -> Self
    where
        F: Fn(&MaintenanceTask) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            area: area.to_string(),
            requires_lock: true,
            min_interval: Duration::ZERO,
            perform: Box::new(perform),
        }
    }

    pub fn without_lock(mut self) -> Self {
        self.requires_lock = false;
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }
}

impl MaintenanceStep for ClosureStep {
    fn area(&self) -> &str {
        &self.area
    }

    fn perform(&self, task: &MaintenanceTask) -> Result<()> {
        (self.perform)(task)
    }

    fn requires_object_cache_lock(&self) -> bool {
        self.requires_lock
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Repository and object cache laid out in a temporary directory
pub struct Fixture {
    pub dir: TempDir,
    pub config: Arc<MaintenanceConfig>,
    pub host: HostControl,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        let objects = dir.path().join("objects");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        std::fs::create_dir_all(objects.join("pack")).unwrap();
        std::fs::create_dir_all(objects.join("info")).unwrap();

        Self {
            config: Arc::new(MaintenanceConfig::new(repo, objects)),
            dir,
            host: HostControl::new(),
        }
    }

    pub fn task(
        &self,
        step: impl MaintenanceStep + 'static,
        processes: &Arc<FakeGitFactory>,
    ) -> MaintenanceTask {
        let processes: Arc<dyn GitProcessFactory> = processes.clone();
        MaintenanceTask::new(step, Arc::clone(&self.config), processes, self.host.clone())
    }
}

#[derive(Clone, Default)]
pub struct LogBuffer {
    buffer: Arc<Mutex<Vec<u8>>>,
}

pub struct LogBufferWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            buffer: self.buffer.clone(),
        }
    }
}

impl Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.buffer.lock().unwrap().clone()).unwrap()
    }
}

/// Run `f` with a subscriber that records events on this thread
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs.contents())
}
