use super::{GitOutput, GitProcess, GitProcessFactory, KillOutcome};
use crate::core::Result;
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// How often a running command is checked for exit
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs git (or any program) as a child process, one command at a time.
pub struct CommandGitProcess {
    name: String,
    program: PathBuf,
    /// Arguments placed before every command, e.g. `-C <repo>`
    base_args: Vec<OsString>,
    slot: Mutex<ProcessSlot>,
}

/// The child is only reaped while this slot is locked, so `try_kill` never
/// signals a pid that has already been released.
#[derive(Default)]
struct ProcessSlot {
    killed: bool,
    running: Option<Child>,
    last_exit: Option<i32>,
}

impl CommandGitProcess {
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<OsString>) -> Self {
        let program = program.into();
        let name = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());

        Self {
            name,
            program,
            base_args,
            slot: Mutex::new(ProcessSlot::default()),
        }
    }

    /// `git -C <repo_root> ...`
    pub fn git(git_binary: impl Into<PathBuf>, repo_root: &Path) -> Self {
        Self::new(
            git_binary,
            vec![OsString::from("-C"), repo_root.as_os_str().to_os_string()],
        )
    }

    pub fn is_running(&self) -> bool {
        self.lock_slot().running.is_some()
    }

    fn lock_slot(&self) -> MutexGuard<'_, ProcessSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll the running child until it exits, reaping it under the slot lock
    fn wait_for_exit(&self) -> io::Result<ExitStatus> {
        loop {
            {
                let mut slot = self.lock_slot();
                let polled = match slot.running.as_mut() {
                    Some(child) => child.try_wait(),
                    None => {
                        return Err(io::Error::other("child process handle missing"));
                    }
                };
                match polled {
                    Ok(Some(status)) => {
                        slot.running = None;
                        return Ok(status);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        slot.running = None;
                        return Err(err);
                    }
                }
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

impl GitProcess for CommandGitProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, args: &[&str]) -> GitOutput {
        let (stdout, stderr) = {
            let mut slot = self.lock_slot();
            if slot.killed {
                return GitOutput::launch_failed(format!("{} was terminated", self.name));
            }

            let spawned = Command::new(&self.program)
                .args(&self.base_args)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn();

            match spawned {
                Ok(mut child) => {
                    let pipes = (child.stdout.take(), child.stderr.take());
                    slot.running = Some(child);
                    pipes
                }
                Err(err) => {
                    return GitOutput::launch_failed(format!(
                        "failed to launch {}: {}",
                        self.program.display(),
                        err
                    ));
                }
            }
        };

        let stdout_reader = thread::spawn(move || drain(stdout));
        let stderr_reader = thread::spawn(move || drain(stderr));

        let status = self.wait_for_exit();
        let output = stdout_reader.join().unwrap_or_default();
        let mut errors = stderr_reader.join().unwrap_or_default();

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(err) => {
                errors.push_str(&format!("failed to wait for {}: {}", self.name, err));
                None
            }
        };

        self.lock_slot().last_exit = exit_code;
        GitOutput::new(exit_code, output, errors)
    }

    fn try_kill(&self) -> KillOutcome {
        let mut slot = self.lock_slot();
        slot.killed = true;

        let error = match &slot.running {
            Some(child) => terminate(child.id()).err().map(|err| err.to_string()),
            None => None,
        };

        KillOutcome {
            process_name: self.name.clone(),
            exit_code: slot.last_exit,
            error,
        }
    }
}

fn drain<R: Read>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn terminate(pid: u32) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    kill(Pid::from_raw(pid), Signal::SIGKILL).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process termination is only supported on unix",
    ))
}

/// Builds a [`CommandGitProcess`] bound to one repository per cycle
#[derive(Debug, Clone)]
pub struct CommandGitProcessFactory {
    git_binary: PathBuf,
    repo_root: PathBuf,
}

impl CommandGitProcessFactory {
    pub fn new(git_binary: impl Into<PathBuf>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            git_binary: git_binary.into(),
            repo_root: repo_root.into(),
        }
    }
}

impl GitProcessFactory for CommandGitProcessFactory {
    fn create(&self) -> Result<Arc<dyn GitProcess>> {
        Ok(Arc::new(CommandGitProcess::git(&self.git_binary, &self.repo_root)))
    }
}
