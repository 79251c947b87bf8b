//! Owns the `third-eye-agent` child process.
//!
//! Spawns the agent with fixed `--port/--interval/--log-level` arguments,
//! watches its unified event stream and kills it on teardown. There is never
//! more than one live handle.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::SupervisorError;
use crate::types::{AgentSnapshot, AgentState};

#[cfg(windows)]
pub const AGENT_BINARY: &str = "third-eye-agent.exe";
#[cfg(not(windows))]
pub const AGENT_BINARY: &str = "third-eye-agent";

/// Everything the supervisor learns about a running agent arrives as one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Stdout(String),
    Stderr(String),
    Error(String),
    Terminated { code: Option<i32> },
}

pub trait AgentHandle: Send {
    fn pid(&self) -> u32;
    fn kill(self: Box<Self>) -> Result<(), SupervisorError>;
}

pub struct LaunchedAgent {
    pub handle: Box<dyn AgentHandle>,
    pub events: mpsc::UnboundedReceiver<AgentEvent>,
}

pub trait AgentLauncher: Send + Sync {
    fn launch(&self, program: &Path, args: &[String]) -> Result<LaunchedAgent, SupervisorError>;

    /// Forceful, tree-wide termination by pid.
    fn terminate_pid(&self, pid: u32) -> std::io::Result<()> {
        let status = terminate_command(pid).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!("terminate exited with {}", status)))
        }
    }
}

#[cfg(windows)]
fn terminate_command(pid: u32) -> Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    let mut command = Command::new("taskkill");
    command
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .creation_flags(CREATE_NO_WINDOW);
    command
}

#[cfg(not(windows))]
fn terminate_command(pid: u32) -> Command {
    let mut command = Command::new("kill");
    command.args(["-9", &pid.to_string()]);
    command
}

/// Where the agent binary lives for a given packaging mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackagingMode {
    Packaged { resource_dir: PathBuf },
    Development,
}

pub fn resolve_agent_path(mode: &PackagingMode, override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }
    match mode {
        PackagingMode::Packaged { resource_dir } => resource_dir.join("agent").join(AGENT_BINARY),
        PackagingMode::Development => Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("agent")
            .join("build")
            .join(AGENT_BINARY),
    }
}

struct Inner {
    state: AgentState,
    handle: Option<Box<dyn AgentHandle>>,
    pid: Option<u32>,
    exit_code: Option<i32>,
    generation: u64,
}

pub struct ProcessSupervisor {
    launcher: Arc<dyn AgentLauncher>,
    program: PathBuf,
    args: Vec<String>,
    inner: Arc<Mutex<Inner>>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn AgentLauncher>, program: PathBuf, args: Vec<String>) -> Self {
        Self {
            launcher,
            program,
            args,
            inner: Arc::new(Mutex::new(Inner {
                state: AgentState::NotStarted,
                handle: None,
                pid: None,
                exit_code: None,
                generation: 0,
            })),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Spawns the agent if its binary exists. Must be called inside a tokio runtime.
    ///
    /// A missing binary leaves the state `NotStarted`; a spawn error sets `Failed`.
    /// Neither is retried.
    pub fn start(&self) -> Result<AgentState, SupervisorError> {
        let mut inner = lock(&self.inner);
        if inner.handle.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }

        if !self.program.exists() {
            warn!(path = %self.program.display(), "agent executable not found");
            inner.state = AgentState::NotStarted;
            return Ok(inner.state);
        }

        inner.state = AgentState::Starting;
        info!(path = %self.program.display(), args = ?self.args, "starting agent");

        let launched = match self.launcher.launch(&self.program, &self.args) {
            Ok(launched) => launched,
            Err(e) => {
                error!("{}", e);
                inner.state = AgentState::Failed;
                return Ok(inner.state);
            }
        };

        let pid = launched.handle.pid();
        inner.generation += 1;
        inner.handle = Some(launched.handle);
        inner.pid = Some(pid);
        inner.exit_code = None;
        inner.state = AgentState::Running;
        info!(pid, "agent running");

        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        tokio::spawn(watch_events(shared, generation, launched.events));

        Ok(inner.state)
    }

    /// Kills the tracked agent. No-op when nothing is tracked.
    pub fn stop(&self) {
        let handle = {
            let mut inner = lock(&self.inner);
            let Some(handle) = inner.handle.take() else {
                return;
            };
            // Invalidate the watcher so it does not overwrite state after the kill.
            inner.generation += 1;
            inner.pid = None;
            inner.state = AgentState::Stopped;
            handle
        };

        let pid = handle.pid();
        info!(pid, "stopping agent");
        match self.launcher.terminate_pid(pid) {
            Ok(()) => debug!(pid, "agent terminated"),
            Err(e) => {
                warn!(pid, "forceful termination failed ({}), falling back to kill", e);
                if let Err(e) = handle.kill() {
                    warn!(pid, "{}", e);
                }
            }
        }
    }

    pub fn restart(&self) -> Result<AgentState, SupervisorError> {
        self.stop();
        self.start()
    }

    pub fn state(&self) -> AgentState {
        lock(&self.inner).state
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner).handle.is_some()
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let inner = lock(&self.inner);
        AgentSnapshot {
            state: inner.state,
            pid: inner.pid,
            exit_code: inner.exit_code,
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn watch_events(
    inner: Arc<Mutex<Inner>>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<AgentEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::Stdout(line) => debug!(target: "agent", "{}", line),
            AgentEvent::Stderr(line) => debug!(target: "agent", stream = "stderr", "{}", line),
            AgentEvent::Error(message) => warn!("agent process error: {}", message),
            AgentEvent::Terminated { code } => {
                let mut inner = lock(&inner);
                if inner.generation != generation {
                    debug!(?code, "exit of a replaced agent process ignored");
                    return;
                }
                info!(?code, "agent exited");
                inner.state = AgentState::Stopped;
                inner.exit_code = code;
                inner.handle = None;
                inner.pid = None;
                return;
            }
        }
    }
}
