use std::path::Path;

use tauri::{AppHandle, Runtime};
use tauri_plugin_shell::process::{CommandChild, CommandEvent};
use tauri_plugin_shell::ShellExt;
use tokio::sync::mpsc;

use crate::error::SupervisorError;
use crate::supervisor::{AgentEvent, AgentHandle, AgentLauncher, LaunchedAgent};

/// Spawns the agent through `tauri-plugin-shell` and relays its command events.
pub struct ShellLauncher<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> ShellLauncher<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

struct ShellChild(CommandChild);

impl AgentHandle for ShellChild {
    fn pid(&self) -> u32 {
        self.0.pid()
    }

    fn kill(self: Box<Self>) -> Result<(), SupervisorError> {
        self.0
            .kill()
            .map_err(|e| SupervisorError::Kill(e.to_string()))
    }
}

impl<R: Runtime> AgentLauncher for ShellLauncher<R> {
    fn launch(&self, program: &Path, args: &[String]) -> Result<LaunchedAgent, SupervisorError> {
        let (mut rx, child) = self
            .app
            .shell()
            .command(program.to_string_lossy().into_owned())
            .args(args)
            .spawn()
            .map_err(|e| SupervisorError::Spawn(e.to_string()))?;

        let (tx, events) = mpsc::unbounded_channel();
        tauri::async_runtime::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mapped = match event {
                    CommandEvent::Stdout(bytes) => AgentEvent::Stdout(line_of(&bytes)),
                    CommandEvent::Stderr(bytes) => AgentEvent::Stderr(line_of(&bytes)),
                    CommandEvent::Error(message) => AgentEvent::Error(message),
                    CommandEvent::Terminated(payload) => AgentEvent::Terminated { code: payload.code },
                    _ => continue,
                };
                if tx.send(mapped).is_err() {
                    break;
                }
            }
        });

        Ok(LaunchedAgent {
            handle: Box::new(ShellChild(child)),
            events,
        })
    }
}

fn line_of(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}
