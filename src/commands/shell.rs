use std::sync::Arc;

use tauri::State;

use crate::orchestrator::Orchestrator;
use crate::types::AgentSnapshot;

#[tauri::command]
pub fn main_ui_ready(shell: State<'_, Arc<Orchestrator>>) -> Option<String> {
    shell.main_ui_ready()
}

#[tauri::command]
pub fn focus_main_window(shell: State<'_, Arc<Orchestrator>>) {
    shell.focus_main();
}

#[tauri::command]
pub async fn restart_agent(shell: State<'_, Arc<Orchestrator>>) -> Result<AgentSnapshot, String> {
    shell.restart_agent().map_err(|e| e.to_string())?;
    Ok(shell.supervisor().snapshot())
}
