use std::sync::Arc;

use tauri::{AppHandle, State};

use crate::orchestrator::Orchestrator;
use crate::types::UpdateStatus;

#[tauri::command]
pub fn get_update_status(shell: State<'_, Arc<Orchestrator>>) -> UpdateStatus {
    shell.updates().status()
}

/// Starts the installer and quits so it can replace the running app.
#[tauri::command]
pub fn install_update(app: AppHandle, shell: State<'_, Arc<Orchestrator>>) -> bool {
    if !shell.updates().install() {
        return false;
    }
    shell.shutdown();
    app.exit(0);
    true
}
