use std::sync::Arc;

use tauri::State;
use tracing::info;

use crate::orchestrator::Orchestrator;
use crate::types::AgentConfigUpdate;

#[tauri::command]
pub async fn apply_config(
    shell: State<'_, Arc<Orchestrator>>,
    config: AgentConfigUpdate,
) -> Result<serde_json::Value, String> {
    let applied = shell
        .api()
        .apply_config(&config)
        .await
        .map_err(|e| e.to_string())?;
    info!(interval = config.interval, log_level = %config.log_level, "agent config applied");
    Ok(applied)
}

#[tauri::command]
pub fn get_notifications_enabled(shell: State<'_, Arc<Orchestrator>>) -> bool {
    shell.preferences().notifications_enabled()
}

#[tauri::command]
pub fn set_notifications_enabled(
    shell: State<'_, Arc<Orchestrator>>,
    enabled: bool,
) -> Result<bool, String> {
    shell
        .preferences()
        .set_notifications_enabled(enabled)
        .map_err(|e| format!("save error: {}", e))?;
    info!(enabled, "notification preference changed");
    Ok(enabled)
}
