use std::sync::Arc;

use tauri::State;

use crate::orchestrator::Orchestrator;
use crate::types::{AgentStatusView, AlertsResponse, LogsResponse};

const DEFAULT_LOG_LIMIT: u32 = 500;

#[tauri::command]
pub async fn get_agent_status(
    shell: State<'_, Arc<Orchestrator>>,
) -> Result<AgentStatusView, String> {
    Ok(shell.agent_status().await)
}

#[tauri::command]
pub async fn get_logs(
    shell: State<'_, Arc<Orchestrator>>,
    level: Option<String>,
    limit: Option<u32>,
) -> Result<LogsResponse, String> {
    let level = level.filter(|l| !l.is_empty());
    shell
        .api()
        .logs(level.as_deref(), limit.unwrap_or(DEFAULT_LOG_LIMIT))
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_alerts(shell: State<'_, Arc<Orchestrator>>) -> Result<AlertsResponse, String> {
    let timeout = shell.config().alert_request_timeout;
    shell.api().alerts(timeout).await.map_err(|e| e.to_string())
}
