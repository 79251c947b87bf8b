use serde::{Deserialize, Serialize};

/// Lifecycle of the supervised agent subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentState {
    NotStarted,
    Starting,
    Running,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub state: AgentState,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
}

/// What the dashboard needs to decide between live data and "Agent Unreachable".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusView {
    pub connected: bool,
    pub process: AgentSnapshot,
    pub status: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// One anomaly occurrence as reported by `GET /api/alerts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub alert_type: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub message: String,
    pub timestamp: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub active: bool,
}

impl AlertEvent {
    pub fn key(&self) -> AlertKey {
        AlertKey {
            alert_type: self.alert_type.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// Identity of an alert occurrence for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub alert_type: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsResponse {
    #[serde(default)]
    pub active: Vec<AlertEvent>,
    #[serde(default)]
    pub history: Vec<AlertEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// Body of `POST /api/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfigUpdate {
    pub interval: u32,
    pub log_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_threshold: Option<f64>,
}

impl AgentConfigUpdate {
    /// Rejects values the agent would silently clamp or ignore.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=60).contains(&self.interval) {
            return Err(format!(
                "interval must be between 1 and 60 seconds, got {}",
                self.interval
            ));
        }
        if !matches!(self.log_level.as_str(), "info" | "debug") {
            return Err(format!(
                "log level must be \"info\" or \"debug\", got {:?}",
                self.log_level
            ));
        }
        for (name, value) in [
            ("cpu_threshold", self.cpu_threshold),
            ("memory_threshold", self.memory_threshold),
        ] {
            if let Some(v) = value {
                if !(10.0..=100.0).contains(&v) {
                    return Err(format!("{} must be between 10 and 100, got {}", name, v));
                }
            }
        }
        if let Some(v) = self.collect_threshold {
            if !(0.5..=10.0).contains(&v) {
                return Err(format!(
                    "collect_threshold must be between 0.5 and 10 seconds, got {}",
                    v
                ));
            }
        }
        Ok(())
    }
}

/// Payload of the `splash-progress` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressState {
    pub percent: u8,
    pub text: String,
    pub version: String,
}

/// Payload of the `splash-download` event while an update is downloading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub percent: f64,
    pub transferred: u64,
    pub total: u64,
    /// Bytes per second.
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum UpdateState {
    Idle,
    Checking,
    Available { version: String },
    Downloading(DownloadProgress),
    Downloaded { version: String },
    NotAvailable,
    Errored { message: String },
}

impl UpdateState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdateState::Downloaded { .. } | UpdateState::NotAvailable | UpdateState::Errored { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckOutcome {
    pub has_update: bool,
    pub version: Option<String>,
}

impl UpdateCheckOutcome {
    pub fn none() -> Self {
        Self {
            has_update: false,
            version: None,
        }
    }

    pub fn ready(version: impl Into<String>) -> Self {
        Self {
            has_update: true,
            version: Some(version.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    pub state: UpdateState,
    pub pending_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClickAction {
    FocusMainWindow,
}

/// Payload of the `alert-notification` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub title: String,
    pub body: String,
    pub alert_type: String,
    pub action: ClickAction,
}
