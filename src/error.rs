use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("agent returned HTTP {0}")]
    Status(u16),

    #[error("agent did not answer within {0} ms")]
    Timeout(u128),

    #[error("agent rejected configuration: {0}")]
    Rejected(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("agent process already running")]
    AlreadyRunning,

    #[error("failed to spawn agent: {0}")]
    Spawn(String),

    #[error("failed to kill agent: {0}")]
    Kill(String),
}

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("update source unavailable")]
    Unavailable,

    #[error("invalid update manifest: {0}")]
    Manifest(String),

    #[error("update request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("update server returned HTTP {0}")]
    Status(u16),

    #[error("update IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },
}

#[derive(Error, Debug)]
pub enum PreferencesError {
    #[error("preferences IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("preferences JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ShellError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Preferences(#[from] PreferencesError),

    #[error("tauri error: {0}")]
    Tauri(#[from] tauri::Error),
}
