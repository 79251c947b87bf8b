use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_AGENT_PORT: u16 = 9100;

pub const PROBE_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);
pub const PROBE_RETRY_DELAY: Duration = Duration::from_millis(250);
pub const ALERT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
pub const ALERT_CACHE_CAPACITY: usize = 500;

/// Shell configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub agent_port: u16,
    pub collection_interval_secs: u32,
    pub agent_log_level: String,
    /// Overrides the packaged/development agent location.
    pub agent_path: Option<PathBuf>,
    pub update_url: Option<String>,
    pub readiness_budget: Duration,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
    pub update_timeout: Duration,
    pub alert_interval: Duration,
    pub alert_request_timeout: Duration,
    pub alert_cache_capacity: usize,
    pub shell_log_level: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            agent_port: DEFAULT_AGENT_PORT,
            collection_interval_secs: 1,
            agent_log_level: "info".to_string(),
            agent_path: None,
            update_url: None,
            readiness_budget: Duration::from_millis(8000),
            attempt_timeout: PROBE_ATTEMPT_TIMEOUT,
            retry_delay: PROBE_RETRY_DELAY,
            update_timeout: Duration::from_secs(30),
            alert_interval: Duration::from_secs(5),
            alert_request_timeout: ALERT_REQUEST_TIMEOUT,
            alert_cache_capacity: ALERT_CACHE_CAPACITY,
            shell_log_level: "info".to_string(),
        }
    }
}

impl ShellConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; invalid values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            agent_port: non_empty("TTE_PORT")
                .and_then(|p| p.parse().ok())
                .filter(|p: &u16| *p != 0)
                .unwrap_or(defaults.agent_port),
            collection_interval_secs: non_empty("TTE_INTERVAL")
                .and_then(|v| v.parse().ok())
                .filter(|v: &u32| *v > 0)
                .unwrap_or(defaults.collection_interval_secs),
            agent_log_level: non_empty("TTE_LOG_LEVEL")
                .filter(|v| matches!(v.as_str(), "info" | "debug"))
                .unwrap_or_else(|| defaults.agent_log_level.clone()),
            agent_path: non_empty("TTE_AGENT_PATH").map(PathBuf::from),
            update_url: non_empty("TTE_UPDATE_URL"),
            readiness_budget: non_empty("TTE_READINESS_BUDGET_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.readiness_budget),
            update_timeout: non_empty("TTE_UPDATE_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.update_timeout),
            alert_interval: non_empty("TTE_ALERT_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.alert_interval),
            shell_log_level: non_empty("TTE_SHELL_LOG_LEVEL")
                .unwrap_or_else(|| defaults.shell_log_level.clone()),
            ..defaults
        }
    }

    pub fn agent_base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.agent_port)
    }

    /// Fixed arguments passed to the agent binary.
    pub fn agent_args(&self) -> Vec<String> {
        vec![
            "--port".to_string(),
            self.agent_port.to_string(),
            "--interval".to_string(),
            self.collection_interval_secs.to_string(),
            "--log-level".to_string(),
            self.agent_log_level.clone(),
        ]
    }
}

/// Release builds are the packaged app; everything else runs from the source tree.
pub fn is_packaged() -> bool {
    !cfg!(debug_assertions)
}
