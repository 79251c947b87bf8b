use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PreferencesError;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceValues {
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PreferenceValues {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
        }
    }
}

/// User preferences persisted as JSON in the app config directory.
///
/// Without a path (tests, missing config dir) values live in memory only.
pub struct Preferences {
    path: Option<PathBuf>,
    values: Mutex<PreferenceValues>,
}

impl Preferences {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(PreferenceValues::default()),
        }
    }

    /// Loads from `path`; unreadable or corrupt files fall back to defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match read_values(&path) {
            Ok(Some(values)) => values,
            Ok(None) => {
                debug!(path = %path.display(), "no preferences file, using defaults");
                PreferenceValues::default()
            }
            Err(e) => {
                warn!(path = %path.display(), "ignoring unreadable preferences: {}", e);
                PreferenceValues::default()
            }
        };
        Self {
            path: Some(path),
            values: Mutex::new(values),
        }
    }

    pub fn notifications_enabled(&self) -> bool {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .notifications_enabled
    }

    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<(), PreferencesError> {
        let snapshot = {
            let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
            values.notifications_enabled = enabled;
            values.clone()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, values: &PreferenceValues) -> Result<(), PreferencesError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(values)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn read_values(path: &Path) -> Result<Option<PreferenceValues>, PreferencesError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}
