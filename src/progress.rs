use std::sync::{Arc, Mutex, PoisonError};

use crate::surface::ShellSurface;
use crate::types::{DownloadProgress, ProgressState};

/// Inclusive sub-range of the global 0–100 scale reserved for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRange {
    pub start: u8,
    pub end: u8,
}

pub const READINESS_RANGE: PhaseRange = PhaseRange { start: 15, end: 70 };
pub const UPDATE_RANGE: PhaseRange = PhaseRange { start: 45, end: 92 };

/// Linearly maps `fraction` (clamped to 0..=1) into `range`.
pub fn map_into(range: PhaseRange, fraction: f64) -> u8 {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let span = f64::from(range.end.saturating_sub(range.start));
    (f64::from(range.start) + fraction * span).round() as u8
}

/// Collapses every phase's progress into one stream for the splash window.
///
/// The percentage never moves backwards even though phase ranges overlap;
/// labels always update.
pub struct ProgressReporter {
    surface: Arc<dyn ShellSurface>,
    version: String,
    current: Mutex<ProgressState>,
}

impl ProgressReporter {
    pub fn new(surface: Arc<dyn ShellSurface>, version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            surface,
            current: Mutex::new(ProgressState {
                percent: 0,
                text: String::new(),
                version: version.clone(),
            }),
            version,
        }
    }

    pub fn report(&self, percent: u8, text: impl Into<String>) {
        let state = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            current.percent = current.percent.max(percent.min(100));
            current.text = text.into();
            current.version = self.version.clone();
            current.clone()
        };
        self.surface.splash_progress(&state);
    }

    pub fn download(&self, progress: Option<DownloadProgress>) {
        self.surface.splash_download(progress);
    }

    pub fn current(&self) -> ProgressState {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
