//! Everything the core shows to the user goes through [`ShellSurface`].
//!
//! `TauriSurface` drives the `splash` and `main` webview windows and emits the
//! events the frontend subscribes to.

use tauri::{AppHandle, Emitter, Manager, Runtime};
use tauri_plugin_notification::NotificationExt;
use tracing::warn;

use crate::events::{
    EVENT_ALERT_NOTIFICATION, EVENT_SPLASH_DOWNLOAD, EVENT_SPLASH_PROGRESS, EVENT_UPDATE_READY,
    WINDOW_MAIN, WINDOW_SPLASH,
};
use crate::types::{AlertNotification, DownloadProgress, ProgressState};

pub trait ShellSurface: Send + Sync {
    fn show_splash(&self);
    fn splash_progress(&self, state: &ProgressState);
    fn splash_download(&self, progress: Option<DownloadProgress>);
    fn close_splash(&self);
    fn reveal_main(&self);
    fn focus_main(&self);
    fn update_ready(&self, version: &str);
    /// Shows an OS notification. Returns `false` when it could not be delivered.
    fn notify(&self, notification: &AlertNotification) -> bool;
}

pub struct TauriSurface<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriSurface<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }

    fn with_window<F>(&self, label: &str, action: &str, f: F)
    where
        F: FnOnce(&tauri::WebviewWindow<R>) -> tauri::Result<()>,
    {
        match self.app.get_webview_window(label) {
            Some(window) => {
                if let Err(e) = f(&window) {
                    warn!(window = label, "{} failed: {}", action, e);
                }
            }
            None => warn!(window = label, "window missing, cannot {}", action),
        }
    }

    fn emit_to<S: serde::Serialize + Clone>(&self, label: &str, event: &str, payload: S) {
        if let Err(e) = self.app.emit_to(label, event, payload) {
            warn!(window = label, event, "emit failed: {}", e);
        }
    }
}

impl<R: Runtime> ShellSurface for TauriSurface<R> {
    fn show_splash(&self) {
        self.with_window(WINDOW_SPLASH, "show splash", |w| w.show());
    }

    fn splash_progress(&self, state: &ProgressState) {
        self.emit_to(WINDOW_SPLASH, EVENT_SPLASH_PROGRESS, state.clone());
    }

    fn splash_download(&self, progress: Option<DownloadProgress>) {
        self.emit_to(WINDOW_SPLASH, EVENT_SPLASH_DOWNLOAD, progress);
    }

    fn close_splash(&self) {
        self.with_window(WINDOW_SPLASH, "close splash", |w| w.close());
    }

    fn reveal_main(&self) {
        self.with_window(WINDOW_MAIN, "reveal main window", |w| w.show());
    }

    fn focus_main(&self) {
        self.with_window(WINDOW_MAIN, "focus main window", |w| {
            if w.is_minimized()? {
                w.unminimize()?;
            }
            w.show()?;
            w.set_focus()
        });
    }

    fn update_ready(&self, version: &str) {
        self.emit_to(WINDOW_MAIN, EVENT_UPDATE_READY, version.to_string());
    }

    fn notify(&self, notification: &AlertNotification) -> bool {
        let shown = self
            .app
            .notification()
            .builder()
            .title(&notification.title)
            .body(&notification.body)
            .show();
        if let Err(e) = shown {
            warn!(alert_type = %notification.alert_type, "notification not shown: {}", e);
            return false;
        }
        // In-app copy; clicking it focuses the main window.
        self.emit_to(WINDOW_MAIN, EVENT_ALERT_NOTIFICATION, notification.clone());
        true
    }
}
