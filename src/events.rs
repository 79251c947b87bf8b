//! Event names emitted to the webviews. Must match the frontend `listen` calls.

pub const EVENT_SPLASH_PROGRESS: &str = "splash-progress";
pub const EVENT_SPLASH_DOWNLOAD: &str = "splash-download";
pub const EVENT_UPDATE_READY: &str = "update-ready";
pub const EVENT_ALERT_NOTIFICATION: &str = "alert-notification";

pub const WINDOW_MAIN: &str = "main";
pub const WINDOW_SPLASH: &str = "splash";
