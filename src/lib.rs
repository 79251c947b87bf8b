pub mod agent_client;
pub mod alerts;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod launcher;
pub mod orchestrator;
pub mod preferences;
pub mod progress;
pub mod readiness;
pub mod supervisor;
pub mod surface;
pub mod types;
pub mod update;

use std::sync::Arc;

use tauri::{AppHandle, Manager, RunEvent};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use agent_client::AgentClient;
use config::ShellConfig;
use error::ShellError;
use launcher::ShellLauncher;
use orchestrator::{Components, Orchestrator};
use preferences::{Preferences, SETTINGS_FILE};
use supervisor::{resolve_agent_path, PackagingMode};
use surface::TauriSurface;
use update::{HttpUpdateSource, UpdateSource};

/// Installs the global subscriber. `RUST_LOG` wins over `TTE_SHELL_LOG_LEVEL`.
pub fn init_tracing(config: &ShellConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("third_eye_shell_lib={},agent=info", config.shell_log_level).into()
    });
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(false))
        .try_init();
}

fn build_orchestrator(app: &AppHandle, config: ShellConfig) -> Result<Orchestrator, ShellError> {
    let packaged = config::is_packaged();
    let mode = if packaged {
        PackagingMode::Packaged {
            resource_dir: app.path().resource_dir()?,
        }
    } else {
        PackagingMode::Development
    };
    let agent_path = resolve_agent_path(&mode, config.agent_path.as_deref());

    let preferences = match app.path().app_config_dir() {
        Ok(dir) => Preferences::load(dir.join(SETTINGS_FILE)),
        Err(e) => {
            warn!("no app config dir, preferences kept in memory: {}", e);
            Preferences::in_memory()
        }
    };

    let version = app.package_info().version.to_string();
    let update_source = match config.update_url.as_deref() {
        Some(url) => {
            let dir = app.path().app_cache_dir()?.join("updates");
            match HttpUpdateSource::new(url, version.clone(), dir) {
                Ok(source) => Some(Arc::new(source) as Arc<dyn UpdateSource>),
                Err(e) => {
                    warn!("update source disabled: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    info!(
        agent = %agent_path.display(),
        packaged,
        updates = update_source.is_some(),
        "shell configured"
    );

    let components = Components {
        api: Arc::new(AgentClient::new(config.agent_base_url())),
        surface: Arc::new(TauriSurface::new(app.clone())),
        launcher: Arc::new(ShellLauncher::new(app.clone())),
        preferences: Arc::new(preferences),
        update_source,
        agent_path,
        packaged,
        version,
    };
    Ok(Orchestrator::new(config, components))
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let config = ShellConfig::from_env();
    init_tracing(&config);
    info!("Starting The Third Eye v{}", env!("CARGO_PKG_VERSION"));

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .plugin(tauri_plugin_notification::init())
        .setup(move |app| {
            let shell = Arc::new(build_orchestrator(app.handle(), config)?);
            app.manage(Arc::clone(&shell));
            tauri::async_runtime::spawn(async move {
                shell.bootstrap().await;
            });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::query::get_agent_status,
            commands::query::get_logs,
            commands::query::get_alerts,
            commands::config::apply_config,
            commands::config::get_notifications_enabled,
            commands::config::set_notifications_enabled,
            commands::update::get_update_status,
            commands::update::install_update,
            commands::shell::main_ui_ready,
            commands::shell::focus_main_window,
            commands::shell::restart_agent,
        ])
        .build(tauri::generate_context!())
        .expect("error building tauri application");

    app.run(|app, event| {
        if let RunEvent::ExitRequested { .. } | RunEvent::Exit = event {
            if let Some(shell) = app.try_state::<Arc<Orchestrator>>() {
                shell.shutdown();
            }
        }
    });
}
