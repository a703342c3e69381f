use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod auth;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod prompts;
pub mod request;
pub mod server;
pub mod single_call;
pub mod transport;

pub use config::{LogSettings, RelayConfig};
pub use error::RelayError;

const LOG_FILE_NAME: &str = "gateway.log";

pub fn init_conf_dir(conf_dir: Option<std::path::PathBuf>) {
    config::init_conf_dir(conf_dir);
}

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(settings: &LogSettings) {
    static TRACE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    let file_layer = match settings.path.as_deref() {
        Some(dir) => match RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILE_NAME)
            .build(dir)
        {
            Ok(appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let _ = TRACE_GUARD.set(guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
            }
            Err(error) => {
                eprintln!(
                    "warning: failed to open gateway log in {}: {error}",
                    dir.display()
                );
                None
            }
        },
        None => None,
    };
    let stdout_layer = settings
        .stdout
        .then(|| tracing_subscriber::fmt::layer().with_ansi(false));

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));
    if let Err(error) = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
    {
        eprintln!("warning: failed to initialize gateway tracing subscriber: {error}");
    }
}

/// Loads the config from the conf dir and serves until shutdown.
pub async fn run_serve(bind_override: Option<String>) -> Result<(), String> {
    let mut config = load_config()?;
    if let Some(bind) = bind_override {
        config.bind_addr = bind;
    }
    init_tracing(&config.log);
    server::serve(config).await
}

pub fn print_models() -> Result<(), String> {
    let config = load_config()?;
    for entry in config.catalog.entries() {
        let provider = entry
            .provider
            .map(|kind| kind.as_str())
            .unwrap_or("orchestrator");
        let marker = if entry.id == config.default_model {
            " (default)"
        } else {
            ""
        };
        println!(
            "{}\t{}\t{}{}",
            entry.id, provider, entry.display_name, marker
        );
    }
    Ok(())
}

fn load_config() -> Result<RelayConfig, String> {
    config::load_relay_config(&config::default_config_path())
}

#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> Result<(), String> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|error| format!("register SIGTERM handler failed: {error}"))?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> Result<(), String> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|error| format!("wait for ctrl+c failed: {error}"))?;
    Ok(())
}
