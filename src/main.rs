mod config;
mod lead;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, CredentialSource, BOT_TOKEN_VAR, CHAT_ID_VAR};
use crate::lead::AppState;
use crate::telegram::TelegramClient;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_LOG_FILTER: &str = "info,leadrelay=debug";

/// Config file named by the first argument, `config.toml` otherwise.
fn config_path_from_args(mut args: impl Iterator<Item = String>) -> PathBuf {
    args.nth(1)
        .filter(|arg| !arg.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config_path = config_path_from_args(std::env::args());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Lead relay settings ({}):", config_path.display());
    info!("  Listen: {}", config.server.bind_address);
    info!("  Route: {}", config.server.route);
    info!("  Max body: {} bytes", config.server.max_body_bytes);
    info!("  Telegram API: {}", config.telegram.api_base_url);
    info!("  Telegram timeout: {}s", config.telegram.timeout_secs);

    let credentials = CredentialSource::Environment;
    if credentials.resolve().is_none() {
        // Not fatal: every POST answers 500 until the variables are set.
        warn!(
            "{} / {} not set; leads will be refused",
            BOT_TOKEN_VAR, CHAT_ID_VAR
        );
    }

    let telegram = TelegramClient::new(&config.telegram)?;
    let state = Arc::new(AppState::new(telegram, credentials));
    let app = lead::router(state, &config.server);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind_address))?;

    info!("Lead relay listening on {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Lead relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
