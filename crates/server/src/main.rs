mod bootstrap;
mod degraded;
mod health;
mod receiver;

use std::time::Duration;

use anyhow::Result;
use budzy_core::config::{AppConfig, LoadOptions};
use tracing::{error, info};

/// How long shutdown waits for handler tasks that were still replying to Slack.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn init_logging(config: &AppConfig) {
    use budzy_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging depends on config, so config errors surface through anyhow on stderr.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config);
    let address = app.config.listen_address();
    let listener = bootstrap::bind(&app).await?;

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        mode = app.mode.label(),
        bind_address = %address,
        "budzy-server listening"
    );

    let tasks = app.tasks.clone();
    if let Err(error) =
        axum::serve(listener, app.router).with_graceful_shutdown(wait_for_shutdown()).await
    {
        error!(
            event_name = "system.server.error",
            correlation_id = "shutdown",
            error = %error,
            "server terminated unexpectedly"
        );
    }

    let drained = tasks.drain(SHUTDOWN_GRACE).await;
    info!(
        event_name = "system.server.drained",
        correlation_id = "shutdown",
        drained,
        "in-flight handler tasks finished"
    );

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "budzy-server stopping"
    );
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
}
