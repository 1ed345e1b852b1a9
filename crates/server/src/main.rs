mod bootstrap;
mod health;
mod integrations;
mod routes;

use std::time::Duration;

use anyhow::Result;
use atende_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use atende_core::config::LogFormat::*;
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
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let router = health::router(app.health_state()).merge(routes::router(app.api_state()));
    tracing::info!(
        event_name = "system.server.listening",
        correlation_id = "bootstrap",
        bind_address = %address,
        transport_mode = health::TRANSPORT_MODE,
        "http endpoints started"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let server = tokio::spawn(async move {
        axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await
    });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "atende-server started"
    );

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            tracing::error!(
                event_name = "system.server.error",
                correlation_id = "shutdown",
                error = %error,
                "http server terminated unexpectedly"
            );
        }
        Err(error) => return Err(error.into()),
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "atende-server stopping"
    );
    // Spawned notification deliveries get a bounded window to finish.
    tokio::time::sleep(grace.min(Duration::from_secs(5))).await;
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.server.signal_failed",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c; shutting down"
        );
    }
}
