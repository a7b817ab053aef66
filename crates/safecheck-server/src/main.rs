//! safecheck-server - SafeCheck backend server
//!
//! JSON API over HTTP, plus the escalation scheduler and the overdue
//! check-in sweep running in the background.

use safecheck_core::notify::{ConsoleSmsSender, SmsSender, TwilioSmsSender};
use safecheck_core::store::Stores;
use safecheck_core::{Database, Engine, EngineOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("safecheck_server=info,safecheck_core=info")),
        )
        .init();

    info!("safecheck-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load()?;
    info!("Config loaded from {:?}", config.config_path);

    let (stores, database) = if config.in_memory {
        info!("Using in-memory storage; data is lost on exit");
        (Stores::in_memory(), None)
    } else {
        let db = Arc::new(Database::open_path(&config.database_path)?);
        info!("Database opened at {:?}", config.database_path);
        (Stores::from_backend(db.clone()), Some(db))
    };

    let sms: Arc<dyn SmsSender> = match &config.twilio {
        Some(twilio) => {
            info!(from = %twilio.from_number, "SMS delivery via Twilio");
            Arc::new(TwilioSmsSender::new(twilio.clone())?)
        }
        None => {
            info!("Twilio not configured, SMS will be logged only");
            Arc::new(ConsoleSmsSender)
        }
    };

    let engine = Engine::new(
        stores,
        EngineOptions {
            sms,
            poll_interval: config.escalation_poll_interval,
            ..Default::default()
        },
    );

    let bind_addr = config.bind_addr.clone();
    let state = state::AppState::new(config, engine, database);

    state.engine.escalation.start().await;
    state.sweeper.clone().start().await;

    let app = routes::create_router(state.clone());
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    state.sweeper.stop().await;
    state.engine.escalation.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
