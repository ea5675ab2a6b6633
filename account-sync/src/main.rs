//! Account Sync Web Server - identity provider webhook receiver.
//!
//! This binary:
//! - Receives signed account lifecycle webhooks
//! - Verifies the signature against the configured secret
//! - Mirrors each event into the account service
//!
//! Startup fails if the webhook secret is missing or malformed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use accountsync::{
    router, AppState, Config, DeliveryLedger, HttpAccountApi, InMemoryAccountApi,
    SharedAccountApi,
};

/// How often expired ledger entries are swept.
const LEDGER_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        port = config.port,
        account_api_url = %config.account_api_url,
        account_api_key_configured = config.account_api_key.is_some(),
        account_api_in_memory = config.account_api_in_memory,
        signature_tolerance_secs = config.signature_tolerance_secs,
        dedup_enabled = config.dedup_enabled,
        dedup_ttl_secs = config.dedup_ttl_secs,
        link_external_id = config.link_external_id,
        "config_loaded"
    );

    // Create the account service client
    let accounts: SharedAccountApi = if config.account_api_in_memory {
        info!("account_api_in_memory");
        Arc::new(InMemoryAccountApi::new())
    } else {
        Arc::new(HttpAccountApi::from_config(&config).context("Failed to build account client")?)
    };

    // Create application state
    let port = config.port;
    let state = AppState::new(config, accounts);

    if let Some(ledger) = state.ledger.clone() {
        tokio::spawn(sweep_ledger(ledger));
    }

    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Periodically drop expired delivery ids.
async fn sweep_ledger(ledger: DeliveryLedger) {
    let mut interval = tokio::time::interval(LEDGER_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let removed = ledger.purge_expired();
        if removed > 0 {
            info!(removed = removed, "ledger_swept");
        }
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
