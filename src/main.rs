//! Streamr Operator service - stake allocation and transaction submission
//!
//! Drives a single Operator contract: serialized nonce-safe sends, typed reads,
//! and pro-rata staking of unallocated value across sponsorships.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

mod allocation;
mod api;
mod chain;
mod config;
mod contract;
mod error;
mod metrics;
mod operator;
mod tx;

#[cfg(test)]
mod testing;

use allocation::AllocationEngine;
use api::AppState;
use chain::RpcClient;
use config::Settings;
use contract::{ExplorerSource, FileSource, InterfaceProvider, InterfaceSource};
use metrics::MetricsServer;
use operator::Operator;
use tx::TransactionManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Streamr Operator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let contract_address = settings.operator.contract_address()?;
    let owner_address = settings.operator.owner_address()?;
    info!(
        "Loaded configuration for operator {:?} on {}",
        contract_address, settings.chain.name
    );

    let wallet = tx::load_wallet(&settings.operator.private_key_env)
        .context("Failed to load signing key")?;

    // Chain connection
    let client = Arc::new(RpcClient::new(&settings.chain)?);

    // Contract interface
    let source: Box<dyn InterfaceSource> = match &settings.interface.abi_path {
        Some(path) => Box::new(FileSource::new(path)),
        None => Box::new(ExplorerSource::new(
            settings.interface.explorer_url.clone(),
            settings.interface.api_key.clone(),
        )?),
    };
    let interfaces = InterfaceProvider::new(source);
    let descriptor = interfaces
        .descriptor(contract_address)
        .await
        .context("Failed to load operator contract interface")?;

    // Transaction manager
    let manager = Arc::new(
        TransactionManager::new(client, descriptor, Arc::new(wallet), &settings.transactions)
            .await?,
    );
    info!("Transaction manager ready, next nonce {}", manager.next_nonce().await);

    let operator = Operator::new(
        manager,
        owner_address,
        settings.operator.confirmation_timeout(),
    );
    let engine = AllocationEngine::new(operator.clone(), settings.operator.protocol_fee_percent);

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState { operator, engine };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new("0.0.0.0", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Streamr Operator is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Streamr Operator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,streamr_operator=debug,hyper=warn"));

    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
}
