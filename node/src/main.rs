// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Quintet Node
//!
//! Entry point for the `quintet-node` binary. Parses CLI arguments, loads
//! the configuration, initializes logging and metrics, opens the ledger
//! store and serves the JSON API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the node
//! - `rates`   — print the exchange and fiat rate tables
//! - `version` — print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use quintet_ledger::engine::OsRandom;
use quintet_ledger::storage::LedgerStore;
use quintet_ledger::{Currency, Engine, MemoryStore, RateTable, SledStore};

use cli::{Commands, QuintetNodeCli};
use config::{NodeConfig, StorageKind};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = QuintetNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Rates => {
            print_rates();
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = NodeConfig::load(&args)?;
    logging::init_logging(
        &config.log_filter(),
        LogFormat::from_str_lossy(&config.log_format),
    );

    tracing::info!(
        rpc_port = config.rpc_port,
        metrics_port = config.metrics_port,
        data_dir = %config.data_dir.display(),
        storage = ?config.storage,
        "starting quintet-node"
    );

    // --- Ledger ---
    let store = open_store(&config)?;
    let engine = Engine::new(
        store,
        RateTable::standard(),
        Box::new(OsRandom),
        config.engine.clone(),
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: Arc::new(engine),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", config.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("quintet-node stopped");
    Ok(())
}

/// Opens the store selected by the configuration.
fn open_store(config: &NodeConfig) -> Result<Arc<dyn LedgerStore>> {
    match config.storage {
        StorageKind::Memory => {
            tracing::warn!("using in-memory ledger, nothing survives a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageKind::Sled => {
            let db_path = config.data_dir.join("ledger");
            std::fs::create_dir_all(&db_path).with_context(|| {
                format!("failed to create database directory: {}", db_path.display())
            })?;

            let store = SledStore::open(&db_path)
                .with_context(|| format!("failed to open database at {}", db_path.display()))?;
            tracing::info!(
                path = %db_path.display(),
                accounts = store.account_count(),
                transactions = store.transaction_count(),
                "database opened"
            );
            Ok(Arc::new(store))
        }
    }
}

/// Prints the rate matrix and fiat values to stdout.
fn print_rates() {
    let table = RateTable::standard();

    println!("{:<6} {:<6} {:>16}", "FROM", "TO", "RATE");
    for entry in table.entries() {
        println!("{:<6} {:<6} {:>16}", entry.from, entry.to, entry.rate.to_string());
    }

    println!();
    println!("{:<6} {:>16}", "UNIT", "FIAT");
    for currency in Currency::ALL {
        println!("{:<6} {:>16}", currency, table.fiat_rate(currency).to_string());
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("quintet-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
