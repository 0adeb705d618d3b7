// src/lib.rs

pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod logsink;
pub mod store;
pub mod types;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::config::{load_or_default, ConfigFile};
use crate::engine::RunCoordinator;
use crate::exec::ScriptLauncher;
use crate::fs::RealFileSystem;
use crate::store::{FileRecordStore, RecordStore};
use crate::types::RunStatus;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - record store / blob store / launcher
/// - the run coordinator
/// - the HTTP server
/// - Ctrl-C handling (stops the active run before exiting)
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.as_ref().map(PathBuf::from);
    let mut cfg = load_or_default(config_path.as_deref())?;

    if let Some(host) = args.host {
        cfg.server.host = host;
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let coordinator = build_coordinator(&cfg)?;

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                cfg.server.host, cfg.server.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "timebox listening");

    let app = api::router(coordinator.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    coordinator.shutdown().await;
    info!("timebox exiting");
    Ok(())
}

/// Build the production coordinator described by `cfg`.
pub fn build_coordinator(cfg: &ConfigFile) -> Result<RunCoordinator> {
    let store = FileRecordStore::open(cfg.storage.records_path())?;

    let stale = store.count_by_status(RunStatus::Running)?;
    if stale > 0 {
        info!(
            stale,
            "records still marked running from a previous process; stop them to release the slot"
        );
    }

    let launcher = ScriptLauncher::new(cfg.interpreter.clone(), cfg.interpreter_args.clone());
    debug!(interpreter = %launcher.interpreter(), "script launcher ready");

    Ok(RunCoordinator::new(
        Arc::new(store),
        Arc::new(RealFileSystem),
        Arc::new(launcher),
        cfg.supervisor,
        cfg.upload.clone(),
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// Simple dry-run output: print the resolved configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("timebox dry-run");
    println!("  server = {}:{}", cfg.server.host, cfg.server.port);
    println!("  storage.data_dir = {}", cfg.storage.data_dir.display());
    println!("    scripts: {}", cfg.upload.scripts_dir.display());
    println!("    logs: {}", cfg.upload.logs_dir.display());
    println!("    records: {}", cfg.storage.records_path().display());
    println!("  supervisor.interpreter = {}", cfg.interpreter);
    if !cfg.interpreter_args.is_empty() {
        println!("  supervisor.interpreter_args = {:?}", cfg.interpreter_args);
    }
    println!("  supervisor.term_grace = {:?}", cfg.supervisor.term_grace);
    println!("  supervisor.drain_grace = {:?}", cfg.supervisor.drain_grace);
    println!(
        "  upload.allowed_extensions = {:?}",
        cfg.upload.allowed_extensions
    );
    println!("  upload.default_hours = {}", cfg.upload.default_hours);

    debug!("dry-run complete (no server started)");
}
