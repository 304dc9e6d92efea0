//! Bridge Gateway server.
//!
//! Listens on a Unix domain socket and serves the bridge protocol to local
//! callers. Each connection is tagged with the peer uid taken from the
//! socket credentials; that uid is what the identity verifier checks.
//!
//! # Protocol
//!
//! Newline-delimited JSON, one request per line, one reply per request.
//! See `bridge_gateway::protocol::wire` for the frame shapes.
//!
//! # Background jobs
//!
//! Unless `--no-worker` is given, a worker thread drains the job queue that
//! accepted submissions are handed to.

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use bridge_gateway::{BridgeConfig, JobWorker, ResultSyncJob};

use server::{bind, socket_owner_uid, BridgeServer, SocketGuard};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "bridge-gateway-server",
    about = "Serve the bridge protocol on a Unix socket",
    version
)]
struct Cli {
    /// Data directory (default: $BRIDGE_HOME or ~/.bridge)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Socket path (default: <home>/bridge.sock)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Package registry manifest (default: <home>/registry.json)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Do not run queued jobs in this process
    #[arg(long)]
    no_worker: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

// ── main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log to stderr; the minimal subscriber also captures `log` records from
    // the library.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = match &cli.home {
        Some(home) => BridgeConfig::load(home.clone()),
        None => BridgeConfig::load_default(),
    }
    .context("failed to load configuration")?;
    if let Some(socket) = cli.socket {
        config.socket_path = Some(socket);
    }
    if let Some(registry) = cli.registry {
        config.registry_path = Some(registry);
    }

    let socket_path = config.socket_path();
    let listener = bind(&socket_path)?;
    let _socket_guard = SocketGuard(socket_path.clone());
    let host_uid = socket_owner_uid(&socket_path)?;

    let dispatcher = Arc::new(
        config
            .build_dispatcher(host_uid)
            .context("failed to initialise gateway")?,
    );

    let worker = match (cli.no_worker, dispatcher.jobs()) {
        (false, Some(queue)) => Some(
            JobWorker::spawn(
                queue.clone(),
                Arc::new(ResultSyncJob),
                config.worker_poll_interval(),
            )
            .context("failed to start job worker")?,
        ),
        _ => None,
    };

    tracing::info!(
        "listening on {} (host uid={host_uid}, allowed package={})",
        socket_path.display(),
        config.allowed_package
    );

    BridgeServer::new(dispatcher)
        .serve(listener, shutdown_signal())
        .await?;

    if let Some(worker) = worker {
        tokio::task::spawn_blocking(move || worker.shutdown()).await?;
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
