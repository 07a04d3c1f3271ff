// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Harbor Vault Node
//!
//! Entry point for the `harbor-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the vault engine on its sled
//! database, and serves the HTTP API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the node
//! - `init`    — write a default `config.toml` into a data directory
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use harbor_protocol::storage::HarborDB;
use harbor_protocol::{VaultConfig, VaultService};

use cli::{Commands, HarborNodeCli};
use logging::LogFormat;
use metrics::VaultMetrics;

/// File name of the vault configuration inside the data directory.
const CONFIG_FILE: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = HarborNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Loads the vault configuration: explicit path first, then the data
/// directory, then built-in defaults.
fn load_config(explicit: Option<&Path>, data_dir: &Path) -> Result<VaultConfig> {
    if let Some(path) = explicit {
        return VaultConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }

    let path = data_dir.join(CONFIG_FILE);
    if path.exists() {
        VaultConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))
    } else {
        tracing::warn!(path = %path.display(), "no config file, using defaults");
        Ok(VaultConfig::default())
    }
}

/// Starts the node: opens the engine, then serves the API and metrics.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format);

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting harbor-node"
    );

    let config = load_config(args.config.as_deref(), &args.data_dir)?;

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = HarborDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Engine ---
    let service = Arc::new(
        VaultService::open_devnet(&config, db).context("failed to open vault engine")?,
    );
    let summary = service.summary().context("failed to read vault state")?;
    tracing::info!(
        vault = %config.vault_address,
        round = summary.round,
        epoch = summary.epoch,
        total_shares = summary.total_shares,
        round_cadence_secs = harbor_protocol::config::ROUND_CADENCE.as_secs(),
        epoch_cadence_secs = harbor_protocol::config::EPOCH_CADENCE.as_secs(),
        "vault ready"
    );

    // --- Metrics ---
    let vault_metrics =
        Arc::new(VaultMetrics::new().context("failed to register prometheus metrics")?);
    vault_metrics.observe(&summary);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            harbor_protocol::config::PROTOCOL_VERSION,
        ),
        service,
        metrics: Arc::clone(&vault_metrics),
        started_at: Utc::now(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(vault_metrics);
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
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

    tracing::info!("harbor-node stopped");
    Ok(())
}

/// Writes a default vault configuration into the data directory.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("harbor_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite",
            config_path.display()
        );
    }

    let mut config = VaultConfig::default();
    if let Some(owner) = args.owner {
        config.owner = owner;
    }
    config.independent = args.independent;
    config.validate().context("invalid configuration")?;

    let rendered = config.to_toml_string().context("failed to render config")?;
    std::fs::write(&config_path, rendered)
        .with_context(|| format!("failed to write config to {}", config_path.display()))?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Config         : {}", config_path.display());
    println!("  Vault          : {}", config.vault_address);
    println!("  Owner          : {}", config.owner);
    println!("  Independent    : {}", config.independent);

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let endpoint = Endpoint::parse(&args.rpc_url)?;
    let body = http_get(&endpoint, "/status").await?;
    println!("{}", body);
    Ok(())
}

/// Host, port, and base path of an `http://` API endpoint.
#[derive(Debug, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
    base: String,
}

impl Endpoint {
    fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| anyhow::anyhow!("only http:// endpoints are supported: {}", url))?;

        let (authority, base) = match rest.find('/') {
            Some(i) => (&rest[..i], rest[i..].trim_end_matches('/')),
            None => (rest, ""),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .with_context(|| format!("bad port in {}", url))?,
            ),
            None => (authority, 80),
        };
        if host.is_empty() {
            anyhow::bail!("missing host in {}", url);
        }

        Ok(Self {
            host: host.to_string(),
            port,
            base: base.to_string(),
        })
    }
}

/// One-shot HTTP/1.1 GET over a raw TCP stream. Returns the body.
async fn http_get(endpoint: &Endpoint, path: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = format!("{}:{}", endpoint.host, endpoint.port);
    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {}{} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        endpoint.base, path, endpoint.host,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    Ok(response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_else(|| response.to_string()))
}

/// Prints version information to stdout.
fn print_version() {
    println!("harbor-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", harbor_protocol::config::PROTOCOL_VERSION);
    println!("rustc       {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
