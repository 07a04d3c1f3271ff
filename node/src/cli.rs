//! # CLI Interface
//!
//! Defines the command-line argument structure for `harbor-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Harbor vault node.
///
/// Serves one vault and its wrapper ledger over HTTP, persists every
/// committed transition, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "harbor-node",
    about = "Harbor yield vault node",
    version,
    propagate_version = true
)]
pub struct HarborNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Harbor node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Write a default vault configuration into a data directory.
    Init(InitArgs),
    /// Query the status of a running node via its API endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the vault configuration file (TOML).
    ///
    /// When omitted, the node looks for `config.toml` in the data directory
    /// and falls back to built-in defaults.
    #[arg(long, short = 'c', env = "HARBOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the database and configuration.
    #[arg(long, short = 'd', env = "HARBOR_DATA_DIR", default_value = ".harbor")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "HARBOR_RPC_PORT", default_value_t = 9841)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "HARBOR_METRICS_PORT", default_value_t = 9842)]
    pub metrics_port: u16,

    /// Log output format.
    #[arg(long, value_enum, env = "HARBOR_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "HARBOR_DATA_DIR", default_value = ".harbor")]
    pub data_dir: PathBuf,

    /// Owner identity written into the configuration.
    #[arg(long)]
    pub owner: Option<String>,

    /// Let users hold wrapped balances outside the vault.
    #[arg(long)]
    pub independent: bool,

    /// Overwrite an existing `config.toml`.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        HarborNodeCli::command().debug_assert();
    }

    #[test]
    fn run_accepts_json_logs() {
        let cli = HarborNodeCli::try_parse_from([
            "harbor-node",
            "run",
            "--log-format",
            "json",
            "--rpc-port",
            "1234",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.log_format, LogFormat::Json);
                assert_eq!(args.rpc_port, 1234);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
