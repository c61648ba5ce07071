//! # CLI Interface
//!
//! Defines the command-line argument structure for `quintet-node` using
//! `clap` derive. Supports three subcommands: `run`, `rates`, and
//! `version`.
//!
//! Every `run` flag is optional. A flag (or its environment variable) wins
//! over the config file, which wins over the built-in defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quintet ledger node.
///
/// Serves the five-currency reward ledger over a JSON API and exposes
/// Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "quintet-node",
    about = "Quintet reward ledger node",
    version,
    propagate_version = true
)]
pub struct QuintetNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Quintet node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print the exchange rate table and exit.
    Rates,
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    ///
    /// When omitted, the node looks for `config.toml` in the data directory
    /// and falls back to defaults if there is none.
    #[arg(long, short = 'c', env = "QUINTET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the ledger database.
    #[arg(long, short = 'd', env = "QUINTET_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Port for the JSON API.
    #[arg(long, env = "QUINTET_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "QUINTET_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Keep the ledger in memory. Everything is lost on exit.
    #[arg(long)]
    pub memory: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        QuintetNodeCli::command().debug_assert();
    }

    #[test]
    fn run_flags_are_optional() {
        let cli = QuintetNodeCli::try_parse_from(["quintet-node", "run"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert!(args.rpc_port.is_none());
                assert!(!args.memory);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_flags_parse() {
        let cli = QuintetNodeCli::try_parse_from([
            "quintet-node",
            "run",
            "--rpc-port",
            "8080",
            "--memory",
            "-d",
            "/tmp/q",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.rpc_port, Some(8080));
        assert!(args.memory);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/q")));
    }
}
