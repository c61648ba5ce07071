//! Node configuration with TOML file support.
//!
//! ```toml
//! data_dir = "./quintet_data"
//! rpc_port = 9841
//! metrics_port = 9842
//! log_level = "info"
//! log_format = "pretty"
//! storage = "sled"
//!
//! [engine]
//! referral_code_prefix = "QNT"
//! lock_timeout_ms = 2000
//! commit_retries = 3
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quintet_ledger::config::EngineConfig;

use crate::cli::RunArgs;

/// Which ledger store backs the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Durable sled database under `data_dir`.
    Sled,
    /// In-process maps, gone on exit.
    Memory,
}

/// Configuration for a Quintet node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for ledger storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// JSON API port.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Prometheus metrics port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_storage")]
    pub storage: StorageKind,

    /// Ledger engine tunables.
    #[serde(default)]
    pub engine: EngineConfig,
}

// -- Serde default helpers --------------------------------------------------

fn default_data_dir() -> PathBuf {
    PathBuf::from("./quintet_data")
}

fn default_rpc_port() -> u16 {
    9841
}

fn default_metrics_port() -> u16 {
    9842
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_storage() -> StorageKind {
    StorageKind::Sled
}

// -- Impl -------------------------------------------------------------------

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Resolves the effective configuration for `run`.
    ///
    /// An explicit `--config` must exist. Otherwise `config.toml` in the
    /// data directory is used if present. CLI flags are applied last.
    pub fn load(args: &RunArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_toml_file(path)?,
            None => {
                let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
                let candidate = data_dir.join("config.toml");
                if candidate.is_file() {
                    Self::from_toml_file(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(args);
        Ok(config)
    }

    /// Copies every flag the user actually set over the file values.
    pub fn apply_overrides(&mut self, args: &RunArgs) {
        if let Some(dir) = &args.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(port) = args.rpc_port {
            self.rpc_port = port;
        }
        if let Some(port) = args.metrics_port {
            self.metrics_port = port;
        }
        if args.memory {
            self.storage = StorageKind::Memory;
        }
    }

    /// Filter directive for the tracing subscriber.
    pub fn log_filter(&self) -> String {
        format!(
            "quintet_node={level},quintet_ledger={level},tower_http=info",
            level = self.log_level
        )
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            rpc_port: default_rpc_port(),
            metrics_port: default_metrics_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            storage: default_storage(),
            engine: EngineConfig::default(),
        }
    }
}
