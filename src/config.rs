//! Orchestrator configuration

use crate::multisig::Network;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Migration orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationConfig {
    /// Seconds between completion-gate refreshes
    pub poll_interval_secs: u64,
    /// Upper bound on a single external status lookup
    pub check_timeout_secs: u64,
    /// Base URL invite links are built on
    pub invite_base_url: String,
    pub network: Network,
    /// Data directory for the record store
    pub data_dir: PathBuf,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            check_timeout_secs: 10,
            invite_base_url: "http://localhost:3000".to_string(),
            network: Network::Testnet,
            data_dir: PathBuf::from(".multisig_data"),
        }
    }
}

impl MigrationConfig {
    /// Load from a JSON file; absent fields keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs.max(1))
    }
}
