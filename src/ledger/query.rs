//! Ledger query trait and result types

use crate::core::{ProxyDrepStatus, Utxo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ledger query errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Ledger unreachable: {0}")]
    Unreachable(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Lookup timed out after {0}s")]
    Timeout(u64),
}

/// Registration of a stake account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountStatus {
    pub active: bool,
    /// Pool the account delegates to
    #[serde(default)]
    pub pool_id: Option<String>,
}

/// Registration of a DRep
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DrepRegistration {
    pub active: bool,
}

/// External ledger query service
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Unspent outputs currently at an address
    async fn fetch_address_utxos(&self, address: &str) -> Result<Vec<Utxo>, LedgerError>;

    /// Registration and delegation of a stake address
    async fn get_account_status(&self, stake_address: &str) -> Result<AccountStatus, LedgerError>;

    /// Registration of a DRep id
    async fn get_drep_registration(&self, drep_id: &str) -> Result<DrepRegistration, LedgerError>;

    /// Governance registration of a proxy contract address
    async fn get_proxy_drep_status(&self, proxy_address: &str) -> Result<ProxyDrepStatus, LedgerError>;
}
