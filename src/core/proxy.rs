//! Governance proxy bindings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A delegated governance contract recorded as owned by a wallet
///
/// Only `wallet_id` changes when a proxy is reassigned; the contract
/// address stays the same.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proxy {
    pub id: String,
    pub wallet_id: String,
    pub proxy_address: String,
    /// Parameter reference (auth token policy) of the proxy contract
    pub param_ref: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Governance registration of a proxy as reported by the ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProxyDrepStatus {
    pub registered: bool,
}
