//! Draft and final wallet records

use crate::multisig::WalletConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mutable, pre-commit wallet configuration shared through an invite link
///
/// A draft has no script or address; nothing about it is committed on-chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftWallet {
    pub id: String,
    /// Migration this draft was created for, used as its idempotency key
    pub migration_id: Option<String>,
    pub owner_address: String,
    pub config: WalletConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A committed multisig wallet
///
/// `config`, `script` and `address` are fixed at creation; the store offers no
/// way to change them. Only the migration pointer and archive flag move.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub id: String,
    pub config: WalletConfig,
    /// Hex-encoded spending script as produced by the script deriver
    pub script: String,
    pub address: String,
    #[serde(default)]
    pub stake_address: Option<String>,
    /// Direct DRep id of the wallet script, if it registered as one
    #[serde(default)]
    pub drep_id: Option<String>,
    /// Migration that produced this wallet
    #[serde(default)]
    pub migration_id: Option<String>,
    /// Wallet this one is being migrated to
    #[serde(default)]
    pub migration_target_wallet_id: Option<String>,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether `address` may see this wallet
    pub fn is_visible_to(&self, address: &str) -> bool {
        self.config.is_signer(address)
    }
}
