//! Persisted domain records
//!
//! This module contains the records the migration orchestrator reads and writes:
//! - Ledger outputs (`Utxo`, `Asset`)
//! - Migration attempts (`MigrationRecord`, `MigrationStep`, `MigrationStatus`)
//! - Draft and final wallets (`DraftWallet`, `Wallet`)
//! - Governance proxies (`Proxy`)

pub mod migration;
pub mod proxy;
pub mod utxo;
pub mod wallet;

pub use migration::{MigrationRecord, MigrationSnapshot, MigrationStatus, MigrationStep};
pub use proxy::{Proxy, ProxyDrepStatus};
pub use utxo::{format_ada, total_lovelace, Asset, Utxo, LOVELACE, LOVELACE_PER_ADA};
pub use wallet::{DraftWallet, Wallet};
