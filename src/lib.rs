//! Multisig Migrate: resumable migration of multisig wallets in Rust
//!
//! This crate moves a shared-custody wallet's funds, governance proxies and
//! identity to a new signer configuration:
//! - Step state machine persisted through a migration record store
//! - Concurrent pre-checks (DRep, staking, pending transactions)
//! - Draft → final wallet two-phase commit with invite links
//! - Single sweep transaction and a polled completion gate
//! - Proxy reassignment and per-action isolated abort
//! - JSON persistence with rotating backups
//!
//! # Example
//!
//! ```ignore
//! use multisig_migrate::migration::{MigrationOrchestrator, Services};
//! use multisig_migrate::MigrationConfig;
//!
//! let mut orchestrator =
//!     MigrationOrchestrator::mount(services, MigrationConfig::default(), &wallet_id, &owner).await?;
//!
//! // Pre-checks must pass before a new wallet can be created
//! orchestrator.start().await?;
//! orchestrator.confirm_pre_checks().await?;
//!
//! // Once co-signers agree, commit and sweep
//! orchestrator.create_draft(new_config).await?;
//! orchestrator.finalize().await?;
//! orchestrator.sweep().await?;
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod ledger;
pub mod migration;
pub mod multisig;
pub mod storage;

// Re-export commonly used types
pub use config::MigrationConfig;
pub use core::{DraftWallet, MigrationRecord, MigrationStatus, MigrationStep, Proxy, Utxo, Wallet};
pub use ledger::{FixtureLedger, LedgerQuery};
pub use migration::{MigrationError, MigrationOrchestrator, MigrationState, Services};
pub use multisig::{NativeScriptDeriver, ScriptDeriver, Signer, TransactionService, WalletConfig};
pub use storage::{MemoryStore, Storage};
