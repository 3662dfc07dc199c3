//! Store traits for migration, draft, wallet and proxy records
//!
//! Each record family gets its own trait so the orchestrator can be wired to
//! separate backends, and so a failure in one store stays isolated from the
//! others during abort.

use crate::core::{DraftWallet, MigrationRecord, MigrationSnapshot, MigrationStatus, MigrationStep, Proxy, Wallet};
use crate::multisig::{DerivedScript, DraftUpdate, WalletConfig};
use crate::storage::persistence::StorageError;
use async_trait::async_trait;

/// Parameters of a new migration record
#[derive(Debug, Clone)]
pub struct NewMigration {
    pub original_wallet_id: String,
    pub owner_address: String,
    pub snapshot: MigrationSnapshot,
    /// `PreChecks`, or `CreateWallet` when resuming from a legacy pointer
    pub start_step: MigrationStep,
    pub new_wallet_id: Option<String>,
}

/// Durable migration records
///
/// Implementations must refuse a second non-terminal record for the same
/// original wallet.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Create a record, failing with [`StorageError::Conflict`] if an active
    /// one already exists for the original wallet
    async fn create_migration(&self, new: NewMigration) -> Result<MigrationRecord, StorageError>;

    /// Move a record to `current_step`; `new_wallet_id` is only written when given
    async fn update_migration_step(
        &self,
        migration_id: &str,
        current_step: MigrationStep,
        status: MigrationStatus,
        new_wallet_id: Option<&str>,
    ) -> Result<MigrationRecord, StorageError>;

    async fn complete_migration(&self, migration_id: &str) -> Result<MigrationRecord, StorageError>;

    async fn cancel_migration(&self, migration_id: &str) -> Result<MigrationRecord, StorageError>;

    /// Non-terminal records whose owner is `owner_address`
    async fn get_pending_migrations(
        &self,
        owner_address: &str,
    ) -> Result<Vec<MigrationRecord>, StorageError>;

    async fn get_migration(&self, migration_id: &str) -> Result<Option<MigrationRecord>, StorageError>;
}

/// Mutable pre-commit wallet configurations
#[async_trait]
pub trait DraftWalletStore: Send + Sync {
    /// Create a draft; with a `migration_id`, an existing draft for that
    /// migration is returned instead of creating another
    async fn create_new_wallet(
        &self,
        owner_address: &str,
        config: WalletConfig,
        migration_id: Option<&str>,
    ) -> Result<DraftWallet, StorageError>;

    async fn update_new_wallet(
        &self,
        draft_id: &str,
        update: DraftUpdate,
    ) -> Result<DraftWallet, StorageError>;

    async fn get_new_wallet(&self, draft_id: &str) -> Result<Option<DraftWallet>, StorageError>;

    async fn find_draft_for_migration(
        &self,
        migration_id: &str,
    ) -> Result<Option<DraftWallet>, StorageError>;

    async fn delete_new_wallet(&self, draft_id: &str) -> Result<(), StorageError>;
}

/// Committed wallets
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Create a final wallet; with a `migration_id`, an existing wallet for
    /// that migration is returned instead of creating another
    async fn create_wallet(
        &self,
        config: WalletConfig,
        derived: &DerivedScript,
        migration_id: Option<&str>,
    ) -> Result<Wallet, StorageError>;

    /// Register a wallet that already exists on-chain
    async fn import_wallet(&self, wallet: Wallet) -> Result<Wallet, StorageError>;

    /// Look up a wallet visible to `owner_address`
    async fn get_wallet(
        &self,
        owner_address: &str,
        wallet_id: &str,
    ) -> Result<Option<Wallet>, StorageError>;

    async fn find_wallet_for_migration(
        &self,
        migration_id: &str,
    ) -> Result<Option<Wallet>, StorageError>;

    async fn set_migration_target(
        &self,
        original_wallet_id: &str,
        target_wallet_id: &str,
    ) -> Result<(), StorageError>;

    async fn clear_migration_target(&self, original_wallet_id: &str) -> Result<(), StorageError>;

    /// Drop the wallet's link to the migration that created it
    async fn detach_wallet(&self, wallet_id: &str) -> Result<(), StorageError>;

    async fn archive_wallet(&self, wallet_id: &str) -> Result<(), StorageError>;

    async fn delete_wallet(&self, wallet_id: &str) -> Result<(), StorageError>;
}

/// Governance proxy registry
#[async_trait]
pub trait ProxyStore: Send + Sync {
    async fn get_proxies_by_wallet(&self, wallet_id: &str) -> Result<Vec<Proxy>, StorageError>;

    async fn create_proxy(
        &self,
        wallet_id: &str,
        proxy_address: &str,
        param_ref: &str,
        description: &str,
    ) -> Result<Proxy, StorageError>;

    /// Rebind every proxy of `from_wallet_id` to `to_wallet_id`; returns the count
    async fn transfer_proxies(
        &self,
        from_wallet_id: &str,
        to_wallet_id: &str,
    ) -> Result<usize, StorageError>;
}
