//! In-memory record store with optional file persistence
//!
//! [`MemoryStore`] implements every store trait over one [`StoreState`]
//! document. When opened with a [`Storage`], each mutation is written through
//! before it returns, and a failed write leaves the in-memory records as they
//! were.

use crate::core::{
    DraftWallet, MigrationRecord, MigrationStatus, MigrationStep, Proxy, Wallet,
};
use crate::crypto::new_record_id;
use crate::multisig::{DerivedScript, DraftUpdate, WalletConfig};
use crate::storage::persistence::{Storage, StorageError};
use crate::storage::store::{DraftWalletStore, MigrationStore, NewMigration, ProxyStore, WalletStore};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Every record, keyed by id
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreState {
    #[serde(default)]
    pub migrations: HashMap<String, MigrationRecord>,
    #[serde(default)]
    pub drafts: HashMap<String, DraftWallet>,
    #[serde(default)]
    pub wallets: HashMap<String, Wallet>,
    #[serde(default)]
    pub proxies: HashMap<String, Proxy>,
}

/// Store backed by a lock-guarded [`StoreState`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    storage: Option<Storage>,
}

impl MemoryStore {
    /// Create a new empty, non-persistent store
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted through `storage`, loading existing records
    pub fn persistent(storage: Storage) -> Result<Self, StorageError> {
        let state = if storage.exists() {
            log::info!("Loading existing record store...");
            storage.load()?
        } else {
            log::info!("Creating new record store...");
            let state = StoreState::default();
            storage.save(&state)?;
            state
        };

        Ok(Self {
            state: RwLock::new(state),
            storage: Some(storage),
        })
    }

    /// Copy of every record
    pub async fn snapshot(&self) -> StoreState {
        self.state.read().await.clone()
    }

    /// Apply `f` to a copy of the state and publish it once it is on disk
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let value = f(&mut next)?;
        if let Some(storage) = &self.storage {
            storage.save(&next)?;
        }
        *state = next;
        Ok(value)
    }

    fn migration_mut<'a>(
        state: &'a mut StoreState,
        migration_id: &str,
    ) -> Result<&'a mut MigrationRecord, StorageError> {
        state
            .migrations
            .get_mut(migration_id)
            .ok_or_else(|| StorageError::NotFound(format!("migration {}", migration_id)))
    }

    fn wallet_mut<'a>(state: &'a mut StoreState, wallet_id: &str) -> Result<&'a mut Wallet, StorageError> {
        state
            .wallets
            .get_mut(wallet_id)
            .ok_or_else(|| StorageError::NotFound(format!("wallet {}", wallet_id)))
    }

    /// Terminalize an active record
    async fn finish(
        &self,
        migration_id: &str,
        step: MigrationStep,
        status: MigrationStatus,
    ) -> Result<MigrationRecord, StorageError> {
        self.mutate(|state| {
            let record = Self::migration_mut(state, migration_id)?;
            if record.status.is_terminal() && record.status != status {
                return Err(StorageError::Conflict(format!(
                    "migration {} is already {}",
                    migration_id, record.status
                )));
            }
            record.current_step = step;
            record.status = status;
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
        .await
    }
}

#[async_trait]
impl MigrationStore for MemoryStore {
    async fn create_migration(&self, new: NewMigration) -> Result<MigrationRecord, StorageError> {
        self.mutate(|state| {
            if let Some(active) = state
                .migrations
                .values()
                .find(|m| m.original_wallet_id == new.original_wallet_id && m.is_active())
            {
                return Err(StorageError::Conflict(format!(
                    "wallet {} already has active migration {}",
                    new.original_wallet_id, active.id
                )));
            }

            let now = Utc::now();
            let record = MigrationRecord {
                id: new_record_id(&new.original_wallet_id),
                original_wallet_id: new.original_wallet_id,
                owner_address: new.owner_address,
                current_step: new.start_step,
                status: if new.start_step == MigrationStep::PreChecks {
                    MigrationStatus::Pending
                } else {
                    MigrationStatus::InProgress
                },
                new_wallet_id: new.new_wallet_id,
                snapshot: new.snapshot,
                created_at: now,
                updated_at: now,
            };

            state.migrations.insert(record.id.clone(), record.clone());
            Ok(record)
        })
        .await
    }

    async fn update_migration_step(
        &self,
        migration_id: &str,
        current_step: MigrationStep,
        status: MigrationStatus,
        new_wallet_id: Option<&str>,
    ) -> Result<MigrationRecord, StorageError> {
        self.mutate(|state| {
            let record = Self::migration_mut(state, migration_id)?;

            if record.status.is_terminal() {
                return Err(StorageError::Conflict(format!(
                    "migration {} is already {}",
                    migration_id, record.status
                )));
            }
            if !record.current_step.can_transition_to(current_step) {
                return Err(StorageError::Conflict(format!(
                    "cannot move migration {} from {} to {}",
                    migration_id, record.current_step, current_step
                )));
            }

            record.current_step = current_step;
            record.status = status;
            if let Some(id) = new_wallet_id {
                record.new_wallet_id = Some(id.to_string());
            }
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
        .await
    }

    async fn complete_migration(&self, migration_id: &str) -> Result<MigrationRecord, StorageError> {
        self.finish(migration_id, MigrationStep::Complete, MigrationStatus::Completed)
            .await
    }

    async fn cancel_migration(&self, migration_id: &str) -> Result<MigrationRecord, StorageError> {
        self.finish(migration_id, MigrationStep::Aborted, MigrationStatus::Aborted)
            .await
    }

    async fn get_pending_migrations(
        &self,
        owner_address: &str,
    ) -> Result<Vec<MigrationRecord>, StorageError> {
        let state = self.state.read().await;
        let mut pending: Vec<MigrationRecord> = state
            .migrations
            .values()
            .filter(|m| m.owner_address == owner_address && m.is_active())
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        Ok(pending)
    }

    async fn get_migration(&self, migration_id: &str) -> Result<Option<MigrationRecord>, StorageError> {
        Ok(self.state.read().await.migrations.get(migration_id).cloned())
    }
}

#[async_trait]
impl DraftWalletStore for MemoryStore {
    async fn create_new_wallet(
        &self,
        owner_address: &str,
        config: WalletConfig,
        migration_id: Option<&str>,
    ) -> Result<DraftWallet, StorageError> {
        self.mutate(|state| {
            if let Some(migration_id) = migration_id {
                if let Some(existing) = state
                    .drafts
                    .values()
                    .find(|d| d.migration_id.as_deref() == Some(migration_id))
                {
                    return Ok(existing.clone());
                }
            }

            let now = Utc::now();
            let draft = DraftWallet {
                id: new_record_id(&config.name),
                migration_id: migration_id.map(str::to_string),
                owner_address: owner_address.to_string(),
                config,
                created_at: now,
                updated_at: now,
            };

            state.drafts.insert(draft.id.clone(), draft.clone());
            Ok(draft)
        })
        .await
    }

    async fn update_new_wallet(
        &self,
        draft_id: &str,
        update: DraftUpdate,
    ) -> Result<DraftWallet, StorageError> {
        self.mutate(|state| {
            let draft = state
                .drafts
                .get_mut(draft_id)
                .ok_or_else(|| StorageError::NotFound(format!("draft {}", draft_id)))?;

            draft
                .config
                .apply(update)
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            draft.updated_at = Utc::now();
            Ok(draft.clone())
        })
        .await
    }

    async fn get_new_wallet(&self, draft_id: &str) -> Result<Option<DraftWallet>, StorageError> {
        Ok(self.state.read().await.drafts.get(draft_id).cloned())
    }

    async fn find_draft_for_migration(
        &self,
        migration_id: &str,
    ) -> Result<Option<DraftWallet>, StorageError> {
        Ok(self
            .state
            .read()
            .await
            .drafts
            .values()
            .find(|d| d.migration_id.as_deref() == Some(migration_id))
            .cloned())
    }

    async fn delete_new_wallet(&self, draft_id: &str) -> Result<(), StorageError> {
        self.mutate(|state| match state.drafts.remove(draft_id) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(format!("draft {}", draft_id))),
        })
        .await
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn create_wallet(
        &self,
        config: WalletConfig,
        derived: &DerivedScript,
        migration_id: Option<&str>,
    ) -> Result<Wallet, StorageError> {
        self.mutate(|state| {
            if let Some(migration_id) = migration_id {
                if let Some(existing) = state
                    .wallets
                    .values()
                    .find(|w| w.migration_id.as_deref() == Some(migration_id))
                {
                    return Ok(existing.clone());
                }
            }

            let wallet = Wallet {
                id: new_record_id(&derived.address),
                config,
                script: derived.script.clone(),
                address: derived.address.clone(),
                stake_address: derived.stake_address.clone(),
                drep_id: Some(derived.drep_id.clone()),
                migration_id: migration_id.map(str::to_string),
                migration_target_wallet_id: None,
                archived: false,
                created_at: Utc::now(),
            };

            state.wallets.insert(wallet.id.clone(), wallet.clone());
            Ok(wallet)
        })
        .await
    }

    async fn import_wallet(&self, wallet: Wallet) -> Result<Wallet, StorageError> {
        self.mutate(|state| {
            if state.wallets.contains_key(&wallet.id) {
                return Err(StorageError::Conflict(format!("wallet {} already exists", wallet.id)));
            }
            state.wallets.insert(wallet.id.clone(), wallet.clone());
            Ok(wallet)
        })
        .await
    }

    async fn get_wallet(
        &self,
        owner_address: &str,
        wallet_id: &str,
    ) -> Result<Option<Wallet>, StorageError> {
        Ok(self
            .state
            .read()
            .await
            .wallets
            .get(wallet_id)
            .filter(|w| w.is_visible_to(owner_address))
            .cloned())
    }

    async fn find_wallet_for_migration(
        &self,
        migration_id: &str,
    ) -> Result<Option<Wallet>, StorageError> {
        Ok(self
            .state
            .read()
            .await
            .wallets
            .values()
            .find(|w| w.migration_id.as_deref() == Some(migration_id))
            .cloned())
    }

    async fn set_migration_target(
        &self,
        original_wallet_id: &str,
        target_wallet_id: &str,
    ) -> Result<(), StorageError> {
        self.mutate(|state| {
            if !state.wallets.contains_key(target_wallet_id) {
                return Err(StorageError::NotFound(format!("wallet {}", target_wallet_id)));
            }
            Self::wallet_mut(state, original_wallet_id)?.migration_target_wallet_id =
                Some(target_wallet_id.to_string());
            Ok(())
        })
        .await
    }

    async fn clear_migration_target(&self, original_wallet_id: &str) -> Result<(), StorageError> {
        self.mutate(|state| {
            Self::wallet_mut(state, original_wallet_id)?.migration_target_wallet_id = None;
            Ok(())
        })
        .await
    }

    async fn detach_wallet(&self, wallet_id: &str) -> Result<(), StorageError> {
        self.mutate(|state| {
            Self::wallet_mut(state, wallet_id)?.migration_id = None;
            Ok(())
        })
        .await
    }

    async fn archive_wallet(&self, wallet_id: &str) -> Result<(), StorageError> {
        self.mutate(|state| {
            Self::wallet_mut(state, wallet_id)?.archived = true;
            Ok(())
        })
        .await
    }

    async fn delete_wallet(&self, wallet_id: &str) -> Result<(), StorageError> {
        self.mutate(|state| match state.wallets.remove(wallet_id) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(format!("wallet {}", wallet_id))),
        })
        .await
    }
}

#[async_trait]
impl ProxyStore for MemoryStore {
    async fn get_proxies_by_wallet(&self, wallet_id: &str) -> Result<Vec<Proxy>, StorageError> {
        let state = self.state.read().await;
        let mut proxies: Vec<Proxy> = state
            .proxies
            .values()
            .filter(|p| p.wallet_id == wallet_id)
            .cloned()
            .collect();
        proxies.sort_by_key(|p| p.created_at);
        Ok(proxies)
    }

    async fn create_proxy(
        &self,
        wallet_id: &str,
        proxy_address: &str,
        param_ref: &str,
        description: &str,
    ) -> Result<Proxy, StorageError> {
        self.mutate(|state| {
            if !state.wallets.contains_key(wallet_id) {
                return Err(StorageError::NotFound(format!("wallet {}", wallet_id)));
            }

            let proxy = Proxy {
                id: new_record_id(proxy_address),
                wallet_id: wallet_id.to_string(),
                proxy_address: proxy_address.to_string(),
                param_ref: param_ref.to_string(),
                description: description.to_string(),
                created_at: Utc::now(),
            };
            state.proxies.insert(proxy.id.clone(), proxy.clone());
            Ok(proxy)
        })
        .await
    }

    async fn transfer_proxies(
        &self,
        from_wallet_id: &str,
        to_wallet_id: &str,
    ) -> Result<usize, StorageError> {
        self.mutate(|state| {
            if !state.wallets.contains_key(to_wallet_id) {
                return Err(StorageError::NotFound(format!("wallet {}", to_wallet_id)));
            }

            let mut moved = 0;
            for proxy in state.proxies.values_mut().filter(|p| p.wallet_id == from_wallet_id) {
                proxy.wallet_id = to_wallet_id.to_string();
                moved += 1;
            }
            Ok(moved)
        })
        .await
    }
}
