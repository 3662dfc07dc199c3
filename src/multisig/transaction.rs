//! Sweep transactions and the transaction submission seam
//!
//! A sweep spends every output at a wallet's address and sends the whole
//! value to one change address. Assembly, co-signing and broadcast belong to
//! an external [`TransactionService`]; [`PendingTxBook`] is an in-memory
//! implementation that tracks signature collection.
//!
//! A sweep's id is derived from what it spends and where it pays, so handing
//! the same sweep over twice yields the same transaction.

use crate::core::{Asset, Utxo, Wallet};
use crate::crypto::content_id;
use crate::multisig::wallet::MultisigError;
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Status of a pending multisig transaction
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    /// Waiting for more signatures
    AwaitingSignatures,
    /// Has enough signatures, ready to broadcast
    Ready,
    /// Transaction has been broadcast to the network
    Broadcast,
    /// Transaction expired or was cancelled
    Expired,
}

impl PendingStatus {
    /// Still counts against a wallet as in flight
    pub fn is_pending(&self) -> bool {
        matches!(self, PendingStatus::AwaitingSignatures | PendingStatus::Ready)
    }
}

/// An explicit payment output
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxOutput {
    pub address: String,
    pub amount: Vec<Asset>,
}

/// A transaction moving every input to a single change address
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SweepTransaction {
    pub id: String,
    /// Wallet whose outputs are spent
    pub wallet_id: String,
    pub from_address: String,
    /// Sole destination; receives all value as change
    pub change_address: String,
    pub inputs: Vec<Utxo>,
    /// Explicit payment outputs; a sweep has none
    pub outputs: Vec<TxOutput>,
    /// Addresses allowed to sign
    pub signers: Vec<String>,
    pub threshold: u32,
    pub signed_by: Vec<String>,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SweepTransaction {
    /// Build a sweep of `utxos` held by `wallet` into `change_address`
    pub fn new(wallet: &Wallet, utxos: Vec<Utxo>, change_address: &str) -> Result<Self, MultisigError> {
        if utxos.is_empty() {
            return Err(MultisigError::NoInputs);
        }
        if let Some(foreign) = utxos.iter().find(|u| u.address != wallet.address) {
            return Err(MultisigError::ForeignInput(foreign.outpoint()));
        }

        let now = Utc::now();
        let mut outpoints: Vec<String> = utxos.iter().map(Utxo::outpoint).collect();
        outpoints.sort();
        let seed = format!("sweep:{}:{}:{}", wallet.address, change_address, outpoints.join(","));

        Ok(Self {
            id: content_id(&seed),
            wallet_id: wallet.id.clone(),
            from_address: wallet.address.clone(),
            change_address: change_address.to_string(),
            inputs: utxos,
            outputs: Vec::new(),
            signers: wallet
                .config
                .signer_addresses()
                .into_iter()
                .map(str::to_string)
                .collect(),
            threshold: wallet.config.effective_threshold(),
            signed_by: Vec::new(),
            status: PendingStatus::AwaitingSignatures,
            created_at: now,
            updated_at: now,
        })
    }

    /// Value returned as change, summed per asset unit
    pub fn change_value(&self) -> Vec<Asset> {
        let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
        for asset in self.inputs.iter().flat_map(|u| u.amount.iter()) {
            *totals.entry(asset.unit.as_str()).or_default() += asset.quantity;
        }
        totals
            .into_iter()
            .map(|(unit, quantity)| Asset {
                unit: unit.to_string(),
                quantity,
            })
            .collect()
    }

    /// Record a signature from an authorized signer
    pub fn add_signature(&mut self, signer: &str) -> Result<(), MultisigError> {
        if !self.signers.iter().any(|s| s == signer) {
            return Err(MultisigError::UnauthorizedSigner(signer.to_string()));
        }
        if self.signed_by.iter().any(|s| s == signer) {
            return Err(MultisigError::AlreadySigned);
        }

        self.signed_by.push(signer.to_string());
        self.updated_at = Utc::now();

        if self.signed_by.len() >= self.threshold as usize {
            self.status = PendingStatus::Ready;
        }
        Ok(())
    }

    /// Check if transaction has enough signatures
    pub fn is_ready(&self) -> bool {
        self.status == PendingStatus::Ready
    }

    /// Mark as broadcast
    pub fn mark_broadcast(&mut self) {
        self.status = PendingStatus::Broadcast;
        self.updated_at = Utc::now();
    }

    /// Mark as expired; a broadcast transaction can no longer be withdrawn
    pub fn mark_expired(&mut self) -> Result<(), MultisigError> {
        if self.status == PendingStatus::Broadcast {
            return Err(MultisigError::AlreadyBroadcast(self.id.clone()));
        }
        self.status = PendingStatus::Expired;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// External transaction builder, co-signer and submitter
#[async_trait]
pub trait TransactionService: Send + Sync {
    /// Hand a sweep to the signers; returns its transaction id
    ///
    /// Submitting a sweep that is already in flight returns the existing id.
    async fn submit_sweep(&self, tx: SweepTransaction) -> Result<String, MultisigError>;

    /// Latest sweep out of `wallet_id` into `change_address` that was not withdrawn
    async fn find_sweep(
        &self,
        wallet_id: &str,
        change_address: &str,
    ) -> Result<Option<SweepTransaction>, MultisigError>;

    /// Withdraw a sweep before it is broadcast
    async fn cancel_sweep(&self, tx_id: &str) -> Result<SweepTransaction, MultisigError>;

    /// Number of transactions of a wallet still awaiting signatures or broadcast
    async fn pending_count(&self, wallet_id: &str) -> Result<usize, MultisigError>;
}

/// In-memory book of pending transactions, optionally persisted through [`Storage`]
#[derive(Debug, Default)]
pub struct PendingTxBook {
    pending: RwLock<HashMap<String, SweepTransaction>>,
    storage: Option<Storage>,
}

type Book = HashMap<String, SweepTransaction>;

impl PendingTxBook {
    /// Create a new empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a book backed by `storage`, loading it if a saved book exists
    pub fn open(storage: Storage) -> Result<Self, MultisigError> {
        let pending = if storage.exists() {
            storage.load().map_err(|e| MultisigError::Book(e.to_string()))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            pending: RwLock::new(pending),
            storage: Some(storage),
        })
    }

    /// Apply `f` to a copy of the book and keep it only once it is on disk
    async fn mutate<T>(&self, f: impl FnOnce(&mut Book) -> Result<T, MultisigError>) -> Result<T, MultisigError> {
        let mut pending = self.pending.write().await;
        let mut next = pending.clone();
        let value = f(&mut next)?;
        if let Some(storage) = &self.storage {
            storage.save(&next).map_err(|e| MultisigError::Book(e.to_string()))?;
        }
        *pending = next;
        Ok(value)
    }

    /// Get a transaction by ID
    pub async fn get(&self, tx_id: &str) -> Option<SweepTransaction> {
        self.pending.read().await.get(tx_id).cloned()
    }

    /// List transactions spending from a wallet
    pub async fn for_wallet(&self, wallet_id: &str) -> Vec<SweepTransaction> {
        self.pending
            .read()
            .await
            .values()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect()
    }

    /// Add a signature to a pending transaction
    pub async fn sign(&self, tx_id: &str, signer: &str) -> Result<SweepTransaction, MultisigError> {
        self.mutate(|pending| {
            let tx = lookup(pending, tx_id)?;
            tx.add_signature(signer)?;
            Ok(tx.clone())
        })
        .await
    }

    /// Mark a ready transaction as broadcast
    pub async fn broadcast(&self, tx_id: &str) -> Result<SweepTransaction, MultisigError> {
        self.mutate(|pending| {
            let tx = lookup(pending, tx_id)?;
            if !tx.is_ready() {
                return Err(MultisigError::Submission(format!(
                    "{} has {} of {} signatures",
                    tx_id,
                    tx.signed_by.len(),
                    tx.threshold
                )));
            }
            tx.mark_broadcast();
            Ok(tx.clone())
        })
        .await
    }

    /// Expire a transaction so it no longer counts as pending
    pub async fn expire(&self, tx_id: &str) -> Result<SweepTransaction, MultisigError> {
        self.mutate(|pending| {
            let tx = lookup(pending, tx_id)?;
            tx.mark_expired()?;
            log::info!("Transaction {} expired", tx_id);
            Ok(tx.clone())
        })
        .await
    }
}

fn lookup<'a>(pending: &'a mut Book, tx_id: &str) -> Result<&'a mut SweepTransaction, MultisigError> {
    pending
        .get_mut(tx_id)
        .ok_or_else(|| MultisigError::TransactionNotFound(tx_id.to_string()))
}

#[async_trait]
impl TransactionService for PendingTxBook {
    async fn submit_sweep(&self, tx: SweepTransaction) -> Result<String, MultisigError> {
        self.mutate(|pending| {
            if let Some(existing) = pending.get(&tx.id) {
                if existing.status != PendingStatus::Expired {
                    log::info!("Sweep {} already submitted", existing.id);
                    return Ok(existing.id.clone());
                }
            }
            let id = tx.id.clone();
            log::info!(
                "Sweep {} submitted: {} inputs from {} to {}",
                id,
                tx.inputs.len(),
                tx.from_address,
                tx.change_address
            );
            pending.insert(id.clone(), tx);
            Ok(id)
        })
        .await
    }

    async fn find_sweep(
        &self,
        wallet_id: &str,
        change_address: &str,
    ) -> Result<Option<SweepTransaction>, MultisigError> {
        Ok(self
            .pending
            .read()
            .await
            .values()
            .filter(|tx| {
                tx.wallet_id == wallet_id
                    && tx.change_address == change_address
                    && tx.status != PendingStatus::Expired
            })
            .max_by_key(|tx| tx.created_at)
            .cloned())
    }

    async fn cancel_sweep(&self, tx_id: &str) -> Result<SweepTransaction, MultisigError> {
        self.expire(tx_id).await
    }

    async fn pending_count(&self, wallet_id: &str) -> Result<usize, MultisigError> {
        Ok(self
            .pending
            .read()
            .await
            .values()
            .filter(|tx| tx.wallet_id == wallet_id && tx.status.is_pending())
            .count())
    }
}
