//! Migration errors

use crate::core::{MigrationStatus, MigrationStep};
use crate::ledger::LedgerError;
use crate::multisig::MultisigError;
use crate::storage::StorageError;
use thiserror::Error;

/// Requests the state machine refuses without touching any store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("{0}")]
    Invalid(MultisigError),
    #[error("Migration is at step {actual}, expected {expected}")]
    WrongStep {
        expected: MigrationStep,
        actual: MigrationStep,
    },
    #[error("No migration has been started")]
    NotStarted,
    #[error("Migration {0} is already in progress")]
    AlreadyStarted(String),
    #[error("Original wallet has no migration target to continue from")]
    NoLegacyTarget,
    #[error("Create a temporary wallet first")]
    NoDraft,
    #[error("New wallet has not been created yet")]
    NoNewWallet,
    #[error("Migration is already {0}")]
    Terminal(MigrationStatus),
}

/// Migration errors
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("{0}")]
    Rejected(#[from] Rejection),
    #[error("Multisig error: {0}")]
    Multisig(#[from] MultisigError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),
    #[error("Draft wallet not found: {0}")]
    DraftNotFound(String),
    #[error("Pre-checks are not ready: {0}")]
    PreChecksNotReady(String),
    #[error("Nothing to sweep at {0}")]
    NothingToSweep(String),
    #[error("Completion blocked: {utxos} UTxOs and {pending} pending transactions remain")]
    CompletionBlocked { utxos: usize, pending: usize },
}

impl MigrationError {
    /// Caught locally before any store or ledger call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MigrationError::Rejected(Rejection::Invalid(_))
        )
    }
}
