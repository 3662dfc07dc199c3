//! Completion gate
//!
//! The original wallet is archived only once it holds no UTxOs and has no
//! transactions waiting for signatures.

use crate::core::{format_ada, total_lovelace, MigrationRecord, Wallet};
use crate::migration::error::MigrationError;
use crate::migration::orchestrator::Services;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observed state of the original wallet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionStatus {
    pub utxo_count: usize,
    pub pending_count: usize,
    pub residual_lovelace: u64,
    pub checked_at: DateTime<Utc>,
}

impl CompletionStatus {
    pub fn can_complete(&self) -> bool {
        self.utxo_count == 0 && self.pending_count == 0
    }

    pub fn residual_ada(&self) -> String {
        format_ada(self.residual_lovelace)
    }
}

pub async fn refresh(services: &Services, original: &Wallet) -> Result<CompletionStatus, MigrationError> {
    let utxos = services.ledger.fetch_address_utxos(&original.address).await?;
    let pending_count = services.transactions.pending_count(&original.id).await?;

    Ok(CompletionStatus {
        utxo_count: utxos.len(),
        pending_count,
        residual_lovelace: total_lovelace(&utxos),
        checked_at: Utc::now(),
    })
}

/// Poll until the gate opens, reporting every refresh
pub async fn watch<F>(services: &Services, original: &Wallet, poll_interval: Duration, mut on_update: F) -> CompletionStatus
where
    F: FnMut(&CompletionStatus),
{
    let mut interval = tokio::time::interval(poll_interval);

    loop {
        interval.tick().await;
        match refresh(services, original).await {
            Ok(status) => {
                on_update(&status);
                if status.can_complete() {
                    return status;
                }
                log::debug!(
                    "Completion blocked: {} UTxOs ({} ADA), {} pending",
                    status.utxo_count,
                    status.residual_ada(),
                    status.pending_count
                );
            }
            Err(e) => log::warn!("Completion refresh failed, retrying: {}", e),
        }
    }
}

/// Recheck the gate, archive the original and close the record
pub async fn archive(
    services: &Services,
    original: &Wallet,
    migration_id: &str,
) -> Result<MigrationRecord, MigrationError> {
    let status = refresh(services, original).await?;
    if !status.can_complete() {
        log::warn!(
            "Refusing to archive {}: {} UTxOs, {} pending",
            original.id,
            status.utxo_count,
            status.pending_count
        );
        return Err(MigrationError::CompletionBlocked {
            utxos: status.utxo_count,
            pending: status.pending_count,
        });
    }

    services.wallets.archive_wallet(&original.id).await?;
    services.wallets.clear_migration_target(&original.id).await?;
    let record = services.migrations.complete_migration(migration_id).await?;
    log::info!("Migration {} completed; wallet {} archived", migration_id, original.id);
    Ok(record)
}
