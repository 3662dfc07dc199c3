//! Abort and rollback
//!
//! Compensating actions run one after another and each is isolated: a
//! failure is recorded in the [`AbortReport`] and the remaining actions still
//! run. What to undo is read from the store, the ledger and the transaction
//! service rather than from session state, so an abort after a restart sees
//! the same picture. A sweep that has not been broadcast is withdrawn. Value
//! already moved on-chain is never reversed; a new wallet that holds it, or
//! is about to, is kept, detached from the migration and reported.

use crate::core::Wallet;
use crate::migration::orchestrator::Services;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compensating actions, in execution order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbortActionKind {
    DeleteDraft,
    CancelSweep,
    RestoreProxies,
    DeleteNewWallet,
    DetachNewWallet,
    ClearMigrationTarget,
    CancelMigration,
}

impl fmt::Display for AbortActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AbortActionKind::DeleteDraft => "delete draft",
            AbortActionKind::CancelSweep => "cancel sweep",
            AbortActionKind::RestoreProxies => "restore proxies",
            AbortActionKind::DeleteNewWallet => "delete new wallet",
            AbortActionKind::DetachNewWallet => "detach new wallet",
            AbortActionKind::ClearMigrationTarget => "clear migration target",
            AbortActionKind::CancelMigration => "cancel migration record",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Done,
    /// Nothing to do, with the reason
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbortAction {
    pub kind: AbortActionKind,
    pub outcome: ActionOutcome,
}

/// What an abort did and what needs a retry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbortReport {
    pub actions: Vec<AbortAction>,
    /// Value already reached (or is on its way to) the new wallet
    pub funds_moved: bool,
}

impl AbortReport {
    fn record(&mut self, kind: AbortActionKind, outcome: ActionOutcome) {
        match &outcome {
            ActionOutcome::Done => log::info!("Abort: {} done", kind),
            ActionOutcome::Skipped(reason) => log::info!("Abort: {} skipped ({})", kind, reason),
            ActionOutcome::Failed(reason) => log::warn!("Abort: {} failed: {}", kind, reason),
        }
        self.actions.push(AbortAction { kind, outcome });
    }

    /// No action failed
    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn failures(&self) -> Vec<&AbortAction> {
        self.actions
            .iter()
            .filter(|a| matches!(a.outcome, ActionOutcome::Failed(_)))
            .collect()
    }

    /// Failed actions rendered for the user
    pub fn failed_actions(&self) -> Vec<String> {
        self.failures()
            .into_iter()
            .map(|a| match &a.outcome {
                ActionOutcome::Failed(reason) => format!("{} ({})", a.kind, reason),
                _ => a.kind.to_string(),
            })
            .collect()
    }

    pub fn outcome(&self, kind: AbortActionKind) -> Option<&ActionOutcome> {
        self.actions.iter().find(|a| a.kind == kind).map(|a| &a.outcome)
    }
}

/// Identifiers an abort works from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortPlan {
    pub original_wallet_id: String,
    pub owner_address: String,
    pub migration_id: Option<String>,
    pub draft_id: Option<String>,
    pub new_wallet_id: Option<String>,
}

fn outcome_of(result: Result<(), StorageError>) -> ActionOutcome {
    match result {
        Ok(()) => ActionOutcome::Done,
        Err(StorageError::NotFound(what)) => ActionOutcome::Skipped(format!("{} already gone", what)),
        Err(e) => ActionOutcome::Failed(e.to_string()),
    }
}

pub async fn execute(services: &Services, plan: &AbortPlan) -> AbortReport {
    let mut report = AbortReport::default();

    let draft = delete_draft(services, plan).await;
    report.record(AbortActionKind::DeleteDraft, draft);

    remove_new_wallet(services, plan, &mut report).await;

    let cleared = outcome_of(
        services
            .wallets
            .clear_migration_target(&plan.original_wallet_id)
            .await,
    );
    report.record(AbortActionKind::ClearMigrationTarget, cleared);

    let cancelled = match &plan.migration_id {
        Some(id) => outcome_of(services.migrations.cancel_migration(id).await.map(|_| ())),
        None => ActionOutcome::Skipped("no migration record".to_string()),
    };
    report.record(AbortActionKind::CancelMigration, cancelled);

    report
}

async fn delete_draft(services: &Services, plan: &AbortPlan) -> ActionOutcome {
    let draft_id = match (&plan.draft_id, &plan.migration_id) {
        (Some(id), _) => id.clone(),
        (None, Some(migration_id)) => match services.drafts.find_draft_for_migration(migration_id).await {
            Ok(Some(draft)) => draft.id,
            Ok(None) => return ActionOutcome::Skipped("no draft".to_string()),
            Err(e) => return ActionOutcome::Failed(e.to_string()),
        },
        (None, None) => return ActionOutcome::Skipped("no draft".to_string()),
    };
    outcome_of(services.drafts.delete_new_wallet(&draft_id).await)
}

async fn remove_new_wallet(services: &Services, plan: &AbortPlan, report: &mut AbortReport) {
    let skip_both = |report: &mut AbortReport, reason: &str| {
        report.record(AbortActionKind::RestoreProxies, ActionOutcome::Skipped(reason.to_string()));
        report.record(AbortActionKind::DeleteNewWallet, ActionOutcome::Skipped(reason.to_string()));
    };

    let wallet = match lookup_new_wallet(services, plan).await {
        Ok(Some(wallet)) => wallet,
        Ok(None) => {
            report.record(AbortActionKind::CancelSweep, ActionOutcome::Skipped("no new wallet".to_string()));
            return skip_both(report, "no new wallet");
        }
        Err(e) => {
            report.record(AbortActionKind::CancelSweep, ActionOutcome::Skipped("new wallet unknown".to_string()));
            report.record(AbortActionKind::RestoreProxies, ActionOutcome::Skipped("new wallet unknown".to_string()));
            report.record(AbortActionKind::DeleteNewWallet, ActionOutcome::Failed(e.to_string()));
            return;
        }
    };

    match cancel_sweep(services, plan, &wallet, report).await {
        SweepState::Clear => {}
        SweepState::InFlight => return keep_wallet(services, &wallet, report, "sweep into it was broadcast").await,
        SweepState::Unknown(reason) => {
            report.record(AbortActionKind::RestoreProxies, ActionOutcome::Skipped(reason.clone()));
            report.record(AbortActionKind::DeleteNewWallet, ActionOutcome::Failed(reason));
            return;
        }
    }

    match services.ledger.fetch_address_utxos(&wallet.address).await {
        Ok(utxos) if !utxos.is_empty() => {
            return keep_wallet(services, &wallet, report, "new wallet holds funds").await;
        }
        Ok(_) => {}
        Err(e) => {
            let reason = format!("could not confirm new wallet is empty: {}", e);
            report.record(AbortActionKind::RestoreProxies, ActionOutcome::Skipped(reason.clone()));
            report.record(AbortActionKind::DeleteNewWallet, ActionOutcome::Failed(reason));
            return;
        }
    }

    let restored = match services
        .proxies
        .transfer_proxies(&wallet.id, &plan.original_wallet_id)
        .await
    {
        Ok(0) => ActionOutcome::Skipped("no proxies".to_string()),
        Ok(_) => ActionOutcome::Done,
        Err(e) => ActionOutcome::Failed(e.to_string()),
    };
    let restore_failed = matches!(restored, ActionOutcome::Failed(_));
    report.record(AbortActionKind::RestoreProxies, restored);

    // Deleting now would orphan the proxies still bound to it
    let deleted = if restore_failed {
        ActionOutcome::Failed("proxies still bound to new wallet".to_string())
    } else {
        outcome_of(services.wallets.delete_wallet(&wallet.id).await)
    };
    report.record(AbortActionKind::DeleteNewWallet, deleted);
}

/// What the transaction service says about a sweep into the new wallet
enum SweepState {
    /// Nothing will pay into it
    Clear,
    /// Broadcast; value is on its way
    InFlight,
    Unknown(String),
}

async fn cancel_sweep(
    services: &Services,
    plan: &AbortPlan,
    wallet: &Wallet,
    report: &mut AbortReport,
) -> SweepState {
    let sweep = match services
        .transactions
        .find_sweep(&plan.original_wallet_id, &wallet.address)
        .await
    {
        Ok(sweep) => sweep,
        Err(e) => {
            let reason = format!("could not look up sweep: {}", e);
            report.record(AbortActionKind::CancelSweep, ActionOutcome::Failed(reason.clone()));
            return SweepState::Unknown(reason);
        }
    };

    match sweep {
        None => {
            report.record(AbortActionKind::CancelSweep, ActionOutcome::Skipped("no sweep".to_string()));
            SweepState::Clear
        }
        Some(tx) if tx.status.is_pending() => match services.transactions.cancel_sweep(&tx.id).await {
            Ok(_) => {
                report.record(AbortActionKind::CancelSweep, ActionOutcome::Done);
                SweepState::Clear
            }
            Err(e) => {
                let reason = format!("sweep {} still pending: {}", tx.id, e);
                report.record(AbortActionKind::CancelSweep, ActionOutcome::Failed(e.to_string()));
                SweepState::Unknown(reason)
            }
        },
        Some(tx) => {
            report.record(
                AbortActionKind::CancelSweep,
                ActionOutcome::Skipped(format!("sweep {} already broadcast", tx.id)),
            );
            SweepState::InFlight
        }
    }
}

/// Leave a funded wallet in place but cut it loose from the migration
async fn keep_wallet(services: &Services, wallet: &Wallet, report: &mut AbortReport, reason: &str) {
    report.funds_moved = true;
    let reason = format!("{}; kept", reason);
    report.record(AbortActionKind::RestoreProxies, ActionOutcome::Skipped(reason.clone()));
    report.record(AbortActionKind::DeleteNewWallet, ActionOutcome::Skipped(reason));
    let detached = outcome_of(services.wallets.detach_wallet(&wallet.id).await);
    report.record(AbortActionKind::DetachNewWallet, detached);
}

async fn lookup_new_wallet(
    services: &Services,
    plan: &AbortPlan,
) -> Result<Option<Wallet>, StorageError> {
    if let Some(migration_id) = &plan.migration_id {
        if let Some(wallet) = services.wallets.find_wallet_for_migration(migration_id).await? {
            return Ok(Some(wallet));
        }
    }
    match &plan.new_wallet_id {
        Some(id) => services.wallets.get_wallet(&plan.owner_address, id).await,
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_completion() {
        let mut report = AbortReport::default();
        report.record(AbortActionKind::DeleteDraft, ActionOutcome::Done);
        report.record(AbortActionKind::DeleteNewWallet, ActionOutcome::Skipped("no new wallet".to_string()));
        assert!(report.is_complete());

        report.record(AbortActionKind::ClearMigrationTarget, ActionOutcome::Failed("io".to_string()));
        assert!(!report.is_complete());
        assert_eq!(report.failed_actions(), vec!["clear migration target (io)".to_string()]);
        assert_eq!(report.outcome(AbortActionKind::DeleteDraft), Some(&ActionOutcome::Done));
    }

    #[test]
    fn test_missing_records_are_skipped() {
        assert!(matches!(
            outcome_of(Err(StorageError::NotFound("draft d1".to_string()))),
            ActionOutcome::Skipped(_)
        ));
        assert!(matches!(
            outcome_of(Err(StorageError::Conflict("x".to_string()))),
            ActionOutcome::Failed(_)
        ));
    }
}
