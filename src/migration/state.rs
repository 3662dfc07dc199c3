//! Serializable orchestrator state
//!
//! [`MigrationState`] is derived from the persisted [`MigrationRecord`]; the
//! record stays authoritative and the state only caches what the UI renders.

use crate::core::{MigrationRecord, MigrationStatus, MigrationStep};
use serde::{Deserialize, Serialize};

/// One-shot guards against re-issuing a call while one is in flight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MigrationFlags {
    pub draft_attempted: bool,
    pub wallet_attempted: bool,
    pub sweep_attempted: bool,
    /// A sweep into the new wallet is on record
    pub transfer_initiated: bool,
    pub has_aborted: bool,
}

/// Orchestrator state for one original wallet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationState {
    pub original_wallet_id: String,
    pub owner_address: String,
    pub migration_id: Option<String>,
    pub step: MigrationStep,
    pub status: MigrationStatus,
    pub new_wallet_id: Option<String>,
    pub draft_id: Option<String>,
    pub sweep_tx_id: Option<String>,
    /// Target pointer found on the original wallet without a migration record
    pub legacy_target_wallet_id: Option<String>,
    pub flags: MigrationFlags,
}

impl MigrationState {
    /// State for a wallet with no migration yet
    pub fn fresh(original_wallet_id: &str, owner_address: &str) -> Self {
        Self {
            original_wallet_id: original_wallet_id.to_string(),
            owner_address: owner_address.to_string(),
            migration_id: None,
            step: MigrationStep::PreChecks,
            status: MigrationStatus::Pending,
            new_wallet_id: None,
            draft_id: None,
            sweep_tx_id: None,
            legacy_target_wallet_id: None,
            flags: MigrationFlags::default(),
        }
    }

    /// State restored from a persisted record
    pub fn from_record(record: &MigrationRecord, owner_address: &str) -> Self {
        let mut state = Self::fresh(&record.original_wallet_id, owner_address);
        state.apply_record(record);
        state
    }

    /// Overwrite the persisted fields with the record's
    pub fn apply_record(&mut self, record: &MigrationRecord) {
        self.migration_id = Some(record.id.clone());
        self.step = record.current_step;
        self.status = record.status;
        if record.new_wallet_id.is_some() {
            self.new_wallet_id = record.new_wallet_id.clone();
        }
    }

    pub fn is_started(&self) -> bool {
        self.migration_id.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A "Continue Migration" action should be offered
    pub fn can_continue_legacy(&self) -> bool {
        !self.is_started() && self.legacy_target_wallet_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MigrationSnapshot;
    use chrono::Utc;

    fn record(step: MigrationStep, new_wallet_id: Option<&str>) -> MigrationRecord {
        MigrationRecord {
            id: "m1".to_string(),
            original_wallet_id: "w1".to_string(),
            owner_address: "alice".to_string(),
            current_step: step,
            status: MigrationStatus::InProgress,
            new_wallet_id: new_wallet_id.map(str::to_string),
            snapshot: MigrationSnapshot::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_restore_from_record() {
        let state = MigrationState::from_record(&record(MigrationStep::FundTransfer, Some("w2")), "alice");
        assert_eq!(state.step, MigrationStep::FundTransfer);
        assert_eq!(state.new_wallet_id.as_deref(), Some("w2"));
        assert!(!state.flags.transfer_initiated);

        // Passing the sweep step says nothing about whether a sweep was sent
        let later = MigrationState::from_record(&record(MigrationStep::ProxyTransfer, Some("w2")), "alice");
        assert_eq!(later.step, MigrationStep::ProxyTransfer);
        assert!(!later.flags.transfer_initiated);
    }

    #[test]
    fn test_state_serializes() {
        let state = MigrationState::fresh("w1", "alice");
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"step\":\"pre_checks\""));
        let back: MigrationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_legacy_continue_offered_only_without_record() {
        let mut state = MigrationState::fresh("w1", "alice");
        assert!(!state.can_continue_legacy());
        state.legacy_target_wallet_id = Some("w2".to_string());
        assert!(state.can_continue_legacy());
        state.migration_id = Some("m1".to_string());
        assert!(!state.can_continue_legacy());
    }
}
