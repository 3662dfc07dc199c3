//! Migration record: the durable identity of one migration attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Steps of a migration, in order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    PreChecks,
    CreateWallet,
    ProxySetup,
    FundTransfer,
    ProxyTransfer,
    Complete,
    /// Out-of-band terminal state
    Aborted,
}

impl MigrationStep {
    /// The step that normally follows this one
    pub fn next(&self) -> Option<MigrationStep> {
        match self {
            MigrationStep::PreChecks => Some(MigrationStep::CreateWallet),
            MigrationStep::CreateWallet => Some(MigrationStep::ProxySetup),
            MigrationStep::ProxySetup => Some(MigrationStep::FundTransfer),
            MigrationStep::FundTransfer => Some(MigrationStep::ProxyTransfer),
            MigrationStep::ProxyTransfer => Some(MigrationStep::Complete),
            MigrationStep::Complete | MigrationStep::Aborted => None,
        }
    }

    /// Whether moving from `self` to `next` is allowed
    ///
    /// Staying put is allowed so a persisted step can be re-applied after a
    /// retry. The only skip is `CreateWallet → FundTransfer`.
    pub fn can_transition_to(&self, next: MigrationStep) -> bool {
        if *self == next {
            return true;
        }
        match (*self, next) {
            (MigrationStep::Aborted, _) => false,
            (_, MigrationStep::Aborted) => true,
            (MigrationStep::CreateWallet, MigrationStep::FundTransfer) => true,
            (from, to) => from.next() == Some(to),
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStep::PreChecks => "pre_checks",
            MigrationStep::CreateWallet => "create_wallet",
            MigrationStep::ProxySetup => "proxy_setup",
            MigrationStep::FundTransfer => "fund_transfer",
            MigrationStep::ProxyTransfer => "proxy_transfer",
            MigrationStep::Complete => "complete",
            MigrationStep::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Lifecycle status of a migration record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    InProgress,
    Completed,
    Aborted,
}

impl MigrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationStatus::Completed | MigrationStatus::Aborted)
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Name and description of the original wallet captured at start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MigrationSnapshot {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A persisted migration attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationRecord {
    pub id: String,
    pub original_wallet_id: String,
    pub owner_address: String,
    pub current_step: MigrationStep,
    pub status: MigrationStatus,
    pub new_wallet_id: Option<String>,
    pub snapshot: MigrationSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}
