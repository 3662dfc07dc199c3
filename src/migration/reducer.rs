//! Migration state machine
//!
//! [`reduce`] is pure: it maps a state and an [`Event`] to the next state and
//! the [`Effect`]s to run. The orchestrator executes effects and feeds their
//! results back as events. Steps only advance on [`Event::StepPersisted`],
//! i.e. after the store has accepted the move.

use crate::core::{MigrationRecord, MigrationSnapshot, MigrationStatus, MigrationStep};
use crate::migration::abort::AbortReport;
use crate::migration::error::Rejection;
use crate::migration::state::MigrationState;
use crate::multisig::WalletConfig;
use serde::{Deserialize, Serialize};

/// Severity of a user-visible notice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-visible notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Inputs to the state machine: user intents and effect results
#[derive(Debug, Clone)]
pub enum Event {
    StartRequested { snapshot: MigrationSnapshot },
    ContinueLegacyRequested { snapshot: MigrationSnapshot },
    MigrationCreated(MigrationRecord),
    PreChecksPassed,
    CreateDraftRequested { config: WalletConfig },
    DraftReady { draft_id: String, created: bool },
    FinalizeRequested,
    WalletFinalized {
        wallet_id: String,
        reused: bool,
        skip_proxy_setup: bool,
    },
    ProxySetupFinished,
    SweepRequested,
    SweepSubmitted { tx_id: Option<String> },
    ProxyTransferRequested,
    ProxiesTransferred { count: usize },
    StepPersisted(MigrationRecord),
    CompleteRequested,
    Completed(MigrationRecord),
    AbortRequested,
    AbortFinished(AbortReport),
    EffectFailed { effect: EffectKind },
}

/// Work the orchestrator performs on behalf of the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateMigration {
        snapshot: MigrationSnapshot,
        start_step: MigrationStep,
        new_wallet_id: Option<String>,
    },
    PersistStep {
        migration_id: String,
        step: MigrationStep,
        new_wallet_id: Option<String>,
    },
    CreateDraft {
        migration_id: String,
        config: WalletConfig,
    },
    FinalizeWallet {
        migration_id: String,
        draft_id: Option<String>,
    },
    SubmitSweep {
        new_wallet_id: String,
    },
    TransferProxies {
        new_wallet_id: String,
    },
    CompleteMigration {
        migration_id: String,
    },
    Abort {
        migration_id: Option<String>,
        draft_id: Option<String>,
        new_wallet_id: Option<String>,
    },
    Notify(Notice),
    Reject(Rejection),
}

/// Effect discriminant used to route failures back into the reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    CreateMigration,
    PersistStep,
    CreateDraft,
    FinalizeWallet,
    SubmitSweep,
    TransferProxies,
    CompleteMigration,
    Abort,
    Notify,
    Reject,
}

impl Effect {
    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::CreateMigration { .. } => EffectKind::CreateMigration,
            Effect::PersistStep { .. } => EffectKind::PersistStep,
            Effect::CreateDraft { .. } => EffectKind::CreateDraft,
            Effect::FinalizeWallet { .. } => EffectKind::FinalizeWallet,
            Effect::SubmitSweep { .. } => EffectKind::SubmitSweep,
            Effect::TransferProxies { .. } => EffectKind::TransferProxies,
            Effect::CompleteMigration { .. } => EffectKind::CompleteMigration,
            Effect::Abort { .. } => EffectKind::Abort,
            Effect::Notify(_) => EffectKind::Notify,
            Effect::Reject(_) => EffectKind::Reject,
        }
    }
}

/// Check the migration is live and at `expected`
fn at_step(state: &MigrationState, expected: MigrationStep) -> Result<String, Rejection> {
    let migration_id = state.migration_id.clone().ok_or(Rejection::NotStarted)?;
    if state.is_terminal() {
        return Err(Rejection::Terminal(state.status));
    }
    if state.step != expected {
        return Err(Rejection::WrongStep {
            expected,
            actual: state.step,
        });
    }
    Ok(migration_id)
}

fn persist(migration_id: String, step: MigrationStep, new_wallet_id: Option<String>) -> Vec<Effect> {
    vec![Effect::PersistStep {
        migration_id,
        step,
        new_wallet_id,
    }]
}

/// Apply one event
pub fn reduce(state: MigrationState, event: Event) -> (MigrationState, Vec<Effect>) {
    let mut next = state;

    let effects = match event {
        Event::StartRequested { snapshot } => match &next.migration_id {
            Some(id) => vec![Effect::Reject(Rejection::AlreadyStarted(id.clone()))],
            None => {
                // An existing target pointer means an earlier attempt got as far
                // as creating the wallet
                let start_step = if next.legacy_target_wallet_id.is_some() {
                    MigrationStep::CreateWallet
                } else {
                    MigrationStep::PreChecks
                };
                vec![Effect::CreateMigration {
                    snapshot,
                    start_step,
                    new_wallet_id: next.legacy_target_wallet_id.clone(),
                }]
            }
        },

        Event::ContinueLegacyRequested { snapshot } => {
            if let Some(id) = &next.migration_id {
                vec![Effect::Reject(Rejection::AlreadyStarted(id.clone()))]
            } else if let Some(target) = next.legacy_target_wallet_id.clone() {
                vec![Effect::CreateMigration {
                    snapshot,
                    start_step: MigrationStep::CreateWallet,
                    new_wallet_id: Some(target),
                }]
            } else {
                vec![Effect::Reject(Rejection::NoLegacyTarget)]
            }
        }

        Event::MigrationCreated(record) => {
            next.apply_record(&record);
            next.legacy_target_wallet_id = None;
            next.flags = Default::default();
            vec![Effect::Notify(Notice::info(format!(
                "Migration started at step {}",
                record.current_step
            )))]
        }

        Event::PreChecksPassed => match at_step(&next, MigrationStep::PreChecks) {
            Ok(id) => persist(id, MigrationStep::CreateWallet, None),
            Err(rejection) => vec![Effect::Reject(rejection)],
        },

        Event::StepPersisted(record) => {
            next.apply_record(&record);
            Vec::new()
        }

        Event::CreateDraftRequested { config } => match at_step(&next, MigrationStep::CreateWallet) {
            Err(rejection) => vec![Effect::Reject(rejection)],
            // Already created or in flight: nothing to do
            Ok(_) if next.new_wallet_id.is_some() || next.draft_id.is_some() => Vec::new(),
            Ok(_) if next.flags.draft_attempted => Vec::new(),
            Ok(migration_id) => match config.validate_for_draft() {
                Err(e) => vec![Effect::Reject(Rejection::Invalid(e))],
                Ok(()) => {
                    next.flags.draft_attempted = true;
                    vec![Effect::CreateDraft {
                        migration_id,
                        config,
                    }]
                }
            },
        },

        Event::DraftReady { draft_id, created } => {
            next.draft_id = Some(draft_id);
            let message = if created {
                "Temporary wallet created; share the invite link with co-signers"
            } else {
                "Temporary wallet already exists for this migration"
            };
            vec![Effect::Notify(Notice::info(message))]
        }

        Event::FinalizeRequested => match at_step(&next, MigrationStep::CreateWallet) {
            Err(rejection) => vec![Effect::Reject(rejection)],
            Ok(_) if next.flags.wallet_attempted => Vec::new(),
            Ok(_) if next.draft_id.is_none() && next.new_wallet_id.is_none() => {
                vec![Effect::Reject(Rejection::NoDraft)]
            }
            Ok(migration_id) => {
                next.flags.wallet_attempted = true;
                vec![Effect::FinalizeWallet {
                    migration_id,
                    draft_id: next.draft_id.clone(),
                }]
            }
        },

        Event::WalletFinalized {
            wallet_id,
            reused,
            skip_proxy_setup,
        } => {
            next.new_wallet_id = Some(wallet_id.clone());
            next.draft_id = None;
            let step = if skip_proxy_setup {
                MigrationStep::FundTransfer
            } else {
                MigrationStep::ProxySetup
            };
            let mut effects = Vec::new();
            if reused {
                effects.push(Effect::Notify(Notice::info("Reusing the wallet already created for this migration")));
            }
            match next.migration_id.clone() {
                Some(id) => effects.extend(persist(id, step, Some(wallet_id))),
                None => effects.push(Effect::Reject(Rejection::NotStarted)),
            }
            effects
        }

        Event::ProxySetupFinished => match at_step(&next, MigrationStep::ProxySetup) {
            Ok(id) => persist(id, MigrationStep::FundTransfer, None),
            Err(rejection) => vec![Effect::Reject(rejection)],
        },

        Event::SweepRequested => match at_step(&next, MigrationStep::FundTransfer) {
            Err(rejection) => vec![Effect::Reject(rejection)],
            Ok(_) if next.flags.sweep_attempted => Vec::new(),
            Ok(_) => match next.new_wallet_id.clone() {
                None => vec![Effect::Reject(Rejection::NoNewWallet)],
                Some(new_wallet_id) => {
                    next.flags.sweep_attempted = true;
                    vec![Effect::SubmitSweep { new_wallet_id }]
                }
            },
        },

        Event::SweepSubmitted { tx_id } => {
            if tx_id.is_some() {
                next.flags.transfer_initiated = true;
            }
            let mut effects = vec![Effect::Notify(match &tx_id {
                Some(id) => Notice::info(format!("Sweep transaction {} sent to co-signers", id)),
                None => Notice::warning("Original wallet holds no UTxOs; nothing to sweep"),
            })];
            next.sweep_tx_id = tx_id;
            if let Some(id) = next.migration_id.clone() {
                effects.extend(persist(id, MigrationStep::ProxyTransfer, None));
            }
            effects
        }

        Event::ProxyTransferRequested => match at_step(&next, MigrationStep::ProxyTransfer) {
            Err(rejection) => vec![Effect::Reject(rejection)],
            Ok(_) => match next.new_wallet_id.clone() {
                None => vec![Effect::Reject(Rejection::NoNewWallet)],
                Some(new_wallet_id) => vec![Effect::TransferProxies { new_wallet_id }],
            },
        },

        Event::ProxiesTransferred { count } => {
            let mut effects = Vec::new();
            if count > 0 {
                effects.push(Effect::Notify(Notice::info(format!("{} proxies moved to the new wallet", count))));
            }
            if let Some(id) = next.migration_id.clone() {
                effects.extend(persist(id, MigrationStep::Complete, None));
            }
            effects
        }

        Event::CompleteRequested => match at_step(&next, MigrationStep::Complete) {
            Ok(migration_id) => vec![Effect::CompleteMigration { migration_id }],
            Err(rejection) => vec![Effect::Reject(rejection)],
        },

        Event::Completed(record) => {
            next.apply_record(&record);
            vec![Effect::Notify(Notice::info("Migration complete; original wallet archived"))]
        }

        Event::AbortRequested => {
            if next.is_terminal() {
                vec![Effect::Reject(Rejection::Terminal(next.status))]
            } else if !next.is_started() && next.legacy_target_wallet_id.is_none() {
                vec![Effect::Reject(Rejection::NotStarted)]
            } else {
                vec![Effect::Abort {
                    migration_id: next.migration_id.clone(),
                    draft_id: next.draft_id.clone(),
                    new_wallet_id: next
                        .new_wallet_id
                        .clone()
                        .or_else(|| next.legacy_target_wallet_id.clone()),
                }]
            }
        }

        Event::AbortFinished(report) => {
            let mut effects = Vec::new();
            if report.is_complete() {
                next.step = MigrationStep::Aborted;
                next.status = MigrationStatus::Aborted;
                next.draft_id = None;
                next.new_wallet_id = None;
                next.legacy_target_wallet_id = None;
                next.flags = Default::default();
                next.flags.has_aborted = true;
                effects.push(Effect::Notify(Notice::info("Migration aborted")));
            } else {
                effects.push(Effect::Notify(Notice::error(format!(
                    "Abort incomplete; retry: {}",
                    report.failed_actions().join(", ")
                ))));
            }
            if report.funds_moved {
                effects.push(Effect::Notify(Notice::warning(
                    "Funds already sent to the new wallet are not returned by abort",
                )));
            }
            effects
        }

        Event::EffectFailed { effect } => {
            // Reset the one-shot guard so the user can retry
            match effect {
                EffectKind::CreateDraft => next.flags.draft_attempted = false,
                EffectKind::FinalizeWallet => next.flags.wallet_attempted = false,
                EffectKind::SubmitSweep => next.flags.sweep_attempted = false,
                // The step move after a finalize or sweep did not land; both
                // are safe to run again
                EffectKind::PersistStep => {
                    next.flags.wallet_attempted = false;
                    next.flags.sweep_attempted = false;
                }
                _ => {}
            }
            Vec::new()
        }
    };

    (next, effects)
}
