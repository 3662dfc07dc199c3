//! Wallet migration orchestrator
//!
//! Moves a multisig wallet's funds, governance proxies and identity to a new
//! signer configuration through a resumable, abortable sequence of steps:
//!
//! `pre_checks → create_wallet → [proxy_setup] → fund_transfer → proxy_transfer → complete`
//!
//! The persisted [`MigrationRecord`](crate::core::MigrationRecord) is the source
//! of truth; [`MigrationOrchestrator::mount`] restores from it after a reload.
//!
//! # Example
//!
//! ```ignore
//! let mut orchestrator = MigrationOrchestrator::mount(services, config, &wallet_id, &owner).await?;
//! orchestrator.start().await?;
//!
//! let report = orchestrator.confirm_pre_checks().await?;
//! assert!(report.is_ready());
//!
//! orchestrator.create_draft(new_config).await?;
//! println!("Invite co-signers: {}", orchestrator.invite_link().unwrap_or_default());
//! orchestrator.finalize().await?;
//! ```

pub mod abort;
pub mod completion;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod precheck;
pub mod proxies;
pub mod reducer;
pub mod state;
pub mod sweep;

#[cfg(test)]
mod scenarios;

pub use abort::{AbortAction, AbortActionKind, AbortPlan, AbortReport, ActionOutcome};
pub use completion::CompletionStatus;
pub use error::{MigrationError, Rejection};
pub use lifecycle::{invite_link, DraftOutcome, FinalizeOutcome};
pub use orchestrator::{DispatchOutcome, MigrationOrchestrator, Services};
pub use precheck::{PreCheckKind, PreCheckReport, PreCheckResult, PreCheckStatus};
pub use reducer::{reduce, Effect, EffectKind, Event, Notice, NoticeLevel};
pub use state::{MigrationFlags, MigrationState};
