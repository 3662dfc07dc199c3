//! Migration orchestrator
//!
//! Owns the [`MigrationState`] of one original wallet, feeds user intents
//! through [`reduce`] and executes the resulting effects against the stores
//! and external services. Effect results are fed back as events until the
//! queue drains.

use crate::config::MigrationConfig;
use crate::core::{DraftWallet, MigrationRecord, MigrationSnapshot, MigrationStatus, MigrationStep, Proxy, Wallet};
use crate::ledger::LedgerQuery;
use crate::migration::abort::{self, AbortPlan, AbortReport};
use crate::migration::completion::{self, CompletionStatus};
use crate::migration::error::{MigrationError, Rejection};
use crate::migration::lifecycle::{self, DraftOutcome, FinalizeOutcome};
use crate::migration::precheck::{self, PreCheckKind, PreCheckReport, PreCheckResult};
use crate::migration::proxies;
use crate::migration::reducer::{reduce, Effect, EffectKind, Event, Notice, NoticeLevel};
use crate::migration::state::MigrationState;
use crate::migration::sweep;
use crate::multisig::{DraftUpdate, ScriptDeriver, Signer, TransactionService, WalletConfig};
use crate::storage::{DraftWalletStore, MigrationStore, NewMigration, ProxyStore, WalletStore};
use std::collections::VecDeque;
use std::sync::Arc;

/// Stores and external collaborators the orchestrator works against
#[derive(Clone)]
pub struct Services {
    pub migrations: Arc<dyn MigrationStore>,
    pub drafts: Arc<dyn DraftWalletStore>,
    pub wallets: Arc<dyn WalletStore>,
    pub proxies: Arc<dyn ProxyStore>,
    pub ledger: Arc<dyn LedgerQuery>,
    pub deriver: Arc<dyn ScriptDeriver>,
    pub transactions: Arc<dyn TransactionService>,
}

impl Services {
    /// Wire all four stores to one backend
    pub fn with_store<S>(
        store: Arc<S>,
        ledger: Arc<dyn LedgerQuery>,
        deriver: Arc<dyn ScriptDeriver>,
        transactions: Arc<dyn TransactionService>,
    ) -> Self
    where
        S: MigrationStore + DraftWalletStore + WalletStore + ProxyStore + 'static,
    {
        Self {
            migrations: store.clone(),
            drafts: store.clone(),
            wallets: store.clone(),
            proxies: store,
            ledger,
            deriver,
            transactions,
        }
    }
}

/// Results produced while draining one dispatch
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub record: Option<MigrationRecord>,
    pub draft: Option<DraftOutcome>,
    pub finalized: Option<FinalizeOutcome>,
    /// `Some(None)` when the sweep found nothing to move
    pub sweep_tx_id: Option<Option<String>>,
    pub proxies_moved: Option<usize>,
    pub abort: Option<AbortReport>,
}

/// Orchestrator for one original wallet and owner
pub struct MigrationOrchestrator {
    services: Services,
    config: MigrationConfig,
    state: MigrationState,
    notices: Vec<Notice>,
}

impl MigrationOrchestrator {
    /// Load the wallet and restore any migration in flight for it
    ///
    /// A target pointer on the wallet without a record is surfaced through
    /// [`MigrationState::can_continue_legacy`]; no record is created here.
    pub async fn mount(
        services: Services,
        config: MigrationConfig,
        original_wallet_id: &str,
        owner_address: &str,
    ) -> Result<Self, MigrationError> {
        let original = services
            .wallets
            .get_wallet(owner_address, original_wallet_id)
            .await?
            .ok_or_else(|| MigrationError::WalletNotFound(original_wallet_id.to_string()))?;

        let pending = services.migrations.get_pending_migrations(owner_address).await?;
        let mut state = match pending.iter().find(|m| m.original_wallet_id == original.id) {
            Some(record) => {
                log::info!(
                    "Resuming migration {} of wallet {} at step {}",
                    record.id,
                    original.id,
                    record.current_step
                );
                MigrationState::from_record(record, owner_address)
            }
            None => MigrationState::fresh(&original.id, owner_address),
        };

        if let Some(migration_id) = state.migration_id.clone() {
            let mut new_wallet = services.wallets.find_wallet_for_migration(&migration_id).await?;
            if state.new_wallet_id.is_none() {
                state.new_wallet_id = match &new_wallet {
                    Some(wallet) => Some(wallet.id.clone()),
                    None => original.migration_target_wallet_id.clone(),
                };
            }
            if state.new_wallet_id.is_none() {
                state.draft_id = services
                    .drafts
                    .find_draft_for_migration(&migration_id)
                    .await?
                    .map(|d| d.id);
            }
            if new_wallet.is_none() {
                if let Some(id) = &state.new_wallet_id {
                    new_wallet = services.wallets.get_wallet(owner_address, id).await?;
                }
            }

            // A sweep may have gone out before the step move was recorded
            if let Some(wallet) = new_wallet {
                if let Some(tx) = services.transactions.find_sweep(&original.id, &wallet.address).await? {
                    log::info!("Migration {} has sweep {} ({:?}) on record", migration_id, tx.id, tx.status);
                    state.sweep_tx_id = Some(tx.id);
                    state.flags.transfer_initiated = true;
                }
            }
        } else if let Some(target) = &original.migration_target_wallet_id {
            log::info!(
                "Wallet {} points at {} without a migration record; offering continue",
                original.id,
                target
            );
            state.legacy_target_wallet_id = Some(target.clone());
        }

        Ok(Self {
            services,
            config,
            state,
            notices: Vec::new(),
        })
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Drain queued notices
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Feed an event through the state machine and run every effect it causes
    ///
    /// The first failing effect is returned after its failure has been fed
    /// back, so retry guards are already reset when the caller sees it.
    pub async fn dispatch(&mut self, event: Event) -> Result<DispatchOutcome, MigrationError> {
        let mut outcome = DispatchOutcome::default();
        let mut queue = VecDeque::from([event]);
        let mut first_error = None;

        while let Some(event) = queue.pop_front() {
            let (next, effects) = reduce(self.state.clone(), event);
            self.state = next;

            for effect in effects {
                let kind = effect.kind();
                match self.run_effect(effect, &mut outcome).await {
                    Ok(Some(event)) => queue.push_back(event),
                    Ok(None) => {}
                    Err(e) => {
                        if kind != EffectKind::Reject {
                            log::warn!("{:?} failed: {}", kind, e);
                            self.push_notice(Notice::error(e.to_string()));
                            queue.push_back(Event::EffectFailed { effect: kind });
                        }
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    fn push_notice(&mut self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => log::info!("{}", notice.message),
            NoticeLevel::Warning => log::warn!("{}", notice.message),
            NoticeLevel::Error => log::error!("{}", notice.message),
        }
        self.notices.push(notice);
    }

    async fn run_effect(
        &mut self,
        effect: Effect,
        outcome: &mut DispatchOutcome,
    ) -> Result<Option<Event>, MigrationError> {
        match effect {
            Effect::CreateMigration {
                snapshot,
                start_step,
                new_wallet_id,
            } => {
                let record = self
                    .services
                    .migrations
                    .create_migration(NewMigration {
                        original_wallet_id: self.state.original_wallet_id.clone(),
                        owner_address: self.state.owner_address.clone(),
                        snapshot,
                        start_step,
                        new_wallet_id,
                    })
                    .await?;
                log::info!("Created migration {} for wallet {}", record.id, record.original_wallet_id);
                outcome.record = Some(record.clone());
                Ok(Some(Event::MigrationCreated(record)))
            }

            Effect::PersistStep {
                migration_id,
                step,
                new_wallet_id,
            } => {
                let record = self
                    .services
                    .migrations
                    .update_migration_step(&migration_id, step, MigrationStatus::InProgress, new_wallet_id.as_deref())
                    .await?;
                log::info!("Migration {} moved to {}", migration_id, step);
                outcome.record = Some(record.clone());
                Ok(Some(Event::StepPersisted(record)))
            }

            Effect::CreateDraft { migration_id, config } => {
                let draft =
                    lifecycle::ensure_draft(&self.services, &self.state.owner_address, &migration_id, config).await?;
                let event = Event::DraftReady {
                    draft_id: draft.draft().id.clone(),
                    created: draft.is_created(),
                };
                outcome.draft = Some(draft);
                Ok(Some(event))
            }

            Effect::FinalizeWallet { migration_id, draft_id } => {
                let original = self.original_wallet().await?;
                let finalized =
                    lifecycle::finalize(&self.services, &original, &migration_id, draft_id.as_deref()).await?;
                // A wallet that already has proxies skips setting up new ones
                let skip_proxy_setup = proxies::has_proxies(&self.services, &original.id).await?;
                let event = Event::WalletFinalized {
                    wallet_id: finalized.wallet_id().to_string(),
                    reused: finalized.is_reused(),
                    skip_proxy_setup,
                };
                outcome.finalized = Some(finalized);
                Ok(Some(event))
            }

            Effect::SubmitSweep { new_wallet_id } => {
                let original = self.original_wallet().await?;
                let new_wallet = self.new_wallet(&new_wallet_id).await?;
                let tx_id = sweep::submit_sweep(&self.services, &original, &new_wallet).await?;
                outcome.sweep_tx_id = Some(tx_id.clone());
                Ok(Some(Event::SweepSubmitted { tx_id }))
            }

            Effect::TransferProxies { new_wallet_id } => {
                let count =
                    proxies::transfer(&self.services, &self.state.original_wallet_id, &new_wallet_id).await?;
                outcome.proxies_moved = Some(count);
                Ok(Some(Event::ProxiesTransferred { count }))
            }

            Effect::CompleteMigration { migration_id } => {
                let original = self.original_wallet().await?;
                let record = completion::archive(&self.services, &original, &migration_id).await?;
                outcome.record = Some(record.clone());
                Ok(Some(Event::Completed(record)))
            }

            Effect::Abort {
                migration_id,
                draft_id,
                new_wallet_id,
            } => {
                let plan = AbortPlan {
                    original_wallet_id: self.state.original_wallet_id.clone(),
                    owner_address: self.state.owner_address.clone(),
                    migration_id,
                    draft_id,
                    new_wallet_id,
                };
                let report = abort::execute(&self.services, &plan).await;
                outcome.abort = Some(report.clone());
                Ok(Some(Event::AbortFinished(report)))
            }

            Effect::Notify(notice) => {
                self.push_notice(notice);
                Ok(None)
            }

            Effect::Reject(rejection) => {
                self.push_notice(Notice::error(rejection.to_string()));
                Err(rejection.into())
            }
        }
    }

    async fn original_wallet(&self) -> Result<Wallet, MigrationError> {
        self.services
            .wallets
            .get_wallet(&self.state.owner_address, &self.state.original_wallet_id)
            .await?
            .ok_or_else(|| MigrationError::WalletNotFound(self.state.original_wallet_id.clone()))
    }

    /// The new wallet need not list the owner as a signer
    async fn new_wallet(&self, wallet_id: &str) -> Result<Wallet, MigrationError> {
        if let Some(migration_id) = &self.state.migration_id {
            if let Some(wallet) = self.services.wallets.find_wallet_for_migration(migration_id).await? {
                if wallet.id == wallet_id {
                    return Ok(wallet);
                }
            }
        }
        self.services
            .wallets
            .get_wallet(&self.state.owner_address, wallet_id)
            .await?
            .ok_or_else(|| MigrationError::WalletNotFound(wallet_id.to_string()))
    }

    async fn snapshot(&self) -> Result<MigrationSnapshot, MigrationError> {
        let original = self.original_wallet().await?;
        Ok(MigrationSnapshot {
            name: original.config.name.clone(),
            description: original.config.description.clone(),
        })
    }

    fn require_record(outcome: DispatchOutcome) -> Result<MigrationRecord, MigrationError> {
        outcome.record.ok_or_else(|| Rejection::NotStarted.into())
    }

    /// Create the migration record
    pub async fn start(&mut self) -> Result<MigrationRecord, MigrationError> {
        let snapshot = self.snapshot().await?;
        let outcome = self.dispatch(Event::StartRequested { snapshot }).await?;
        Self::require_record(outcome)
    }

    /// Create the record for a wallet left with only a target pointer
    pub async fn continue_legacy(&mut self) -> Result<MigrationRecord, MigrationError> {
        let snapshot = self.snapshot().await?;
        let outcome = self.dispatch(Event::ContinueLegacyRequested { snapshot }).await?;
        Self::require_record(outcome)
    }

    pub async fn run_pre_checks(&self) -> Result<PreCheckReport, MigrationError> {
        self.run_pre_checks_with(|_, _| {}).await
    }

    pub async fn run_pre_checks_with<F>(&self, on_update: F) -> Result<PreCheckReport, MigrationError>
    where
        F: FnMut(PreCheckKind, &PreCheckResult),
    {
        let original = self.original_wallet().await?;
        Ok(precheck::run_with_updates(&self.services, &original, self.config.check_timeout(), on_update).await)
    }

    /// Run the checks again and advance to wallet creation if every one passes
    pub async fn confirm_pre_checks(&mut self) -> Result<PreCheckReport, MigrationError> {
        let original = self.original_wallet().await?;
        let report = precheck::run(&self.services, &original, self.config.check_timeout()).await;
        if !report.is_ready() {
            return Err(MigrationError::PreChecksNotReady(report.blockers().join("; ")));
        }
        self.dispatch(Event::PreChecksPassed).await?;
        Ok(report)
    }

    /// Create the temporary wallet; `None` when a request is already in flight
    pub async fn create_draft(&mut self, config: WalletConfig) -> Result<Option<DraftOutcome>, MigrationError> {
        let outcome = self.dispatch(Event::CreateDraftRequested { config }).await?;
        Ok(outcome.draft)
    }

    pub async fn draft(&self) -> Result<Option<DraftWallet>, MigrationError> {
        match &self.state.draft_id {
            Some(id) => Ok(self.services.drafts.get_new_wallet(id).await?),
            None => Ok(None),
        }
    }

    fn draft_id(&self) -> Result<&str, MigrationError> {
        self.state
            .draft_id
            .as_deref()
            .ok_or_else(|| Rejection::NoDraft.into())
    }

    pub async fn update_draft(&mut self, update: DraftUpdate) -> Result<DraftWallet, MigrationError> {
        let draft_id = self.draft_id()?.to_string();
        lifecycle::update_draft(&self.services, &draft_id, update).await
    }

    pub async fn join_draft(&mut self, signer: Signer) -> Result<DraftWallet, MigrationError> {
        let draft_id = self.draft_id()?.to_string();
        lifecycle::join_draft(&self.services, &draft_id, signer).await
    }

    pub fn invite_link(&self) -> Option<String> {
        self.state
            .draft_id
            .as_deref()
            .map(|id| lifecycle::invite_link(&self.config.invite_base_url, id))
    }

    /// Commit the draft; `None` when a request is already in flight
    pub async fn finalize(&mut self) -> Result<Option<FinalizeOutcome>, MigrationError> {
        let outcome = self.dispatch(Event::FinalizeRequested).await?;
        Ok(outcome.finalized)
    }

    /// Register a proxy for the new wallet during proxy setup
    pub async fn register_proxy(
        &mut self,
        proxy_address: &str,
        param_ref: &str,
        description: &str,
    ) -> Result<Proxy, MigrationError> {
        if self.state.step != MigrationStep::ProxySetup {
            return Err(Rejection::WrongStep {
                expected: MigrationStep::ProxySetup,
                actual: self.state.step,
            }
            .into());
        }
        let new_wallet_id = self
            .state
            .new_wallet_id
            .clone()
            .ok_or(Rejection::NoNewWallet)?;
        proxies::register_proxy(&self.services, &new_wallet_id, proxy_address, param_ref, description).await
    }

    pub async fn finish_proxy_setup(&mut self) -> Result<(), MigrationError> {
        self.dispatch(Event::ProxySetupFinished).await?;
        Ok(())
    }

    /// Submit the sweep; returns its transaction id, `None` if nothing was swept
    pub async fn sweep(&mut self) -> Result<Option<String>, MigrationError> {
        let outcome = self.dispatch(Event::SweepRequested).await?;
        Ok(outcome.sweep_tx_id.flatten())
    }

    pub async fn transfer_proxies(&mut self) -> Result<usize, MigrationError> {
        let outcome = self.dispatch(Event::ProxyTransferRequested).await?;
        Ok(outcome.proxies_moved.unwrap_or(0))
    }

    pub async fn completion_status(&self) -> Result<CompletionStatus, MigrationError> {
        let original = self.original_wallet().await?;
        completion::refresh(&self.services, &original).await
    }

    /// Poll the completion gate until it opens
    pub async fn watch_completion<F>(&self, on_update: F) -> Result<CompletionStatus, MigrationError>
    where
        F: FnMut(&CompletionStatus),
    {
        let original = self.original_wallet().await?;
        Ok(completion::watch(&self.services, &original, self.config.poll_interval(), on_update).await)
    }

    /// Archive the original wallet and close the migration
    pub async fn complete(&mut self) -> Result<MigrationRecord, MigrationError> {
        let outcome = self.dispatch(Event::CompleteRequested).await?;
        Self::require_record(outcome)
    }

    /// Roll back everything that can be; the report lists what needs a retry
    pub async fn abort(&mut self) -> Result<AbortReport, MigrationError> {
        let outcome = self.dispatch(Event::AbortRequested).await?;
        Ok(outcome.abort.unwrap_or_default())
    }
}
