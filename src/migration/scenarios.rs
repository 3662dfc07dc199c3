//! End-to-end migration tests against the in-memory store, the fixture
//! ledger and the pending transaction book

use crate::config::MigrationConfig;
use crate::core::{DraftWallet, MigrationRecord, MigrationStatus, MigrationStep, Utxo, Wallet};
use crate::ledger::{AccountStatus, FixtureLedger};
use crate::migration::abort::{AbortActionKind, ActionOutcome};
use crate::migration::error::{MigrationError, Rejection};
use crate::migration::lifecycle::{self, DraftOutcome, FinalizeOutcome};
use crate::migration::orchestrator::{MigrationOrchestrator, Services};
use crate::migration::precheck::{PreCheckKind, PreCheckStatus};
use crate::migration::sweep;
use crate::multisig::{
    DraftUpdate, NativeScriptDeriver, PendingStatus, PendingTxBook, ScriptDeriver, Signer, SweepTransaction,
    TransactionService, WalletConfig,
};
use crate::storage::{
    DraftWalletStore, MemoryStore, MigrationStore, NewMigration, ProxyStore, StorageError, WalletStore,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ALICE: &str = "addr_test1_alice";
const BOB: &str = "addr_test1_bob";
const CAROL: &str = "addr_test1_carol";

struct Harness {
    store: Arc<MemoryStore>,
    ledger: Arc<FixtureLedger>,
    book: Arc<PendingTxBook>,
    services: Services,
    original: Wallet,
}

fn original_config() -> WalletConfig {
    WalletConfig::new("Treasury", vec![Signer::new(ALICE, "Alice"), Signer::new(BOB, "Bob")], 2)
}

fn new_config() -> WalletConfig {
    WalletConfig::new(
        "Treasury v2",
        vec![
            Signer::new(ALICE, "Alice"),
            Signer::new(BOB, "Bob"),
            Signer::new(CAROL, "Carol"),
        ],
        2,
    )
}

async fn harness_with(config: WalletConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(FixtureLedger::new());
    let book = Arc::new(PendingTxBook::new());
    let deriver = Arc::new(NativeScriptDeriver::default());

    let derived = deriver.derive(&config).await.unwrap();
    let original = store.create_wallet(config, &derived, None).await.unwrap();

    let services = Services::with_store(store.clone(), ledger.clone(), deriver, book.clone());
    Harness {
        store,
        ledger,
        book,
        services,
        original,
    }
}

async fn harness() -> Harness {
    harness_with(original_config()).await
}

impl Harness {
    async fn fund_original(&self) -> Vec<Utxo> {
        let utxos = vec![
            Utxo::ada_only("aa11", 0, &self.original.address, 5_000_000),
            Utxo::ada_only("bb22", 1, &self.original.address, 7_500_000),
        ];
        self.ledger.set_utxos(&self.original.address, utxos.clone()).await;
        utxos
    }

    async fn mount(&self) -> MigrationOrchestrator {
        self.mount_as(ALICE).await
    }

    async fn mount_as(&self, owner: &str) -> MigrationOrchestrator {
        MigrationOrchestrator::mount(self.services.clone(), MigrationConfig::default(), &self.original.id, owner)
            .await
            .unwrap()
    }

    async fn original_now(&self) -> Wallet {
        self.store.get_wallet(ALICE, &self.original.id).await.unwrap().unwrap()
    }

    async fn wallets_for(&self, migration_id: &str) -> usize {
        self.store
            .snapshot()
            .await
            .wallets
            .values()
            .filter(|w| w.migration_id.as_deref() == Some(migration_id))
            .count()
    }

    async fn drafts_for(&self, migration_id: &str) -> usize {
        self.store
            .snapshot()
            .await
            .drafts
            .values()
            .filter(|d| d.migration_id.as_deref() == Some(migration_id))
            .count()
    }

    /// Co-sign and broadcast a sweep, then land it on the ledger
    async fn land(&self, tx_id: &str) {
        self.book.sign(tx_id, ALICE).await.unwrap();
        let tx = self.book.sign(tx_id, BOB).await.unwrap();
        assert!(tx.is_ready());
        let tx = self.book.broadcast(tx_id).await.unwrap();
        self.ledger.apply_sweep(&tx).await.unwrap();
    }
}

async fn to_create_wallet(orchestrator: &mut MigrationOrchestrator) {
    orchestrator.start().await.unwrap();
    orchestrator.confirm_pre_checks().await.unwrap();
    assert_eq!(orchestrator.state().step, MigrationStep::CreateWallet);
}

/// Drive a funded migration up to the sweep step; returns the new wallet
async fn to_fund_transfer(h: &Harness, orchestrator: &mut MigrationOrchestrator) -> Wallet {
    to_create_wallet(orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();
    let new_wallet_id = orchestrator.finalize().await.unwrap().unwrap().wallet_id().to_string();
    orchestrator.finish_proxy_setup().await.unwrap();
    assert_eq!(orchestrator.state().step, MigrationStep::FundTransfer);
    h.store.get_wallet(ALICE, &new_wallet_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_clean_wallet_passes_pre_checks() {
    let h = harness().await;
    h.fund_original().await;
    let mut orchestrator = h.mount().await;

    let record = orchestrator.start().await.unwrap();
    assert_eq!(record.current_step, MigrationStep::PreChecks);
    assert_eq!(record.status, MigrationStatus::Pending);
    assert_eq!(record.snapshot.name, "Treasury");

    let mut seen = Vec::new();
    let report = orchestrator
        .run_pre_checks_with(|kind, result| seen.push((kind, result.status)))
        .await
        .unwrap();

    assert_eq!(seen.len(), 3);
    assert_eq!(report.drep.status, PreCheckStatus::Success);
    assert_eq!(report.staking.status, PreCheckStatus::Success);
    assert_eq!(report.pending_transactions.status, PreCheckStatus::Success);
    assert!(report.is_ready());

    let confirmed = orchestrator.confirm_pre_checks().await.unwrap();
    assert!(confirmed.is_ready());
    assert_eq!(orchestrator.state().step, MigrationStep::CreateWallet);

    let persisted = h.store.get_migration(&record.id).await.unwrap().unwrap();
    assert_eq!(persisted.current_step, MigrationStep::CreateWallet);
    assert_eq!(persisted.status, MigrationStatus::InProgress);
}

#[tokio::test]
async fn test_direct_drep_blocks_migration() {
    let h = harness().await;
    let drep_id = h.original.drep_id.clone().unwrap();
    h.ledger.set_drep(&drep_id, true).await;

    let mut orchestrator = h.mount().await;
    orchestrator.start().await.unwrap();
    let report = orchestrator.run_pre_checks().await.unwrap();

    assert_eq!(report.drep.status, PreCheckStatus::Error);
    assert!(report.drep.details.as_deref().unwrap().contains("Retire"));
    assert!(!report.is_ready());

    let result = orchestrator.confirm_pre_checks().await;
    assert!(matches!(result, Err(MigrationError::PreChecksNotReady(_))));
    assert_eq!(orchestrator.state().step, MigrationStep::PreChecks);
}

#[tokio::test]
async fn test_confirm_checks_the_ledger_again() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    orchestrator.start().await.unwrap();

    let earlier = orchestrator.run_pre_checks().await.unwrap();
    assert!(earlier.is_ready());

    // The wallet registered as a DRep after the report was shown
    let drep_id = h.original.drep_id.clone().unwrap();
    h.ledger.set_drep(&drep_id, true).await;

    let result = orchestrator.confirm_pre_checks().await;
    assert!(matches!(result, Err(MigrationError::PreChecksNotReady(_))));
    assert_eq!(orchestrator.state().step, MigrationStep::PreChecks);
    let migration_id = orchestrator.state().migration_id.clone().unwrap();
    let record = h.store.get_migration(&migration_id).await.unwrap().unwrap();
    assert_eq!(record.current_step, MigrationStep::PreChecks);
}

#[tokio::test]
async fn test_drep_truth_table() {
    // Proxy-only registration
    let h = harness().await;
    h.store
        .create_proxy(&h.original.id, "addr_test1_proxy", "policy01", "Governance")
        .await
        .unwrap();
    h.ledger.set_proxy_status("addr_test1_proxy", true).await;
    let report = h.mount().await.run_pre_checks().await.unwrap();
    assert_eq!(report.drep.status, PreCheckStatus::Success);
    assert!(report.drep.message.contains("proxy"));

    // Nothing registered
    let h = harness().await;
    let report = h.mount().await.run_pre_checks().await.unwrap();
    assert_eq!(report.drep.status, PreCheckStatus::Success);
}

#[tokio::test]
async fn test_staking_and_pending_warnings_do_not_block() {
    let config = WalletConfig::new(
        "Staked",
        vec![
            Signer::new(ALICE, "Alice").with_stake_key("stake_alice"),
            Signer::new(BOB, "Bob").with_stake_key("stake_bob"),
        ],
        2,
    );
    let h = harness_with(config).await;
    let utxos = h.fund_original().await;

    let stake_address = h.original.stake_address.clone().unwrap();
    h.ledger
        .set_account(
            &stake_address,
            AccountStatus {
                active: true,
                pool_id: Some("pool1xyz".to_string()),
            },
        )
        .await;

    let pending = SweepTransaction::new(&h.original, utxos, "addr_test1_elsewhere").unwrap();
    h.book.submit_sweep(pending).await.unwrap();

    let report = h.mount().await.run_pre_checks().await.unwrap();
    assert_eq!(report.staking.status, PreCheckStatus::Warning);
    assert_eq!(report.pending_transactions.status, PreCheckStatus::Warning);
    assert_eq!(report.warnings().len(), 2);
    assert!(report.is_ready());
}

#[tokio::test]
async fn test_failed_ledger_query_is_an_error() {
    let h = harness().await;
    h.store
        .create_proxy(&h.original.id, "addr_test1_proxy", "policy01", "Governance")
        .await
        .unwrap();
    h.ledger.set_offline(true).await;

    let report = h.mount().await.run_pre_checks().await.unwrap();
    assert_eq!(report.drep.status, PreCheckStatus::Error);
    assert!(!report.is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_slow_lookup_times_out() {
    let h = harness().await;
    h.ledger.set_latency(Duration::from_secs(60)).await;

    let report = h.mount().await.run_pre_checks().await.unwrap();
    assert_eq!(report.drep.status, PreCheckStatus::Error);
    assert!(report.drep.details.as_deref().unwrap().contains("timed out"));
    assert_eq!(report.get(PreCheckKind::PendingTransactions).status, PreCheckStatus::Success);
}

#[tokio::test]
async fn test_abort_after_draft() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    let migration_id = orchestrator.state().migration_id.clone().unwrap();

    let created = orchestrator.create_draft(new_config()).await.unwrap();
    assert!(matches!(created, Some(DraftOutcome::Created(_))));
    assert!(orchestrator.invite_link().unwrap().contains("/wallets/invite/"));

    let report = orchestrator.abort().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.outcome(AbortActionKind::DeleteDraft), Some(&ActionOutcome::Done));
    assert!(!report.funds_moved);

    assert_eq!(orchestrator.state().step, MigrationStep::Aborted);
    assert!(orchestrator.state().flags.has_aborted);

    let record = h.store.get_migration(&migration_id).await.unwrap().unwrap();
    assert_eq!(record.status, MigrationStatus::Aborted);
    assert_eq!(h.drafts_for(&migration_id).await, 0);
    assert_eq!(h.wallets_for(&migration_id).await, 0);
    assert!(h.original_now().await.migration_target_wallet_id.is_none());

    // A new attempt may start once the old one is terminal
    let mut again = h.mount().await;
    assert!(!again.state().is_started());
    again.start().await.unwrap();
}

#[tokio::test]
async fn test_existing_proxies_skip_proxy_setup() {
    let h = harness().await;
    for address in ["addr_test1_proxy_a", "addr_test1_proxy_b"] {
        h.store
            .create_proxy(&h.original.id, address, "policy01", "Governance")
            .await
            .unwrap();
    }

    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();

    let finalized = orchestrator.finalize().await.unwrap().unwrap();
    assert!(matches!(finalized, FinalizeOutcome::Created(_)));
    assert_eq!(orchestrator.state().step, MigrationStep::FundTransfer);
    assert!(orchestrator.state().draft_id.is_none());

    let original = h.original_now().await;
    assert_eq!(original.migration_target_wallet_id.as_deref(), Some(finalized.wallet_id()));
    let migration_id = orchestrator.state().migration_id.clone().unwrap();
    assert_eq!(h.drafts_for(&migration_id).await, 0);
}

#[tokio::test]
async fn test_sweep_then_complete() {
    let h = harness().await;
    let utxos = h.fund_original().await;

    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();
    let new_wallet = match orchestrator.finalize().await.unwrap().unwrap() {
        FinalizeOutcome::Created(wallet) => wallet,
        other => panic!("expected a new wallet, got {:?}", other),
    };
    assert_eq!(orchestrator.state().step, MigrationStep::ProxySetup);

    orchestrator.finish_proxy_setup().await.unwrap();
    assert_eq!(orchestrator.state().step, MigrationStep::FundTransfer);

    let tx_id = orchestrator.sweep().await.unwrap().unwrap();
    assert!(orchestrator.state().flags.transfer_initiated);
    assert_eq!(orchestrator.state().step, MigrationStep::ProxyTransfer);

    // One transaction, both UTxOs in, change to the new wallet, nothing else out
    let tx = h.book.get(&tx_id).await.unwrap();
    assert_eq!(tx.inputs, utxos);
    assert_eq!(tx.change_address, new_wallet.address);
    assert!(tx.outputs.is_empty());
    assert_eq!(h.book.for_wallet(&h.original.id).await.len(), 1);

    assert_eq!(orchestrator.transfer_proxies().await.unwrap(), 0);
    assert_eq!(orchestrator.state().step, MigrationStep::Complete);

    let status = orchestrator.completion_status().await.unwrap();
    assert_eq!(status.utxo_count, 2);
    assert_eq!(status.pending_count, 1);
    assert_eq!(status.residual_ada(), "12.500000");
    assert!(matches!(
        orchestrator.complete().await,
        Err(MigrationError::CompletionBlocked { utxos: 2, pending: 1 })
    ));
    assert!(!h.original_now().await.archived);

    h.land(&tx_id).await;

    let status = orchestrator.completion_status().await.unwrap();
    assert!(status.can_complete());

    let record = orchestrator.complete().await.unwrap();
    assert_eq!(record.status, MigrationStatus::Completed);
    let original = h.original_now().await;
    assert!(original.archived);
    assert!(original.migration_target_wallet_id.is_none());
    assert_eq!(orchestrator.state().status, MigrationStatus::Completed);

    assert!(matches!(
        orchestrator.abort().await,
        Err(MigrationError::Rejected(Rejection::Terminal(MigrationStatus::Completed)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_completion_watch_polls_until_clear() {
    let h = harness().await;
    h.fund_original().await;

    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();
    orchestrator.finalize().await.unwrap();
    orchestrator.finish_proxy_setup().await.unwrap();
    let tx_id = orchestrator.sweep().await.unwrap().unwrap();

    let mut updates = Vec::new();
    let (status, ()) = tokio::join!(
        orchestrator.watch_completion(|status| updates.push(status.can_complete())),
        async {
            tokio::time::sleep(Duration::from_secs(25)).await;
            h.land(&tx_id).await;
        }
    );

    let status = status.unwrap();
    assert!(status.can_complete());
    assert!(updates.len() >= 3);
    assert_eq!(updates.last(), Some(&true));
    assert!(updates[..updates.len() - 1].iter().all(|clear| !clear));
}

#[tokio::test]
async fn test_one_active_migration_per_wallet() {
    let h = harness().await;
    let mut alice = h.mount().await;
    alice.start().await.unwrap();

    // Same owner: the record is resumed, not duplicated
    let mut resumed = h.mount().await;
    assert_eq!(resumed.state().migration_id, alice.state().migration_id);
    assert!(matches!(
        resumed.start().await,
        Err(MigrationError::Rejected(Rejection::AlreadyStarted(_)))
    ));

    // Another co-signer does not see Alice's record; the store refuses
    let mut bob = h.mount_as(BOB).await;
    assert!(!bob.state().is_started());
    assert!(matches!(
        bob.start().await,
        Err(MigrationError::Storage(StorageError::Conflict(_)))
    ));

    let active = h
        .store
        .snapshot()
        .await
        .migrations
        .values()
        .filter(|m| m.original_wallet_id == h.original.id && m.is_active())
        .count();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn test_resume_never_creates_second_wallet() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();
    let first = orchestrator.finalize().await.unwrap().unwrap();
    orchestrator.finish_proxy_setup().await.unwrap();
    let migration_id = orchestrator.state().migration_id.clone().unwrap();

    // Reload mid-flight
    let mut reloaded = h.mount().await;
    assert_eq!(reloaded.state().step, MigrationStep::FundTransfer);
    assert_eq!(reloaded.state().new_wallet_id.as_deref(), Some(first.wallet_id()));
    assert!(matches!(
        reloaded.finalize().await,
        Err(MigrationError::Rejected(Rejection::WrongStep { .. }))
    ));

    // Even a direct finalize reuses the committed wallet
    let original = h.original_now().await;
    let again = lifecycle::finalize(&h.services, &original, &migration_id, None).await.unwrap();
    assert_eq!(again, FinalizeOutcome::Reused(first.wallet_id().to_string()));
    assert_eq!(h.wallets_for(&migration_id).await, 1);
}

#[tokio::test]
async fn test_legacy_pointer_continues_without_new_wallet() {
    let h = harness().await;
    let deriver = NativeScriptDeriver::default();
    let config = new_config();
    let derived = deriver.derive(&config).await.unwrap();
    let target = h.store.create_wallet(config, &derived, None).await.unwrap();
    h.store.set_migration_target(&h.original.id, &target.id).await.unwrap();

    let mut orchestrator = h.mount().await;
    assert!(orchestrator.state().can_continue_legacy());
    assert!(h.store.get_pending_migrations(ALICE).await.unwrap().is_empty());

    let record = orchestrator.continue_legacy().await.unwrap();
    assert_eq!(record.current_step, MigrationStep::CreateWallet);
    assert_eq!(record.new_wallet_id.as_deref(), Some(target.id.as_str()));

    // Draft creation is moot once a wallet exists
    assert!(orchestrator.create_draft(new_config()).await.unwrap().is_none());

    let finalized = orchestrator.finalize().await.unwrap().unwrap();
    assert_eq!(finalized, FinalizeOutcome::Reused(target.id.clone()));
    assert_eq!(orchestrator.state().step, MigrationStep::ProxySetup);
    assert_eq!(h.store.snapshot().await.wallets.len(), 2);
}

#[tokio::test]
async fn test_create_draft_twice_is_noop() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    let migration_id = orchestrator.state().migration_id.clone().unwrap();

    let first = orchestrator.create_draft(new_config()).await.unwrap().unwrap();
    assert!(orchestrator.create_draft(new_config()).await.unwrap().is_none());

    // After a reload the draft is found again
    let mut reloaded = h.mount().await;
    assert_eq!(reloaded.state().draft_id.as_deref(), Some(first.draft().id.as_str()));
    assert!(reloaded.create_draft(new_config()).await.unwrap().is_none());

    // Without the local state the store lookup short-circuits
    let existing = lifecycle::ensure_draft(&h.services, ALICE, &migration_id, new_config())
        .await
        .unwrap();
    assert!(matches!(existing, DraftOutcome::Existing(_)));
    assert_eq!(h.drafts_for(&migration_id).await, 1);
}

#[tokio::test]
async fn test_invalid_draft_never_reaches_store() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    let migration_id = orchestrator.state().migration_id.clone().unwrap();

    let nameless = WalletConfig::new("", vec![Signer::new(ALICE, "")], 1);
    let err = orchestrator.create_draft(nameless).await.unwrap_err();
    assert!(err.is_validation());

    let signerless = WalletConfig::new("Treasury v2", Vec::new(), 1);
    assert!(orchestrator.create_draft(signerless).await.unwrap_err().is_validation());
    assert_eq!(h.drafts_for(&migration_id).await, 0);
}

#[tokio::test]
async fn test_collaborators_edit_draft() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator
        .create_draft(WalletConfig::new("Treasury v2", vec![Signer::new(ALICE, "Alice")], 1))
        .await
        .unwrap();

    orchestrator.join_draft(Signer::new(BOB, "Bob")).await.unwrap();
    let draft = orchestrator.join_draft(Signer::new(BOB, "Bob")).await.unwrap();
    assert_eq!(draft.config.signer_count(), 2);

    let draft = orchestrator
        .update_draft(DraftUpdate::SetThreshold { required: 2 })
        .await
        .unwrap();
    assert_eq!(draft.config.describe_rule(), "2-of-2");

    let finalized = orchestrator.finalize().await.unwrap().unwrap();
    let wallet = match finalized {
        FinalizeOutcome::Created(wallet) => wallet,
        other => panic!("expected a new wallet, got {:?}", other),
    };
    assert_eq!(wallet.config.num_required_signers, 2);
    assert!(wallet.config.is_signer(BOB));
}

/// Draft store whose calls can be made to fail
struct FlakyDrafts {
    inner: Arc<MemoryStore>,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
}

impl FlakyDrafts {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_create: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DraftWalletStore for FlakyDrafts {
    async fn create_new_wallet(
        &self,
        owner_address: &str,
        config: WalletConfig,
        migration_id: Option<&str>,
    ) -> Result<DraftWallet, StorageError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StorageError::InvalidData("draft service down".to_string()));
        }
        self.inner.create_new_wallet(owner_address, config, migration_id).await
    }

    async fn update_new_wallet(&self, draft_id: &str, update: DraftUpdate) -> Result<DraftWallet, StorageError> {
        self.inner.update_new_wallet(draft_id, update).await
    }

    async fn get_new_wallet(&self, draft_id: &str) -> Result<Option<DraftWallet>, StorageError> {
        self.inner.get_new_wallet(draft_id).await
    }

    async fn find_draft_for_migration(&self, migration_id: &str) -> Result<Option<DraftWallet>, StorageError> {
        self.inner.find_draft_for_migration(migration_id).await
    }

    async fn delete_new_wallet(&self, draft_id: &str) -> Result<(), StorageError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::InvalidData("draft service down".to_string()));
        }
        self.inner.delete_new_wallet(draft_id).await
    }
}

#[tokio::test]
async fn test_failed_draft_creation_can_be_retried() {
    let mut h = harness().await;
    let drafts = Arc::new(FlakyDrafts::new(h.store.clone()));
    h.services.drafts = drafts.clone() as Arc<dyn DraftWalletStore>;

    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;

    drafts.fail_create.store(true, Ordering::SeqCst);
    let err = orchestrator.create_draft(new_config()).await.unwrap_err();
    assert!(matches!(err, MigrationError::Storage(_)));
    assert!(!orchestrator.state().flags.draft_attempted);
    assert_eq!(orchestrator.state().step, MigrationStep::CreateWallet);
    assert!(!orchestrator.take_notices().is_empty());

    drafts.fail_create.store(false, Ordering::SeqCst);
    let created = orchestrator.create_draft(new_config()).await.unwrap();
    assert!(matches!(created, Some(DraftOutcome::Created(_))));
}

#[tokio::test]
async fn test_abort_actions_are_isolated() {
    let mut h = harness().await;
    let drafts = Arc::new(FlakyDrafts::new(h.store.clone()));
    h.services.drafts = drafts.clone() as Arc<dyn DraftWalletStore>;

    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();
    let migration_id = orchestrator.state().migration_id.clone().unwrap();

    drafts.fail_delete.store(true, Ordering::SeqCst);
    let report = orchestrator.abort().await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].kind, AbortActionKind::DeleteDraft);
    assert_eq!(report.outcome(AbortActionKind::CancelMigration), Some(&ActionOutcome::Done));
    assert_eq!(report.outcome(AbortActionKind::ClearMigrationTarget), Some(&ActionOutcome::Done));

    // The user is told to retry and the state is not terminal yet
    assert_ne!(orchestrator.state().step, MigrationStep::Aborted);
    let record = h.store.get_migration(&migration_id).await.unwrap().unwrap();
    assert_eq!(record.status, MigrationStatus::Aborted);

    drafts.fail_delete.store(false, Ordering::SeqCst);
    let retry = orchestrator.abort().await.unwrap();
    assert!(retry.is_complete());
    assert_eq!(orchestrator.state().step, MigrationStep::Aborted);
    assert_eq!(h.drafts_for(&migration_id).await, 0);
}

#[tokio::test]
async fn test_abort_keeps_funded_wallet() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();
    let new_wallet_id = orchestrator.finalize().await.unwrap().unwrap().wallet_id().to_string();
    let new_wallet = h.store.get_wallet(ALICE, &new_wallet_id).await.unwrap().unwrap();

    h.ledger
        .set_utxos(
            &new_wallet.address,
            vec![Utxo::ada_only("cc33", 0, &new_wallet.address, 1_000_000)],
        )
        .await;

    let migration_id = orchestrator.state().migration_id.clone().unwrap();
    let report = orchestrator.abort().await.unwrap();
    assert!(report.is_complete());
    assert!(report.funds_moved);
    assert!(matches!(
        report.outcome(AbortActionKind::DeleteNewWallet),
        Some(ActionOutcome::Skipped(_))
    ));
    assert_eq!(report.outcome(AbortActionKind::DetachNewWallet), Some(&ActionOutcome::Done));
    assert!(h.original_now().await.migration_target_wallet_id.is_none());

    // The kept wallet no longer belongs to the aborted migration
    let kept = h.store.get_wallet(ALICE, &new_wallet_id).await.unwrap().unwrap();
    assert!(kept.migration_id.is_none());
    assert!(h.store.find_wallet_for_migration(&migration_id).await.unwrap().is_none());
    assert_eq!(h.wallets_for(&migration_id).await, 0);
    assert_eq!(h.drafts_for(&migration_id).await, 0);
    assert!(orchestrator
        .take_notices()
        .iter()
        .any(|n| n.message.contains("not returned")));
}

#[tokio::test]
async fn test_abort_restores_proxies_and_deletes_empty_wallet() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();
    let new_wallet_id = orchestrator.finalize().await.unwrap().unwrap().wallet_id().to_string();
    assert_eq!(orchestrator.state().step, MigrationStep::ProxySetup);

    let proxy = orchestrator
        .register_proxy("addr_test1_proxy_new", "policy02", "New governance")
        .await
        .unwrap();
    assert_eq!(proxy.wallet_id, new_wallet_id);

    let report = orchestrator.abort().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.outcome(AbortActionKind::RestoreProxies), Some(&ActionOutcome::Done));
    assert_eq!(report.outcome(AbortActionKind::DeleteNewWallet), Some(&ActionOutcome::Done));

    assert!(h.store.get_wallet(ALICE, &new_wallet_id).await.unwrap().is_none());
    let proxies = h.store.get_proxies_by_wallet(&h.original.id).await.unwrap();
    assert_eq!(proxies.len(), 1);
    assert_eq!(proxies[0].proxy_address, "addr_test1_proxy_new");
}

#[tokio::test]
async fn test_proxies_move_with_migration() {
    let h = harness().await;
    h.fund_original().await;
    h.store
        .create_proxy(&h.original.id, "addr_test1_proxy", "policy01", "Governance")
        .await
        .unwrap();

    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();
    let new_wallet_id = orchestrator.finalize().await.unwrap().unwrap().wallet_id().to_string();
    orchestrator.sweep().await.unwrap();

    assert_eq!(orchestrator.transfer_proxies().await.unwrap(), 1);
    assert_eq!(orchestrator.state().step, MigrationStep::Complete);
    assert!(h.store.get_proxies_by_wallet(&h.original.id).await.unwrap().is_empty());
    assert_eq!(h.store.get_proxies_by_wallet(&new_wallet_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_wallet_skips_sweep() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    to_create_wallet(&mut orchestrator).await;
    orchestrator.create_draft(new_config()).await.unwrap();
    orchestrator.finalize().await.unwrap();
    orchestrator.finish_proxy_setup().await.unwrap();

    assert_eq!(orchestrator.sweep().await.unwrap(), None);
    assert_eq!(orchestrator.state().step, MigrationStep::ProxyTransfer);
    assert!(h.book.for_wallet(&h.original.id).await.is_empty());
}

#[tokio::test]
async fn test_sweep_is_reused_after_restart_before_step_move() {
    let h = harness().await;
    h.fund_original().await;
    let mut orchestrator = h.mount().await;
    let new_wallet = to_fund_transfer(&h, &mut orchestrator).await;

    // The sweep reached the signers but the process died before the step moved
    let original = h.original_now().await;
    let tx_id = sweep::submit_sweep(&h.services, &original, &new_wallet)
        .await
        .unwrap()
        .unwrap();
    drop(orchestrator);

    let mut reloaded = h.mount().await;
    assert_eq!(reloaded.state().step, MigrationStep::FundTransfer);
    assert_eq!(reloaded.state().sweep_tx_id.as_deref(), Some(tx_id.as_str()));
    assert!(reloaded.state().flags.transfer_initiated);

    assert_eq!(reloaded.sweep().await.unwrap().as_deref(), Some(tx_id.as_str()));
    assert_eq!(reloaded.state().step, MigrationStep::ProxyTransfer);
    assert_eq!(h.book.for_wallet(&h.original.id).await.len(), 1);
    assert_eq!(h.book.pending_count(&h.original.id).await.unwrap(), 1);
}

/// Migration store whose step moves can be made to fail
struct FlakyMigrations {
    inner: Arc<MemoryStore>,
    fail_update: AtomicBool,
}

#[async_trait]
impl MigrationStore for FlakyMigrations {
    async fn create_migration(&self, new: NewMigration) -> Result<MigrationRecord, StorageError> {
        self.inner.create_migration(new).await
    }

    async fn update_migration_step(
        &self,
        migration_id: &str,
        current_step: MigrationStep,
        status: MigrationStatus,
        new_wallet_id: Option<&str>,
    ) -> Result<MigrationRecord, StorageError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(StorageError::InvalidData("migration store down".to_string()));
        }
        self.inner
            .update_migration_step(migration_id, current_step, status, new_wallet_id)
            .await
    }

    async fn complete_migration(&self, migration_id: &str) -> Result<MigrationRecord, StorageError> {
        self.inner.complete_migration(migration_id).await
    }

    async fn cancel_migration(&self, migration_id: &str) -> Result<MigrationRecord, StorageError> {
        self.inner.cancel_migration(migration_id).await
    }

    async fn get_pending_migrations(&self, owner_address: &str) -> Result<Vec<MigrationRecord>, StorageError> {
        self.inner.get_pending_migrations(owner_address).await
    }

    async fn get_migration(&self, migration_id: &str) -> Result<Option<MigrationRecord>, StorageError> {
        self.inner.get_migration(migration_id).await
    }
}

#[tokio::test]
async fn test_failed_step_move_after_sweep_can_be_retried() {
    let mut h = harness().await;
    h.fund_original().await;
    let migrations = Arc::new(FlakyMigrations {
        inner: h.store.clone(),
        fail_update: AtomicBool::new(false),
    });
    h.services.migrations = migrations.clone() as Arc<dyn MigrationStore>;

    let mut orchestrator = h.mount().await;
    to_fund_transfer(&h, &mut orchestrator).await;

    migrations.fail_update.store(true, Ordering::SeqCst);
    assert!(matches!(orchestrator.sweep().await, Err(MigrationError::Storage(_))));
    assert_eq!(orchestrator.state().step, MigrationStep::FundTransfer);
    assert!(!orchestrator.state().flags.sweep_attempted);
    let sent = h.book.for_wallet(&h.original.id).await;
    assert_eq!(sent.len(), 1);

    migrations.fail_update.store(false, Ordering::SeqCst);
    let tx_id = orchestrator.sweep().await.unwrap().unwrap();
    assert_eq!(tx_id, sent[0].id);
    assert_eq!(orchestrator.state().step, MigrationStep::ProxyTransfer);
    assert_eq!(h.book.for_wallet(&h.original.id).await.len(), 1);
}

#[tokio::test]
async fn test_abort_withdraws_unbroadcast_sweep() {
    let h = harness().await;
    h.fund_original().await;
    let mut orchestrator = h.mount().await;
    let new_wallet = to_fund_transfer(&h, &mut orchestrator).await;

    let original = h.original_now().await;
    let tx_id = sweep::submit_sweep(&h.services, &original, &new_wallet)
        .await
        .unwrap()
        .unwrap();
    drop(orchestrator);

    let mut reloaded = h.mount().await;
    let report = reloaded.abort().await.unwrap();
    assert!(report.is_complete());
    assert!(!report.funds_moved);
    assert_eq!(report.outcome(AbortActionKind::CancelSweep), Some(&ActionOutcome::Done));
    assert_eq!(report.outcome(AbortActionKind::DeleteNewWallet), Some(&ActionOutcome::Done));

    assert!(h.store.get_wallet(ALICE, &new_wallet.id).await.unwrap().is_none());
    assert_eq!(h.book.get(&tx_id).await.unwrap().status, PendingStatus::Expired);
    assert_eq!(h.book.pending_count(&h.original.id).await.unwrap(), 0);
    assert_eq!(reloaded.state().step, MigrationStep::Aborted);
}

#[tokio::test]
async fn test_abort_keeps_wallet_behind_broadcast_sweep() {
    let h = harness().await;
    h.fund_original().await;
    let mut orchestrator = h.mount().await;
    let new_wallet = to_fund_transfer(&h, &mut orchestrator).await;
    let migration_id = orchestrator.state().migration_id.clone().unwrap();

    let tx_id = orchestrator.sweep().await.unwrap().unwrap();
    h.book.sign(&tx_id, ALICE).await.unwrap();
    h.book.sign(&tx_id, BOB).await.unwrap();
    h.book.broadcast(&tx_id).await.unwrap();

    // Broadcast, but the ledger has not caught up yet
    let report = orchestrator.abort().await.unwrap();
    assert!(report.is_complete());
    assert!(report.funds_moved);
    assert!(matches!(
        report.outcome(AbortActionKind::CancelSweep),
        Some(ActionOutcome::Skipped(_))
    ));
    assert!(matches!(
        report.outcome(AbortActionKind::DeleteNewWallet),
        Some(ActionOutcome::Skipped(_))
    ));
    assert_eq!(report.outcome(AbortActionKind::DetachNewWallet), Some(&ActionOutcome::Done));

    let kept = h.store.get_wallet(ALICE, &new_wallet.id).await.unwrap().unwrap();
    assert!(kept.migration_id.is_none());
    assert_eq!(h.wallets_for(&migration_id).await, 0);
    assert_eq!(h.book.get(&tx_id).await.unwrap().status, PendingStatus::Broadcast);
}

#[tokio::test]
async fn test_abort_after_empty_sweep_deletes_wallet() {
    let h = harness().await;
    let mut orchestrator = h.mount().await;
    let new_wallet = to_fund_transfer(&h, &mut orchestrator).await;

    assert_eq!(orchestrator.sweep().await.unwrap(), None);
    assert!(!orchestrator.state().flags.transfer_initiated);
    assert_eq!(orchestrator.state().step, MigrationStep::ProxyTransfer);

    let report = orchestrator.abort().await.unwrap();
    assert!(report.is_complete());
    assert!(!report.funds_moved);
    assert_eq!(report.outcome(AbortActionKind::DeleteNewWallet), Some(&ActionOutcome::Done));
    assert!(h.store.get_wallet(ALICE, &new_wallet.id).await.unwrap().is_none());
    assert!(!orchestrator
        .take_notices()
        .iter()
        .any(|n| n.message.contains("not returned")));
}
