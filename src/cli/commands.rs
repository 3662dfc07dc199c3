//! CLI commands for the migration orchestrator
//!
//! Every migration command mounts the orchestrator afresh, so each
//! invocation resumes from the persisted records.

use crate::config::MigrationConfig;
use crate::core::{format_ada, total_lovelace, Wallet};
use crate::crypto::new_record_id;
use crate::ledger::{FixtureLedger, LedgerQuery};
use crate::migration::{
    AbortReport, ActionOutcome, CompletionStatus, DraftOutcome, FinalizeOutcome, MigrationOrchestrator,
    NoticeLevel, PreCheckReport, PreCheckStatus, Services,
};
use crate::multisig::{DraftUpdate, NativeScriptDeriver, PendingTxBook, ScriptDeriver, Signer, WalletConfig};
use crate::storage::{MemoryStore, Storage, StorageConfig, WalletStore};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Wallet and signer a migration command acts for
#[derive(Debug, Clone)]
pub struct Target {
    pub wallet_id: String,
    pub owner: String,
}

/// Application state
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<FixtureLedger>,
    pub book: Arc<PendingTxBook>,
    pub deriver: Arc<NativeScriptDeriver>,
    pub services: Services,
    pub config: MigrationConfig,
}

impl AppState {
    /// Initialize application state
    pub fn new(config: MigrationConfig, ledger_path: Option<PathBuf>) -> CliResult<Self> {
        let storage = Storage::new(StorageConfig {
            data_dir: config.data_dir.clone(),
            ..Default::default()
        })?;
        let store = Arc::new(MemoryStore::persistent(storage)?);

        let ledger_path = ledger_path.unwrap_or_else(|| config.data_dir.join("ledger.json"));
        let ledger = Arc::new(FixtureLedger::open(&ledger_path)?);
        let book = Arc::new(PendingTxBook::open(Storage::new(StorageConfig {
            data_dir: config.data_dir.clone(),
            store_file: "pending.json".to_string(),
            ..Default::default()
        })?)?);
        let deriver = Arc::new(NativeScriptDeriver::new(config.network));

        let services = Services::with_store(store.clone(), ledger.clone(), deriver.clone(), book.clone());

        Ok(Self {
            store,
            ledger,
            book,
            deriver,
            services,
            config,
        })
    }

    pub async fn mount(&self, target: &Target) -> CliResult<MigrationOrchestrator> {
        let orchestrator = MigrationOrchestrator::mount(
            self.services.clone(),
            self.config.clone(),
            &target.wallet_id,
            &target.owner,
        )
        .await?;
        Ok(orchestrator)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Print and drain orchestrator notices
fn print_notices(orchestrator: &mut MigrationOrchestrator) {
    for notice in orchestrator.take_notices() {
        let icon = match notice.level {
            NoticeLevel::Info => "ℹ️ ",
            NoticeLevel::Warning => "⚠️ ",
            NoticeLevel::Error => "❌",
        };
        println!("{} {}", icon, notice.message);
    }
}

/// Register an existing on-chain wallet from a configuration file
pub async fn cmd_wallet_import(state: &AppState, file: &Path) -> CliResult<()> {
    let config: WalletConfig = read_json(file)?;
    let derived = state.deriver.derive(&config).await?;

    let wallet = Wallet {
        id: new_record_id(&derived.address),
        config,
        script: derived.script,
        address: derived.address,
        stake_address: derived.stake_address,
        drep_id: Some(derived.drep_id),
        migration_id: None,
        migration_target_wallet_id: None,
        archived: false,
        created_at: Utc::now(),
    };
    let wallet = state.store.import_wallet(wallet).await?;

    println!("🔐 Wallet imported!");
    println!("   🆔 ID: {}", wallet.id);
    println!("   🏷️  Name: {} ({})", wallet.name(), wallet.config.describe_rule());
    println!("   📍 Address: {}", wallet.address);
    if let Some(stake) = &wallet.stake_address {
        println!("   🥩 Stake address: {}", stake);
    }
    Ok(())
}

/// Show a wallet and its balance
pub async fn cmd_wallet_show(state: &AppState, owner: &str, wallet_id: &str) -> CliResult<()> {
    let wallet = state
        .store
        .get_wallet(owner, wallet_id)
        .await?
        .ok_or_else(|| format!("wallet {} not found for {}", wallet_id, owner))?;
    let utxos = state.ledger.fetch_address_utxos(&wallet.address).await?;

    println!("👛 {} ({})", wallet.name(), wallet.config.describe_rule());
    println!("   ├─ Address: {}", wallet.address);
    println!("   ├─ UTxOs: {}", utxos.len());
    println!("   ├─ Balance: {} ADA", format_ada(total_lovelace(&utxos)));
    if let Some(target) = &wallet.migration_target_wallet_id {
        println!("   ├─ Migrating to: {}", target);
    }
    println!("   └─ Archived: {}", wallet.archived);
    for signer in &wallet.config.signers {
        println!("      • {} {}", signer.address, signer.description);
    }
    Ok(())
}

/// Start a migration
pub async fn cmd_start(state: &AppState, target: &Target) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let result = orchestrator.start().await;
    print_notices(&mut orchestrator);
    let record = result?;

    println!("🚚 Migration {} started at {}", record.id, record.current_step);
    Ok(())
}

/// Create the record for a wallet left with only a target pointer
pub async fn cmd_continue(state: &AppState, target: &Target) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let result = orchestrator.continue_legacy().await;
    print_notices(&mut orchestrator);
    let record = result?;

    println!("🚚 Migration {} resumed at {}", record.id, record.current_step);
    Ok(())
}

/// Show migration state
pub async fn cmd_status(state: &AppState, target: &Target) -> CliResult<()> {
    let orchestrator = state.mount(target).await?;
    let migration = orchestrator.state();

    println!("📊 Migration status for wallet {}", migration.original_wallet_id);
    match &migration.migration_id {
        Some(id) => {
            println!("   ├─ Migration: {}", id);
            println!("   ├─ Step: {}", migration.step);
            println!("   ├─ Status: {}", migration.status);
            if let Some(draft_id) = &migration.draft_id {
                println!("   ├─ Draft: {}", draft_id);
            }
            if let Some(link) = orchestrator.invite_link() {
                println!("   ├─ Invite: {}", link);
            }
            println!(
                "   └─ New wallet: {}",
                migration.new_wallet_id.as_deref().unwrap_or("-")
            );
        }
        None if migration.can_continue_legacy() => {
            println!(
                "   └─ Wallet points at {} without a migration record; run `continue`",
                migration.legacy_target_wallet_id.as_deref().unwrap_or("-")
            );
        }
        None => println!("   └─ No migration in progress"),
    }
    Ok(())
}

fn print_pre_checks(report: &PreCheckReport) {
    for (kind, result) in report.iter() {
        let icon = match result.status {
            PreCheckStatus::Loading => "⏳",
            PreCheckStatus::Success => "✅",
            PreCheckStatus::Warning => "⚠️ ",
            PreCheckStatus::Error => "❌",
        };
        println!("   {} {}: {}", icon, kind, result.message);
        if let Some(details) = &result.details {
            println!("      {}", details);
        }
    }
}

/// Run the pre-checks and advance when they pass
pub async fn cmd_precheck(state: &AppState, target: &Target) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;

    println!("🔎 Running pre-checks...");
    let report = orchestrator.run_pre_checks().await?;
    print_pre_checks(&report);

    if !report.is_ready() {
        println!("\n⛔ Resolve the errors above and run the checks again");
        return Ok(());
    }

    // The orchestrator checks again before it moves on
    let result = orchestrator.confirm_pre_checks().await;
    print_notices(&mut orchestrator);
    result?;
    println!("\n➡️  Continue to wallet creation");
    Ok(())
}

/// Create the temporary wallet
pub async fn cmd_draft_create(state: &AppState, target: &Target, file: &Path) -> CliResult<()> {
    let config: WalletConfig = read_json(file)?;
    let mut orchestrator = state.mount(target).await?;
    let result = orchestrator.create_draft(config).await;
    print_notices(&mut orchestrator);

    match result? {
        Some(DraftOutcome::Created(draft)) => println!("📝 Draft {} created", draft.id),
        Some(DraftOutcome::Existing(draft)) => println!("📝 Draft {} already exists", draft.id),
        None => println!("📝 Nothing to create"),
    }
    if let Some(link) = orchestrator.invite_link() {
        println!("   🔗 Invite: {}", link);
    }
    Ok(())
}

/// Apply an edit to the draft
pub async fn cmd_draft_update(state: &AppState, target: &Target, file: &Path) -> CliResult<()> {
    let update: DraftUpdate = read_json(file)?;
    let mut orchestrator = state.mount(target).await?;
    let draft = orchestrator.update_draft(update).await?;
    println!("📝 Draft {} now {}", draft.id, draft.config.describe_rule());
    Ok(())
}

/// Add a co-signer to the draft
pub async fn cmd_draft_join(state: &AppState, target: &Target, address: &str, description: &str) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let draft = orchestrator.join_draft(Signer::new(address, description)).await?;
    println!("🤝 {} is a signer of draft {} ({})", address, draft.id, draft.config.describe_rule());
    Ok(())
}

/// Show the draft
pub async fn cmd_draft_show(state: &AppState, target: &Target) -> CliResult<()> {
    let orchestrator = state.mount(target).await?;
    let Some(draft) = orchestrator.draft().await? else {
        println!("📝 No draft for this migration");
        return Ok(());
    };

    println!("📝 Draft {}: {} ({})", draft.id, draft.config.name, draft.config.describe_rule());
    for (i, signer) in draft.config.signers.iter().enumerate() {
        println!("   {}. {} {}", i, signer.address, signer.description);
    }
    if let Some(link) = orchestrator.invite_link() {
        println!("   🔗 Invite: {}", link);
    }
    Ok(())
}

/// Commit the draft to the new wallet
pub async fn cmd_finalize(state: &AppState, target: &Target) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let result = orchestrator.finalize().await;
    print_notices(&mut orchestrator);

    match result? {
        Some(FinalizeOutcome::Created(wallet)) => {
            println!("🔐 New wallet {} created", wallet.id);
            println!("   📍 Address: {}", wallet.address);
        }
        Some(FinalizeOutcome::Reused(id)) => println!("🔐 Reusing wallet {}", id),
        None => println!("🔐 Finalization already in progress"),
    }
    println!("   ➡️  Next step: {}", orchestrator.state().step);
    Ok(())
}

/// Register a proxy for the new wallet
pub async fn cmd_proxy_register(
    state: &AppState,
    target: &Target,
    address: &str,
    param_ref: &str,
    description: &str,
) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let proxy = orchestrator.register_proxy(address, param_ref, description).await?;
    println!("🗳️  Proxy {} registered for wallet {}", proxy.proxy_address, proxy.wallet_id);
    Ok(())
}

pub async fn cmd_proxy_setup_done(state: &AppState, target: &Target) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let result = orchestrator.finish_proxy_setup().await;
    print_notices(&mut orchestrator);
    result?;
    println!("➡️  Next step: {}", orchestrator.state().step);
    Ok(())
}

pub async fn cmd_proxy_transfer(state: &AppState, target: &Target) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let result = orchestrator.transfer_proxies().await;
    print_notices(&mut orchestrator);
    let moved = result?;
    println!("🗳️  {} proxies moved; next step: {}", moved, orchestrator.state().step);
    Ok(())
}

/// Sweep every UTxO to the new wallet
pub async fn cmd_sweep(state: &AppState, target: &Target) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let result = orchestrator.sweep().await;
    print_notices(&mut orchestrator);

    match result? {
        Some(tx_id) => {
            let tx = state.book.get(&tx_id).await;
            println!("💸 Sweep {} awaiting signatures", tx_id);
            if let Some(tx) = tx {
                println!("   ├─ Inputs: {}", tx.inputs.len());
                println!("   ├─ Value: {} ADA", format_ada(total_lovelace(&tx.inputs)));
                println!("   └─ Change to: {}", tx.change_address);
            }
        }
        None => println!("💸 Nothing to sweep"),
    }
    Ok(())
}

/// Co-sign a pending transaction
pub async fn cmd_tx_sign(state: &AppState, tx_id: &str, signer: &str) -> CliResult<()> {
    let tx = state.book.sign(tx_id, signer).await?;
    println!(
        "✍️  {} signed {} ({}/{})",
        signer,
        tx_id,
        tx.signed_by.len(),
        tx.threshold
    );
    Ok(())
}

/// Broadcast a fully signed transaction to the fixture ledger
pub async fn cmd_tx_broadcast(state: &AppState, tx_id: &str) -> CliResult<()> {
    let tx = state.book.broadcast(tx_id).await?;
    state.ledger.apply_sweep(&tx).await?;
    println!("📡 {} broadcast", tx_id);
    Ok(())
}

fn print_completion(status: &CompletionStatus) {
    let icon = if status.can_complete() { "✅" } else { "⏳" };
    println!(
        "   {} UTxOs: {}, pending: {}, residual: {} ADA ({})",
        icon,
        status.utxo_count,
        status.pending_count,
        status.residual_ada(),
        status.checked_at.format("%H:%M:%S")
    );
}

/// Show, or wait for, the completion gate
pub async fn cmd_completion(state: &AppState, target: &Target, watch: bool) -> CliResult<()> {
    let orchestrator = state.mount(target).await?;

    println!("🔎 Original wallet status:");
    let status = if watch {
        orchestrator.watch_completion(print_completion).await?
    } else {
        let status = orchestrator.completion_status().await?;
        print_completion(&status);
        status
    };

    if status.can_complete() {
        println!("➡️  Ready to complete the migration");
    }
    Ok(())
}

/// Archive the original wallet
pub async fn cmd_complete(state: &AppState, target: &Target) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let result = orchestrator.complete().await;
    print_notices(&mut orchestrator);
    let record = result?;
    println!("🎉 Migration {} {}", record.id, record.status);
    Ok(())
}

fn print_abort(report: &AbortReport) {
    for action in &report.actions {
        match &action.outcome {
            ActionOutcome::Done => println!("   ✅ {}", action.kind),
            ActionOutcome::Skipped(reason) => println!("   ➖ {} ({})", action.kind, reason),
            ActionOutcome::Failed(reason) => println!("   ❌ {}: {}", action.kind, reason),
        }
    }
}

/// Abort and roll back
pub async fn cmd_abort(state: &AppState, target: &Target) -> CliResult<()> {
    let mut orchestrator = state.mount(target).await?;
    let result = orchestrator.abort().await;
    print_notices(&mut orchestrator);
    let report = result?;

    println!("🛑 Abort report:");
    print_abort(&report);
    if !report.is_complete() {
        println!("\n⚠️  Run abort again to retry the failed actions");
    }
    Ok(())
}
