//! Draft → final wallet lifecycle
//!
//! A draft is created as soon as it has a name and a signer so co-signers
//! can follow the invite link and review it. Finalization derives the script
//! once and is never repeated for the same migration: an existing target
//! pointer or wallet for the migration is reused instead.

use crate::core::{DraftWallet, Wallet};
use crate::migration::error::{MigrationError, Rejection};
use crate::migration::orchestrator::Services;
use crate::multisig::{DraftUpdate, Signer, WalletConfig};

/// Result of a draft creation request
#[derive(Debug, Clone, PartialEq)]
pub enum DraftOutcome {
    Created(DraftWallet),
    /// A draft already existed for this migration
    Existing(DraftWallet),
}

impl DraftOutcome {
    pub fn draft(&self) -> &DraftWallet {
        match self {
            DraftOutcome::Created(draft) | DraftOutcome::Existing(draft) => draft,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, DraftOutcome::Created(_))
    }
}

/// Result of finalization
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    Created(Wallet),
    /// An earlier attempt already produced this wallet id
    Reused(String),
}

impl FinalizeOutcome {
    pub fn wallet_id(&self) -> &str {
        match self {
            FinalizeOutcome::Created(wallet) => &wallet.id,
            FinalizeOutcome::Reused(id) => id,
        }
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, FinalizeOutcome::Reused(_))
    }
}

/// Shareable link to a draft
pub fn invite_link(base_url: &str, draft_id: &str) -> String {
    format!("{}/wallets/invite/{}", base_url.trim_end_matches('/'), draft_id)
}

/// Create the migration's draft unless one already exists
pub async fn ensure_draft(
    services: &Services,
    owner_address: &str,
    migration_id: &str,
    config: WalletConfig,
) -> Result<DraftOutcome, MigrationError> {
    if let Some(existing) = services.drafts.find_draft_for_migration(migration_id).await? {
        log::info!("Draft {} already exists for migration {}", existing.id, migration_id);
        return Ok(DraftOutcome::Existing(existing));
    }

    config.validate_for_draft().map_err(Rejection::Invalid)?;
    let draft = services
        .drafts
        .create_new_wallet(owner_address, config, Some(migration_id))
        .await?;
    log::info!("Created draft {} for migration {}", draft.id, migration_id);
    Ok(DraftOutcome::Created(draft))
}

pub async fn update_draft(
    services: &Services,
    draft_id: &str,
    update: DraftUpdate,
) -> Result<DraftWallet, MigrationError> {
    let draft = services.drafts.update_new_wallet(draft_id, update).await?;
    log::debug!("Updated draft {}: {}", draft.id, draft.config.describe_rule());
    Ok(draft)
}

/// Append a collaborator to a draft; joining twice changes nothing
pub async fn join_draft(services: &Services, draft_id: &str, signer: Signer) -> Result<DraftWallet, MigrationError> {
    let draft = services
        .drafts
        .get_new_wallet(draft_id)
        .await?
        .ok_or_else(|| MigrationError::DraftNotFound(draft_id.to_string()))?;

    if draft.config.is_signer(&signer.address) {
        return Ok(draft);
    }

    log::info!("Signer {} joined draft {}", signer.address, draft_id);
    update_draft(services, draft_id, DraftUpdate::AddSigner { signer }).await
}

/// Commit the draft to a final wallet, or reuse the one already committed
pub async fn finalize(
    services: &Services,
    original: &Wallet,
    migration_id: &str,
    draft_id: Option<&str>,
) -> Result<FinalizeOutcome, MigrationError> {
    if let Some(target) = &original.migration_target_wallet_id {
        log::info!("Wallet {} already targets {}; reusing it", original.id, target);
        discard_draft(services, migration_id).await;
        return Ok(FinalizeOutcome::Reused(target.clone()));
    }

    if let Some(existing) = services.wallets.find_wallet_for_migration(migration_id).await? {
        log::info!("Wallet {} already exists for migration {}; reusing it", existing.id, migration_id);
        services.wallets.set_migration_target(&original.id, &existing.id).await?;
        discard_draft(services, migration_id).await;
        return Ok(FinalizeOutcome::Reused(existing.id));
    }

    let draft = match draft_id {
        Some(id) => services.drafts.get_new_wallet(id).await?,
        None => services.drafts.find_draft_for_migration(migration_id).await?,
    }
    .ok_or_else(|| MigrationError::DraftNotFound(draft_id.unwrap_or(migration_id).to_string()))?;

    draft.config.validate().map_err(Rejection::Invalid)?;
    let derived = services.deriver.derive(&draft.config).await?;
    let wallet = services
        .wallets
        .create_wallet(draft.config.clone(), &derived, Some(migration_id))
        .await?;
    log::info!(
        "Finalized {} wallet {} at {}",
        wallet.config.describe_rule(),
        wallet.id,
        wallet.address
    );

    services.wallets.set_migration_target(&original.id, &wallet.id).await?;

    // The wallet exists now; a leftover draft is only clutter
    if let Err(e) = services.drafts.delete_new_wallet(&draft.id).await {
        log::warn!("Could not delete draft {}: {}", draft.id, e);
    }

    Ok(FinalizeOutcome::Created(wallet))
}

async fn discard_draft(services: &Services, migration_id: &str) {
    match services.drafts.find_draft_for_migration(migration_id).await {
        Ok(Some(draft)) => {
            if let Err(e) = services.drafts.delete_new_wallet(&draft.id).await {
                log::warn!("Could not delete draft {}: {}", draft.id, e);
            }
        }
        Ok(None) => {}
        Err(e) => log::warn!("Could not look up draft for migration {}: {}", migration_id, e),
    }
}
