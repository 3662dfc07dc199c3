//! Fund sweep
//!
//! Every UTxO at the original address becomes an input and the only output
//! is change to the new wallet, so the whole value moves without per-asset
//! accounting.

use crate::core::{format_ada, total_lovelace, Wallet};
use crate::migration::error::MigrationError;
use crate::migration::orchestrator::Services;
use crate::multisig::SweepTransaction;

/// Build the sweep from the original's current UTxO set
pub async fn build_sweep(
    services: &Services,
    original: &Wallet,
    new_wallet: &Wallet,
) -> Result<SweepTransaction, MigrationError> {
    let utxos = services.ledger.fetch_address_utxos(&original.address).await?;
    if utxos.is_empty() {
        return Err(MigrationError::NothingToSweep(original.address.clone()));
    }
    Ok(SweepTransaction::new(original, utxos, &new_wallet.address)?)
}

/// Build the sweep and hand it to the signers
///
/// A sweep into `new_wallet` that is already in flight is reused rather than
/// built again. Returns `None` when the original address holds nothing.
pub async fn submit_sweep(
    services: &Services,
    original: &Wallet,
    new_wallet: &Wallet,
) -> Result<Option<String>, MigrationError> {
    if let Some(existing) = services
        .transactions
        .find_sweep(&original.id, &new_wallet.address)
        .await?
    {
        log::info!(
            "Sweep {} to {} already submitted ({:?})",
            existing.id,
            new_wallet.address,
            existing.status
        );
        return Ok(Some(existing.id));
    }

    let tx = match build_sweep(services, original, new_wallet).await {
        Ok(tx) => tx,
        Err(MigrationError::NothingToSweep(address)) => {
            log::warn!("No UTxOs at {}; skipping sweep", address);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let inputs = tx.inputs.len();
    let lovelace = total_lovelace(&tx.inputs);
    let tx_id = services.transactions.submit_sweep(tx).await?;
    log::info!(
        "Sweep {} submitted: {} inputs, {} ADA to {}",
        tx_id,
        inputs,
        format_ada(lovelace),
        new_wallet.address
    );
    Ok(Some(tx_id))
}
