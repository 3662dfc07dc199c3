//! Proxy setup and reassignment
//!
//! Reassignment rebinds registry entries only; proxy contract addresses never
//! change.

use crate::core::Proxy;
use crate::migration::error::MigrationError;
use crate::migration::orchestrator::Services;

pub async fn has_proxies(services: &Services, wallet_id: &str) -> Result<bool, MigrationError> {
    Ok(!services.proxies.get_proxies_by_wallet(wallet_id).await?.is_empty())
}

pub async fn register_proxy(
    services: &Services,
    wallet_id: &str,
    proxy_address: &str,
    param_ref: &str,
    description: &str,
) -> Result<Proxy, MigrationError> {
    let proxy = services
        .proxies
        .create_proxy(wallet_id, proxy_address, param_ref, description)
        .await?;
    log::info!("Registered proxy {} for wallet {}", proxy.proxy_address, wallet_id);
    Ok(proxy)
}

/// Move every proxy of `from_wallet_id` to `to_wallet_id`; a wallet without
/// proxies is a no-op
pub async fn transfer(services: &Services, from_wallet_id: &str, to_wallet_id: &str) -> Result<usize, MigrationError> {
    if !has_proxies(services, from_wallet_id).await? {
        log::info!("Wallet {} has no proxies to transfer", from_wallet_id);
        return Ok(0);
    }

    let moved = services.proxies.transfer_proxies(from_wallet_id, to_wallet_id).await?;
    log::info!("Moved {} proxies from {} to {}", moved, from_wallet_id, to_wallet_id);
    Ok(moved)
}
