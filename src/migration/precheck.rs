//! Pre-migration readiness checks
//!
//! The DRep, staking and pending-transaction checks run concurrently and each
//! resolves into its own [`PreCheckResult`]. Readiness needs all three
//! resolved and none in error; warnings are surfaced but do not block.

use crate::core::Wallet;
use crate::ledger::LedgerError;
use crate::migration::orchestrator::Services;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;

/// Outcome class of one check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreCheckStatus {
    Loading,
    Success,
    Warning,
    Error,
}

/// Result of one check; recomputed on every run, never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreCheckResult {
    pub status: PreCheckStatus,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl PreCheckResult {
    pub fn loading() -> Self {
        Self::new(PreCheckStatus::Loading, "Checking...")
    }

    fn new(status: PreCheckStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    fn success(message: impl Into<String>) -> Self {
        Self::new(PreCheckStatus::Success, message)
    }

    fn warning(message: impl Into<String>) -> Self {
        Self::new(PreCheckStatus::Warning, message)
    }

    fn error(message: impl Into<String>) -> Self {
        Self::new(PreCheckStatus::Error, message)
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.status != PreCheckStatus::Loading
    }
}

/// The three readiness checks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PreCheckKind {
    Drep,
    Staking,
    PendingTransactions,
}

impl fmt::Display for PreCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PreCheckKind::Drep => "DRep",
            PreCheckKind::Staking => "Staking",
            PreCheckKind::PendingTransactions => "Pending transactions",
        };
        f.write_str(name)
    }
}

/// Combined pre-check results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreCheckReport {
    pub drep: PreCheckResult,
    pub staking: PreCheckResult,
    pub pending_transactions: PreCheckResult,
}

impl Default for PreCheckReport {
    fn default() -> Self {
        Self {
            drep: PreCheckResult::loading(),
            staking: PreCheckResult::loading(),
            pending_transactions: PreCheckResult::loading(),
        }
    }
}

impl PreCheckReport {
    pub fn get(&self, kind: PreCheckKind) -> &PreCheckResult {
        match kind {
            PreCheckKind::Drep => &self.drep,
            PreCheckKind::Staking => &self.staking,
            PreCheckKind::PendingTransactions => &self.pending_transactions,
        }
    }

    pub fn set(&mut self, kind: PreCheckKind, result: PreCheckResult) {
        match kind {
            PreCheckKind::Drep => self.drep = result,
            PreCheckKind::Staking => self.staking = result,
            PreCheckKind::PendingTransactions => self.pending_transactions = result,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PreCheckKind, &PreCheckResult)> {
        [
            PreCheckKind::Drep,
            PreCheckKind::Staking,
            PreCheckKind::PendingTransactions,
        ]
        .into_iter()
        .map(move |kind| (kind, self.get(kind)))
    }

    pub fn all_resolved(&self) -> bool {
        self.iter().all(|(_, r)| r.is_resolved())
    }

    pub fn has_error(&self) -> bool {
        self.iter().any(|(_, r)| r.status == PreCheckStatus::Error)
    }

    /// Continue to wallet creation is allowed
    pub fn is_ready(&self) -> bool {
        self.all_resolved() && !self.has_error()
    }

    pub fn warnings(&self) -> Vec<(PreCheckKind, &PreCheckResult)> {
        self.iter()
            .filter(|(_, r)| r.status == PreCheckStatus::Warning)
            .collect()
    }

    /// Kinds blocking progression, for error messages
    pub fn blockers(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, r)| r.status != PreCheckStatus::Success && r.status != PreCheckStatus::Warning)
            .map(|(kind, r)| format!("{}: {}", kind, r.message))
            .collect()
    }
}

/// DRep check
///
/// A direct DRep registration cannot move with the wallet, so it must be
/// retired first. Proxy DReps are rebound and do not block.
pub async fn check_drep(services: &Services, wallet: &Wallet, lookup_timeout: Duration) -> PreCheckResult {
    if let Some(drep_id) = &wallet.drep_id {
        match timed(lookup_timeout, services.ledger.get_drep_registration(drep_id)).await {
            Ok(registration) if registration.active => {
                return PreCheckResult::error("Wallet is registered as a DRep")
                    .with_details("Retire the DRep registration before migrating; direct DRep keys cannot be transferred");
            }
            Ok(_) => {}
            Err(e) => return PreCheckResult::error("Could not check DRep registration").with_details(e.to_string()),
        }
    }

    let proxies = match services.proxies.get_proxies_by_wallet(&wallet.id).await {
        Ok(proxies) => proxies,
        Err(e) => return PreCheckResult::error("Could not load proxies").with_details(e.to_string()),
    };

    for proxy in &proxies {
        match timed(lookup_timeout, services.ledger.get_proxy_drep_status(&proxy.proxy_address)).await {
            Ok(status) if status.registered => {
                return PreCheckResult::success("DRep is registered through a proxy")
                    .with_details("The proxy will be reassigned to the new wallet");
            }
            Ok(_) => {}
            Err(e) => {
                return PreCheckResult::error("Could not check proxy DRep status")
                    .with_details(format!("{}: {}", proxy.proxy_address, e));
            }
        }
    }

    PreCheckResult::success("No DRep registration")
}

/// Staking check
pub async fn check_staking(services: &Services, wallet: &Wallet, lookup_timeout: Duration) -> PreCheckResult {
    let stake_address = match services.deriver.resolve_stake_address(&wallet.config).await {
        Ok(Some(address)) => address,
        Ok(None) => return PreCheckResult::success("Wallet has no stake credential"),
        Err(e) => return PreCheckResult::error("Could not resolve stake address").with_details(e.to_string()),
    };

    match timed(lookup_timeout, services.ledger.get_account_status(&stake_address)).await {
        Ok(account) if account.active => match account.pool_id {
            Some(pool_id) => PreCheckResult::warning("Stake is delegated to a pool")
                .with_details(format!("Re-delegate the new wallet to {} after migrating", pool_id)),
            None => PreCheckResult::success("Stake address registered without delegation"),
        },
        Ok(_) => PreCheckResult::success("Stake address not registered"),
        Err(e) => PreCheckResult::error("Could not query stake account").with_details(e.to_string()),
    }
}

/// Pending multisig transaction check
pub async fn check_pending(services: &Services, wallet: &Wallet) -> PreCheckResult {
    match services.transactions.pending_count(&wallet.id).await {
        Ok(0) => PreCheckResult::success("No pending transactions"),
        Ok(n) => PreCheckResult::warning(format!("{} pending transactions", n))
            .with_details("Sign or let them expire before sweeping funds"),
        Err(e) => PreCheckResult::error("Could not count pending transactions").with_details(e.to_string()),
    }
}

async fn timed<T, F>(limit: Duration, fut: F) -> Result<T, LedgerError>
where
    F: std::future::Future<Output = Result<T, LedgerError>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(limit.as_secs())),
    }
}

/// Run all checks concurrently, reporting each result as it resolves
pub async fn run_with_updates<F>(
    services: &Services,
    wallet: &Wallet,
    lookup_timeout: Duration,
    mut on_update: F,
) -> PreCheckReport
where
    F: FnMut(PreCheckKind, &PreCheckResult),
{
    // Outer bound in case a check makes several lookups
    let overall = lookup_timeout * 3;

    let mut pending: FuturesUnordered<BoxFuture<'_, (PreCheckKind, PreCheckResult)>> = FuturesUnordered::new();
    pending.push(Box::pin(async move {
        let result = bounded(overall, check_drep(services, wallet, lookup_timeout)).await;
        (PreCheckKind::Drep, result)
    }));
    pending.push(Box::pin(async move {
        let result = bounded(overall, check_staking(services, wallet, lookup_timeout)).await;
        (PreCheckKind::Staking, result)
    }));
    pending.push(Box::pin(async move {
        let result = bounded(lookup_timeout, check_pending(services, wallet)).await;
        (PreCheckKind::PendingTransactions, result)
    }));

    let mut report = PreCheckReport::default();
    while let Some((kind, result)) = pending.next().await {
        log::debug!("Pre-check {} resolved: {:?}", kind, result.status);
        on_update(kind, &result);
        report.set(kind, result);
    }

    log::info!(
        "Pre-checks for wallet {} finished (ready: {})",
        wallet.id,
        report.is_ready()
    );
    report
}

/// Run all checks and collect the report
pub async fn run(services: &Services, wallet: &Wallet, lookup_timeout: Duration) -> PreCheckReport {
    run_with_updates(services, wallet, lookup_timeout, |_, _| {}).await
}

async fn bounded<F>(limit: Duration, fut: F) -> PreCheckResult
where
    F: std::future::Future<Output = PreCheckResult>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => PreCheckResult::error("Check timed out")
            .with_details(format!("No answer within {}s", limit.as_secs())),
    }
}
