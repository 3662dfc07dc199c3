//! Fixture-backed ledger
//!
//! Serves ledger state from a JSON document. Broadcast sweeps can be applied
//! to the fixture so a whole migration can be walked through offline.

use crate::core::{ProxyDrepStatus, Utxo};
use crate::ledger::query::{AccountStatus, DrepRegistration, LedgerError, LedgerQuery};
use crate::multisig::SweepTransaction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;

/// Ledger state as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgerFixture {
    /// Outputs by address
    #[serde(default)]
    pub utxos: HashMap<String, Vec<Utxo>>,
    /// Stake accounts by stake address
    #[serde(default)]
    pub accounts: HashMap<String, AccountStatus>,
    /// DRep registrations by DRep id
    #[serde(default)]
    pub dreps: HashMap<String, DrepRegistration>,
    /// Proxy governance status by proxy address
    #[serde(default)]
    pub proxies: HashMap<String, ProxyDrepStatus>,
    /// Artificial latency added to every query
    #[serde(default)]
    pub latency_ms: u64,
    /// Make every query fail as if the ledger were down
    #[serde(default)]
    pub offline: bool,
}

/// Ledger backed by a [`LedgerFixture`]
#[derive(Debug, Default)]
pub struct FixtureLedger {
    state: RwLock<LedgerFixture>,
    path: Option<PathBuf>,
}

impl FixtureLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: LedgerFixture) -> Self {
        Self {
            state: RwLock::new(fixture),
            path: None,
        }
    }

    /// Load a fixture file; a missing file starts an empty ledger
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let fixture = if path.exists() {
            let data = fs::read_to_string(path).map_err(|e| LedgerError::Unreachable(e.to_string()))?;
            serde_json::from_str(&data).map_err(|e| LedgerError::Query(e.to_string()))?
        } else {
            LedgerFixture::default()
        };
        Ok(Self {
            state: RwLock::new(fixture),
            path: Some(path.to_path_buf()),
        })
    }

    fn save(&self, fixture: &LedgerFixture) -> Result<(), LedgerError> {
        if let Some(path) = &self.path {
            let data =
                serde_json::to_string_pretty(fixture).map_err(|e| LedgerError::Query(e.to_string()))?;
            fs::write(path, data).map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        }
        Ok(())
    }

    /// Replace the outputs held at an address
    pub async fn set_utxos(&self, address: &str, utxos: Vec<Utxo>) {
        self.state.write().await.utxos.insert(address.to_string(), utxos);
    }

    pub async fn set_account(&self, stake_address: &str, status: AccountStatus) {
        self.state
            .write()
            .await
            .accounts
            .insert(stake_address.to_string(), status);
    }

    pub async fn set_drep(&self, drep_id: &str, active: bool) {
        self.state
            .write()
            .await
            .dreps
            .insert(drep_id.to_string(), DrepRegistration { active });
    }

    pub async fn set_proxy_status(&self, proxy_address: &str, registered: bool) {
        self.state
            .write()
            .await
            .proxies
            .insert(proxy_address.to_string(), ProxyDrepStatus { registered });
    }

    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency_ms = latency.as_millis() as u64;
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    /// Apply a broadcast sweep: its inputs disappear and one output carrying
    /// the full value appears at the change address
    pub async fn apply_sweep(&self, tx: &SweepTransaction) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;

        if let Some(held) = state.utxos.get_mut(&tx.from_address) {
            held.retain(|u| !tx.inputs.contains(u));
        }

        let output = Utxo {
            tx_hash: tx.id.clone(),
            output_index: 0,
            address: tx.change_address.clone(),
            amount: tx.change_value(),
        };
        state
            .utxos
            .entry(tx.change_address.clone())
            .or_default()
            .push(output);

        self.save(&state)
    }

    /// Simulate latency and outages before answering
    async fn gate(&self) -> Result<(), LedgerError> {
        let (latency_ms, offline) = {
            let state = self.state.read().await;
            (state.latency_ms, state.offline)
        };
        if latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        }
        if offline {
            return Err(LedgerError::Unreachable("ledger offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerQuery for FixtureLedger {
    async fn fetch_address_utxos(&self, address: &str) -> Result<Vec<Utxo>, LedgerError> {
        self.gate().await?;
        Ok(self
            .state
            .read()
            .await
            .utxos
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_account_status(&self, stake_address: &str) -> Result<AccountStatus, LedgerError> {
        self.gate().await?;
        Ok(self
            .state
            .read()
            .await
            .accounts
            .get(stake_address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_drep_registration(&self, drep_id: &str) -> Result<DrepRegistration, LedgerError> {
        self.gate().await?;
        Ok(self
            .state
            .read()
            .await
            .dreps
            .get(drep_id)
            .copied()
            .unwrap_or_default())
    }

    async fn get_proxy_drep_status(&self, proxy_address: &str) -> Result<ProxyDrepStatus, LedgerError> {
        self.gate().await?;
        Ok(self
            .state
            .read()
            .await
            .proxies
            .get(proxy_address)
            .copied()
            .unwrap_or_default())
    }
}
