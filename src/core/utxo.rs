//! Unspent transaction outputs as reported by the ledger

use serde::{Deserialize, Serialize};

/// Unit name of the native currency
pub const LOVELACE: &str = "lovelace";

/// Lovelace per ADA
pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// A quantity of one asset held by an output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    /// `lovelace` or policy id + asset name
    pub unit: String,
    pub quantity: u64,
}

impl Asset {
    pub fn lovelace(quantity: u64) -> Self {
        Self {
            unit: LOVELACE.to_string(),
            quantity,
        }
    }
}

/// An unspent output sitting at an address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Utxo {
    pub tx_hash: String,
    pub output_index: u32,
    pub address: String,
    pub amount: Vec<Asset>,
}

impl Utxo {
    /// Create an output holding only lovelace
    pub fn ada_only(
        tx_hash: impl Into<String>,
        output_index: u32,
        address: impl Into<String>,
        lovelace: u64,
    ) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            output_index,
            address: address.into(),
            amount: vec![Asset::lovelace(lovelace)],
        }
    }

    /// `tx_hash#index` reference
    pub fn outpoint(&self) -> String {
        format!("{}#{}", self.tx_hash, self.output_index)
    }

    /// Lovelace carried by this output
    pub fn lovelace(&self) -> u64 {
        self.amount
            .iter()
            .filter(|a| a.unit == LOVELACE)
            .map(|a| a.quantity)
            .sum()
    }
}

/// Total lovelace across a set of outputs
pub fn total_lovelace(utxos: &[Utxo]) -> u64 {
    utxos.iter().map(Utxo::lovelace).sum()
}

/// Render lovelace as ADA with six decimals, e.g. `12.500000`
pub fn format_ada(lovelace: u64) -> String {
    format!(
        "{}.{:06}",
        lovelace / LOVELACE_PER_ADA,
        lovelace % LOVELACE_PER_ADA
    )
}
