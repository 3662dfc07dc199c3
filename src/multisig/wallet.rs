//! Multi-signature wallet configuration
//!
//! A [`WalletConfig`] is the signer set and threshold rule that a draft
//! collects agreement on and that a final wallet freezes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to multisig configuration and derivation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MultisigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Wallet name is required")]
    MissingName,
    #[error("At least one signer is required")]
    NoSigners,
    #[error("Duplicate signer address: {0}")]
    DuplicateSigner(String),
    #[error("Signer index {index} out of range ({count} signers)")]
    SignerOutOfRange { index: usize, count: usize },
    #[error("Script derivation failed: {0}")]
    Derivation(String),
    #[error("Sweep has no inputs")]
    NoInputs,
    #[error("Input {0} is not held by the sweeping wallet")]
    ForeignInput(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Signer not authorized: {0}")]
    UnauthorizedSigner(String),
    #[error("Already signed by this signer")]
    AlreadySigned,
    #[error("Transaction submission failed: {0}")]
    Submission(String),
    #[error("Transaction already broadcast: {0}")]
    AlreadyBroadcast(String),
    #[error("Pending transaction book: {0}")]
    Book(String),
}

/// Spending rule of a native multisig script
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    /// Every signer must sign
    All,
    /// Any single signer suffices
    Any,
    /// `num_required_signers` of N
    #[default]
    AtLeast,
}

/// One participant of a multisig wallet
///
/// Address, description, stake key and DRep key travel together so the
/// per-signer columns can never drift out of step.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signer {
    /// Payment address of the signer
    pub address: String,
    /// Free-form label
    #[serde(default)]
    pub description: String,
    /// Stake key hash contributed by the signer, if any
    #[serde(default)]
    pub stake_key: Option<String>,
    /// DRep key hash contributed by the signer, if any
    #[serde(default)]
    pub drep_key: Option<String>,
}

impl Signer {
    pub fn new(address: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            description: description.into(),
            stake_key: None,
            drep_key: None,
        }
    }

    pub fn with_stake_key(mut self, stake_key: impl Into<String>) -> Self {
        self.stake_key = Some(stake_key.into());
        self
    }

    pub fn with_drep_key(mut self, drep_key: impl Into<String>) -> Self {
        self.drep_key = Some(drep_key.into());
        self
    }
}

/// Configuration for a multisig wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub signers: Vec<Signer>,
    /// Minimum signatures required (M in M-of-N) for `AtLeast` scripts
    pub num_required_signers: u32,
    #[serde(default)]
    pub script_type: ScriptType,
    /// External stake credential hash overriding the signers' stake keys
    #[serde(default)]
    pub stake_credential_hash: Option<String>,
}

/// A single mutation a collaborator may apply to a draft configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DraftUpdate {
    Rename { name: String, description: String },
    AddSigner { signer: Signer },
    RemoveSigner { index: usize },
    UpdateSigner { index: usize, description: String },
    SetThreshold { required: u32 },
    SetScriptType { script_type: ScriptType },
    SetStakeCredential { hash: Option<String> },
}

impl WalletConfig {
    /// Create a configuration with an `AtLeast` rule
    pub fn new(name: impl Into<String>, signers: Vec<Signer>, num_required_signers: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            signers,
            num_required_signers,
            script_type: ScriptType::AtLeast,
            stake_credential_hash: None,
        }
    }

    /// Get the total signer count (N)
    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }

    /// Signatures actually needed to spend under the script type
    pub fn effective_threshold(&self) -> u32 {
        match self.script_type {
            ScriptType::All => self.signers.len() as u32,
            ScriptType::Any => 1,
            ScriptType::AtLeast => self.num_required_signers,
        }
    }

    pub fn signer_addresses(&self) -> Vec<&str> {
        self.signers.iter().map(|s| s.address.as_str()).collect()
    }

    pub fn signer_descriptions(&self) -> Vec<&str> {
        self.signers.iter().map(|s| s.description.as_str()).collect()
    }

    pub fn signer_stake_keys(&self) -> Vec<Option<&str>> {
        self.signers.iter().map(|s| s.stake_key.as_deref()).collect()
    }

    pub fn signer_drep_keys(&self) -> Vec<Option<&str>> {
        self.signers.iter().map(|s| s.drep_key.as_deref()).collect()
    }

    /// Check if an address belongs to one of the signers
    pub fn is_signer(&self, address: &str) -> bool {
        self.signers.iter().any(|s| s.address == address)
    }

    /// Get description like "2-of-3"
    pub fn describe_rule(&self) -> String {
        match self.script_type {
            ScriptType::All => format!("all-of-{}", self.signers.len()),
            ScriptType::Any => format!("any-of-{}", self.signers.len()),
            ScriptType::AtLeast => format!("{}-of-{}", self.num_required_signers, self.signers.len()),
        }
    }

    /// Minimum needed before a draft (and its invite link) may exist
    pub fn validate_for_draft(&self) -> Result<(), MultisigError> {
        if self.name.trim().is_empty() {
            return Err(MultisigError::MissingName);
        }
        if self.signers.is_empty() {
            return Err(MultisigError::NoSigners);
        }
        Ok(())
    }

    /// Full validation required before a script can be derived
    pub fn validate(&self) -> Result<(), MultisigError> {
        self.validate_for_draft()?;

        if self.script_type == ScriptType::AtLeast {
            if self.num_required_signers == 0 {
                return Err(MultisigError::InvalidThreshold(
                    "threshold must be at least 1".to_string(),
                ));
            }
            if self.num_required_signers as usize > self.signers.len() {
                return Err(MultisigError::InvalidThreshold(format!(
                    "threshold {} exceeds signer count {}",
                    self.num_required_signers,
                    self.signers.len()
                )));
            }
        }

        // Check for duplicates
        let mut sorted: Vec<&str> = self.signer_addresses();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                return Err(MultisigError::DuplicateSigner(pair[0].to_string()));
            }
        }

        Ok(())
    }

    /// Apply a collaborator's mutation
    ///
    /// After a removal the threshold is clamped into `1..=N`.
    pub fn apply(&mut self, update: DraftUpdate) -> Result<(), MultisigError> {
        match update {
            DraftUpdate::Rename { name, description } => {
                if name.trim().is_empty() {
                    return Err(MultisigError::MissingName);
                }
                self.name = name;
                self.description = description;
            }
            DraftUpdate::AddSigner { signer } => {
                if self.is_signer(&signer.address) {
                    return Err(MultisigError::DuplicateSigner(signer.address));
                }
                self.signers.push(signer);
            }
            DraftUpdate::RemoveSigner { index } => {
                self.check_index(index)?;
                self.signers.remove(index);
                let max = self.signers.len().max(1) as u32;
                self.num_required_signers = self.num_required_signers.clamp(1, max);
            }
            DraftUpdate::UpdateSigner { index, description } => {
                self.check_index(index)?;
                self.signers[index].description = description;
            }
            DraftUpdate::SetThreshold { required } => {
                if required == 0 || required as usize > self.signers.len() {
                    return Err(MultisigError::InvalidThreshold(format!(
                        "threshold {} outside 1..={}",
                        required,
                        self.signers.len()
                    )));
                }
                self.num_required_signers = required;
            }
            DraftUpdate::SetScriptType { script_type } => {
                self.script_type = script_type;
            }
            DraftUpdate::SetStakeCredential { hash } => {
                self.stake_credential_hash = hash.filter(|h| !h.trim().is_empty());
            }
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), MultisigError> {
        if index >= self.signers.len() {
            return Err(MultisigError::SignerOutOfRange {
                index,
                count: self.signers.len(),
            });
        }
        Ok(())
    }
}
