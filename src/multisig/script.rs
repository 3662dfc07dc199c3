//! Script derivation seam
//!
//! Turning signers and a threshold rule into a spending script and address is
//! delegated to a [`ScriptDeriver`]. [`NativeScriptDeriver`] is a deterministic
//! reference implementation built on HASH160 key hashes and Base58Check
//! addresses.

use crate::crypto::{hash160, sha256};
use crate::multisig::wallet::{MultisigError, ScriptType, WalletConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Network the derived addresses belong to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
}

impl Network {
    /// Header byte of an enterprise address with a script payment credential
    fn payment_header(&self) -> u8 {
        match self {
            Network::Mainnet => 0x71,
            Network::Testnet => 0x70,
        }
    }

    /// Header byte of a reward address with a script stake credential
    fn stake_header(&self) -> u8 {
        match self {
            Network::Mainnet => 0xF1,
            Network::Testnet => 0xF0,
        }
    }
}

/// Native multisig script tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NativeScript {
    Sig { key_hash: String },
    All { scripts: Vec<NativeScript> },
    Any { scripts: Vec<NativeScript> },
    AtLeast { required: u32, scripts: Vec<NativeScript> },
}

impl NativeScript {
    /// Build the script for a set of key hashes under a rule
    pub fn from_rule(script_type: ScriptType, required: u32, key_hashes: Vec<String>) -> Self {
        let scripts = key_hashes
            .into_iter()
            .map(|key_hash| NativeScript::Sig { key_hash })
            .collect();
        match script_type {
            ScriptType::All => NativeScript::All { scripts },
            ScriptType::Any => NativeScript::Any { scripts },
            ScriptType::AtLeast => NativeScript::AtLeast { required, scripts },
        }
    }

    /// Canonical byte encoding
    pub fn encode(&self) -> Result<Vec<u8>, MultisigError> {
        serde_json::to_vec(self).map_err(|e| MultisigError::Derivation(e.to_string()))
    }

    /// HASH160 of the canonical encoding
    pub fn hash(&self) -> Result<Vec<u8>, MultisigError> {
        Ok(hash160(&self.encode()?))
    }
}

/// Output of a successful derivation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivedScript {
    /// Hex-encoded spending script
    pub script: String,
    pub address: String,
    pub stake_address: Option<String>,
    /// DRep id the script would register under
    pub drep_id: String,
}

/// External multisig script deriver
#[async_trait]
pub trait ScriptDeriver: Send + Sync {
    /// Derive the spending script and address for a configuration
    async fn derive(&self, config: &WalletConfig) -> Result<DerivedScript, MultisigError>;

    /// Resolve the stake address of a configuration, if it has one
    async fn resolve_stake_address(
        &self,
        config: &WalletConfig,
    ) -> Result<Option<String>, MultisigError>;
}

/// Deterministic reference deriver
#[derive(Debug, Clone, Default)]
pub struct NativeScriptDeriver {
    network: Network,
}

impl NativeScriptDeriver {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    /// Key hash of a signer address
    pub fn key_hash(address: &str) -> String {
        hex::encode(hash160(address.as_bytes()))
    }

    /// Payment script with signer key hashes sorted for determinism
    pub fn payment_script(config: &WalletConfig) -> NativeScript {
        let mut key_hashes: Vec<String> = config
            .signers
            .iter()
            .map(|s| Self::key_hash(&s.address))
            .collect();
        key_hashes.sort();
        NativeScript::from_rule(config.script_type, config.num_required_signers, key_hashes)
    }

    /// Stake credential hash: the external one, or a script over every
    /// signer's stake key when all signers supplied one
    fn stake_credential(config: &WalletConfig) -> Result<Option<Vec<u8>>, MultisigError> {
        if let Some(external) = &config.stake_credential_hash {
            return hex::decode(external)
                .map(Some)
                .map_err(|_| MultisigError::Derivation(format!("invalid stake credential {}", external)));
        }

        let keys: Option<Vec<&str>> = config.signers.iter().map(|s| s.stake_key.as_deref()).collect();
        match keys {
            Some(keys) if !keys.is_empty() => {
                let mut key_hashes: Vec<String> = keys.iter().map(|k| Self::key_hash(k)).collect();
                key_hashes.sort();
                let script =
                    NativeScript::from_rule(config.script_type, config.num_required_signers, key_hashes);
                Ok(Some(script.hash()?))
            }
            _ => Ok(None),
        }
    }

    /// Base58Check(header || hash)
    fn encode_address(header: u8, hash: &[u8]) -> String {
        let mut address_bytes = vec![header];
        address_bytes.extend_from_slice(hash);

        // Checksum is the first 4 bytes of double SHA-256
        let checksum = sha256(&sha256(&address_bytes));
        address_bytes.extend_from_slice(&checksum[..4]);

        bs58::encode(address_bytes).into_string()
    }
}

#[async_trait]
impl ScriptDeriver for NativeScriptDeriver {
    async fn derive(&self, config: &WalletConfig) -> Result<DerivedScript, MultisigError> {
        config.validate()?;

        let script = Self::payment_script(config);
        let script_hash = script.hash()?;
        let stake_address = Self::stake_credential(config)?
            .map(|hash| Self::encode_address(self.network.stake_header(), &hash));

        Ok(DerivedScript {
            script: hex::encode(script.encode()?),
            address: Self::encode_address(self.network.payment_header(), &script_hash),
            stake_address,
            drep_id: format!("drep_script{}", hex::encode(&script_hash)),
        })
    }

    async fn resolve_stake_address(
        &self,
        config: &WalletConfig,
    ) -> Result<Option<String>, MultisigError> {
        Ok(Self::stake_credential(config)?
            .map(|hash| Self::encode_address(self.network.stake_header(), &hash)))
    }
}
