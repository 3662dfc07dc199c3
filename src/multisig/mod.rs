//! Multi-signature wallet configuration, script derivation and sweeps
//!
//! Provides M-of-N signer configurations, the seam to an external script
//! deriver, and sweep transactions handed to an external signer/submitter.
//!
//! # Example
//!
//! ```ignore
//! use multisig_migrate::multisig::{NativeScriptDeriver, ScriptDeriver, Signer, WalletConfig};
//!
//! // A 2-of-3 configuration
//! let config = WalletConfig::new("Treasury", vec![alice, bob, carol], 2);
//! config.validate()?;
//!
//! // Commit it to a script and address
//! let derived = NativeScriptDeriver::default().derive(&config).await?;
//! println!("{}", derived.address);
//! ```

pub mod script;
pub mod transaction;
pub mod wallet;

pub use script::{DerivedScript, NativeScript, NativeScriptDeriver, Network, ScriptDeriver};
pub use transaction::{PendingStatus, PendingTxBook, SweepTransaction, TransactionService, TxOutput};
pub use wallet::{DraftUpdate, MultisigError, ScriptType, Signer, WalletConfig};
