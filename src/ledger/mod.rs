//! Ledger query seam
//!
//! The orchestrator reads live chain state (outputs at an address, stake
//! account registration, governance registrations) through [`LedgerQuery`].
//! [`FixtureLedger`] serves that state from a JSON fixture.

pub mod fixture;
pub mod query;

pub use fixture::{FixtureLedger, LedgerFixture};
pub use query::{AccountStatus, DrepRegistration, LedgerError, LedgerQuery};
