//! Record stores and their persistence

pub mod memory;
pub mod persistence;
pub mod store;

pub use memory::{MemoryStore, StoreState};
pub use persistence::{Storage, StorageConfig, StorageError};
pub use store::{DraftWalletStore, MigrationStore, NewMigration, ProxyStore, WalletStore};
