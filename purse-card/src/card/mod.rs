//! Card data structures and storage
//!
//! Everything the purse keeps "in EEPROM": the identity, lifecycle flags,
//! wrapped key material and field ciphertexts, plus JSON persistence.

pub mod state;
pub mod storage;

pub use state::{CardIdentity, CardState, LifecycleFlags, MAX_IDENTITY_LEN};
pub use storage::{CardDataStore, StorageError};
