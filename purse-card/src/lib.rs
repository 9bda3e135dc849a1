//! Purse card engine
//!
//! Card-side state machine of a PIN-protected smart-card wallet. The card
//! keeps a balance, personal info and an avatar encrypted under a random
//! master key, which is itself wrapped by a key derived from the 4-digit
//! PIN and the card identity. Hosts talk to it with ISO 7816 style APDUs
//! (or the typed methods of [`PurseApplet`]):
//!
//! - provisioning, activation, deactivation and clearing
//! - PIN verification with a try counter and lockout
//! - balance top-up and payment, personal info
//! - chunked avatar upload and download
//! - RSA challenge signing with a per-card keypair

pub mod apdu;
pub mod buffer;
pub mod card;
pub mod config;
pub mod crypto;
pub mod error;
pub mod purse;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use apdu::{parse_apdu, BalanceOp, Command, DataField, Pin, Response, APDU, SW};
pub use card::{CardDataStore, CardIdentity, CardState};
pub use config::EngineConfig;
pub use error::{CardError, ErrorKind};
pub use purse::{AvatarChunk, AvatarSlice, PinState, PurseApplet, UploadStatus};
pub use registry::CardRegistry;
