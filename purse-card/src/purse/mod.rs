//! Purse Card Applet
//!
//! PIN-protected wallet: encrypted balance, personal info and avatar under a
//! PIN-wrapped master key, plus RSA challenge signing.

pub mod applet;
pub mod field_store;
pub mod key_hierarchy;
pub mod pin_manager;
pub mod security_state;
pub mod transfer;

#[cfg(test)]
mod scenarios;

pub use applet::{PurseApplet, PURSE_AID};
pub use field_store::{FieldStore, MAX_INFO_LEN};
pub use key_hierarchy::KeyHierarchy;
pub use pin_manager::{PINManager, PinState};
pub use security_state::SecurityState;
pub use transfer::{
    AvatarChunk, AvatarSlice, AvatarTransfer, UploadStatus, AVATAR_CHUNK_MAX, MAX_AVATAR_LEN,
};
