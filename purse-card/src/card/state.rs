//! Card state data structures
//!
//! Byte fields are stored as base64 strings in the JSON state file.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::CardError;

/// Longest accepted card identity
pub const MAX_IDENTITY_LEN: usize = 50;

/// Custom serde module for base64 encoding of byte vectors
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Card identity: 1..=50 opaque bytes, also the KDF salt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardIdentity(#[serde(with = "base64_bytes")] Vec<u8>);

impl CardIdentity {
    pub fn new(bytes: &[u8]) -> Result<Self, CardError> {
        if bytes.is_empty() || bytes.len() > MAX_IDENTITY_LEN {
            return Err(CardError::InvalidData("identity must be 1..=50 bytes"));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Persistent lifecycle flags. `pinVerified` is session state and lives in
/// the applet, not here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleFlags {
    pub initialized: bool,
    pub active: bool,
}

/// Complete persistent card state
///
/// The cleartext master key is never a member of this struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardState {
    pub identity: Option<CardIdentity>,
    pub flags: LifecycleFlags,
    pub pin_tries: u8,
    /// PIN key of the current PIN, compared on verify. It unwraps
    /// `encrypted_master_key`, so the saved file is owner-only.
    #[serde(with = "base64_bytes")]
    pub reference_pin_key: Vec<u8>,
    /// `Encrypt(PinKey, MasterKey)`
    #[serde(with = "base64_bytes")]
    pub encrypted_master_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub encrypted_balance: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub encrypted_info: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub encrypted_avatar: Vec<u8>,
    /// Encoded RSA private key; survives `clear`
    #[serde(with = "base64_bytes")]
    pub signing_key: Vec<u8>,
}

impl CardState {
    /// Wipe everything `clear` covers. The signing keypair is kept.
    pub fn clear(&mut self) {
        self.identity = None;
        self.flags = LifecycleFlags::default();
        self.pin_tries = 0;
        self.reference_pin_key.zeroize();
        self.encrypted_master_key.zeroize();
        self.encrypted_balance.zeroize();
        self.encrypted_info.zeroize();
        self.encrypted_avatar.zeroize();
    }

    pub fn has_signing_key(&self) -> bool {
        !self.signing_key.is_empty()
    }
}
