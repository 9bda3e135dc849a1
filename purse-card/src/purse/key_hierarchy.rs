//! PIN key / master key hierarchy
//!
//! `PinKey = KDF(PIN, identity)` wraps a random `MasterKey`; the master key
//! encrypts every stored field. Changing the PIN only rewraps the master
//! key, so stored ciphertexts are untouched.

use log::debug;
use zeroize::Zeroize;

use super::field_store::FieldStore;
use crate::apdu::Pin;
use crate::card::{CardIdentity, CardState};
use crate::crypto::{derive, AesOperations, MasterKey, PinKey};
use crate::error::CardError;

/// Derives, wraps and unwraps card keys
#[derive(Debug, Clone)]
pub struct KeyHierarchy {
    iterations: u16,
}

impl KeyHierarchy {
    pub fn new(iterations: u16) -> Self {
        Self { iterations }
    }

    pub fn derive_pin_key(&self, pin: &Pin, identity: &CardIdentity) -> Result<PinKey, CardError> {
        derive(pin.as_bytes(), identity.as_bytes(), self.iterations)
    }

    /// Create the key material of a blank card: reference PIN key, wrapped
    /// master key and a zero balance. Lifecycle flags are left to the caller.
    pub fn provision(
        &self,
        card: &mut CardState,
        pin: &Pin,
        identity: CardIdentity,
    ) -> Result<(), CardError> {
        if card.flags.initialized {
            return Err(CardError::AlreadyInitialized);
        }

        let pin_key = self.derive_pin_key(pin, &identity)?;
        let master_key = MasterKey::generate();
        let balance = FieldStore::encrypt_balance(&master_key, 0)?;

        card.reference_pin_key.zeroize();
        card.reference_pin_key.extend_from_slice(pin_key.as_bytes());
        card.encrypted_master_key = AesOperations::wrap_key(&pin_key, &master_key);
        card.encrypted_balance = balance;
        card.encrypted_info.clear();
        card.encrypted_avatar.clear();
        card.identity = Some(identity);

        debug!("Key hierarchy created ({} KDF iterations)", self.iterations);
        Ok(())
    }

    /// Check `pin` against the reference key. On a match the master key is
    /// unwrapped once (and dropped) and the candidate key is returned.
    pub fn verify(&self, card: &CardState, pin: &Pin) -> Result<Option<PinKey>, CardError> {
        let identity = card.identity.as_ref().ok_or(CardError::NotInitialized)?;
        let candidate = self.derive_pin_key(pin, identity)?;
        if !candidate.matches(&card.reference_pin_key) {
            return Ok(None);
        }
        self.unwrap_master(card, &candidate)?;
        Ok(Some(candidate))
    }

    /// `Decrypt(pin_key, EncryptedMasterKey)`
    pub fn unwrap_master(&self, card: &CardState, pin_key: &PinKey) -> Result<MasterKey, CardError> {
        AesOperations::unwrap_key(pin_key, &card.encrypted_master_key)
    }

    /// Rewrap the master key from `current` to `new_key` and make `new_key`
    /// the reference
    pub fn rewrap(
        &self,
        card: &mut CardState,
        current: &PinKey,
        new_key: &PinKey,
    ) -> Result<(), CardError> {
        let master_key = self.unwrap_master(card, current)?;
        card.encrypted_master_key = AesOperations::wrap_key(new_key, &master_key);
        card.reference_pin_key.zeroize();
        card.reference_pin_key.extend_from_slice(new_key.as_bytes());
        Ok(())
    }

    /// Rotate to `new_pin` if `old_pin` matches. `None` means mismatch and
    /// nothing was changed.
    pub fn change_pin(
        &self,
        card: &mut CardState,
        old_pin: &Pin,
        new_pin: &Pin,
    ) -> Result<Option<PinKey>, CardError> {
        let identity = card.identity.clone().ok_or(CardError::NotInitialized)?;
        let old_key = self.derive_pin_key(old_pin, &identity)?;
        if !old_key.matches(&card.reference_pin_key) {
            return Ok(None);
        }
        let new_key = self.derive_pin_key(new_pin, &identity)?;
        self.rewrap(card, &old_key, &new_key)?;
        Ok(Some(new_key))
    }

    /// Admin PIN replacement. The master key is kept: it is unwrapped with
    /// the stored reference key, so every stored field stays readable.
    pub fn forget_pin(&self, card: &mut CardState, new_pin: &Pin) -> Result<(), CardError> {
        let identity = card.identity.clone().ok_or(CardError::NotInitialized)?;
        let reference = PinKey::from_slice(&card.reference_pin_key)
            .ok_or_else(|| CardError::Crypto("reference PIN key missing".to_string()))?;
        let new_key = self.derive_pin_key(new_pin, &identity)?;
        self.rewrap(card, &reference, &new_key)
    }
}
