//! Session security state
//!
//! Tracks whether the cardholder PIN has been verified since the last reset.
//! The verified PIN key is held here so field operations can unwrap the
//! master key; it is wiped when the session ends.

use crate::crypto::PinKey;

/// Per-session verification state. Never persisted.
#[derive(Debug, Default)]
pub struct SecurityState {
    pin_key: Option<PinKey>,
}

impl SecurityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the PIN as verified, keeping its derived key for the session
    pub fn set_verified(&mut self, pin_key: PinKey) {
        self.pin_key = Some(pin_key);
    }

    pub fn is_verified(&self) -> bool {
        self.pin_key.is_some()
    }

    /// The session PIN key, present only while verified
    pub fn pin_key(&self) -> Option<&PinKey> {
        self.pin_key.as_ref()
    }

    /// Drop verification (deactivate, clear, card reset or power cycle)
    pub fn clear(&mut self) {
        // PinKey zeroizes itself on drop
        self.pin_key = None;
    }
}
