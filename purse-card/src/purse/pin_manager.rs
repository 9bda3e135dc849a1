//! PIN try counter and lockout
//!
//! The counter lives in [`CardState`] so it survives power cycles; the
//! manager only applies the transitions.

use log::{info, warn};

use crate::card::CardState;
use crate::error::CardError;

/// Observable PIN state of a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    /// No PIN has been set
    NotProvisioned,
    /// Deactivated by an admin command; verification is refused
    Inactive,
    /// Provisioned and waiting for a PIN, with attempts left
    Ready { tries_remaining: u8 },
    /// PIN verified in this session
    Verified,
    /// Try counter exhausted; only activate or reset tries recover
    Locked,
}

/// Applies try-counter transitions
#[derive(Debug, Clone)]
pub struct PINManager {
    max_tries: u8,
}

impl PINManager {
    pub fn new(max_tries: u8) -> Self {
        Self { max_tries }
    }

    pub fn max_tries(&self) -> u8 {
        self.max_tries
    }

    pub fn state(&self, card: &CardState, verified: bool) -> PinState {
        if !card.flags.initialized {
            PinState::NotProvisioned
        } else if !card.flags.active {
            // Deactivation zeroes the counter, so check it first
            PinState::Inactive
        } else if card.pin_tries == 0 {
            PinState::Locked
        } else if verified {
            PinState::Verified
        } else {
            PinState::Ready {
                tries_remaining: card.pin_tries,
            }
        }
    }

    /// Reject verification before any key is derived
    pub fn check_can_verify(&self, card: &CardState) -> Result<(), CardError> {
        if !card.flags.initialized {
            return Err(CardError::NotInitialized);
        }
        if !card.flags.active {
            return Err(CardError::Inactive);
        }
        if card.pin_tries == 0 {
            return Err(CardError::PinBlocked);
        }
        Ok(())
    }

    /// Count one mismatch and return the error to report
    pub fn record_failure(&self, card: &mut CardState) -> CardError {
        card.pin_tries = card.pin_tries.saturating_sub(1);
        if card.pin_tries == 0 {
            info!("PIN try counter exhausted, card locked");
            CardError::PinBlocked
        } else {
            warn!("PIN mismatch, {} tries remaining", card.pin_tries);
            CardError::PinMismatch {
                tries_remaining: card.pin_tries,
            }
        }
    }

    pub fn record_success(&self, card: &mut CardState) {
        card.pin_tries = self.max_tries;
    }

    /// Admin recovery shared by activate and reset tries
    pub fn restore(&self, card: &mut CardState) {
        card.pin_tries = self.max_tries;
        card.flags.active = true;
        info!("Card activated, {} tries", self.max_tries);
    }

    /// Deactivation: equivalent to lockout plus the inactive flag
    pub fn lock(&self, card: &mut CardState) {
        card.pin_tries = 0;
        card.flags.active = false;
        info!("Card deactivated");
    }
}
