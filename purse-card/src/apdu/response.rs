//! APDU Response handling
//!
//! A Response contains data bytes plus SW1/SW2 status words.

use super::status::SW;
use crate::error::CardError;

/// A card response: payload plus status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response data (without status words)
    pub data: Vec<u8>,
    /// Status word 1 (SW1)
    pub sw1: u8,
    /// Status word 2 (SW2)
    pub sw2: u8,
}

impl Response {
    /// Create a new response with data and status word
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        Self {
            data,
            sw1: (sw >> 8) as u8,
            sw2: sw as u8,
        }
    }

    /// Create a success response (0x9000) with data
    pub fn success(data: Vec<u8>) -> Self {
        Self::new(data, SW::SUCCESS)
    }

    /// Create an empty success response (0x9000)
    pub fn ok() -> Self {
        Self::success(Vec::new())
    }

    /// Create an error response (no data)
    pub fn error(sw: u16) -> Self {
        Self::new(Vec::new(), sw)
    }

    /// Create a "more data available" response (0x61xx)
    ///
    /// More than 255 pending bytes are reported as 0x6100.
    pub fn more_data(data: Vec<u8>, remaining: usize) -> Self {
        let remaining = if remaining > 0xFF { 0 } else { remaining as u8 };
        Self::new(data, SW::bytes_remaining(remaining))
    }

    /// Check if the response is okay (0x9000 or 0x61xx)
    pub fn is_okay(&self) -> bool {
        SW::is_success(self.sw())
    }

    /// Get the combined status word as u16
    pub fn sw(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Returns Some(bytes) if SW1=0x61, None otherwise.
    pub fn available_response(&self) -> Option<u8> {
        if self.sw1 == 0x61 {
            Some(self.sw2)
        } else {
            None
        }
    }

    /// Convert to raw bytes for transmission (data + SW1 + SW2)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.data.len() + 2);
        result.extend_from_slice(&self.data);
        result.push(self.sw1);
        result.push(self.sw2);
        result
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

impl From<u16> for Response {
    /// Create an error response from a status word
    fn from(sw: u16) -> Self {
        Self::error(sw)
    }
}

impl From<&CardError> for Response {
    fn from(err: &CardError) -> Self {
        match err {
            // The verify outcome travels in the data field as well as in 63Cx
            CardError::PinMismatch { tries_remaining } => {
                Self::new(vec![0x00, *tries_remaining], err.status_word())
            }
            CardError::PinBlocked => Self::new(vec![0x00, 0x00], err.status_word()),
            _ => Self::error(err.status_word()),
        }
    }
}
