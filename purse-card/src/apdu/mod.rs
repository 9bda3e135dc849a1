//! APDU (Application Protocol Data Unit) handling
//!
//! ISO 7816-4 command parsing, response encoding, and the typed purse
//! command set built on top of them.
//!
//! # Example
//! ```ignore
//! use purse_card::apdu::{parse_apdu, Response};
//!
//! let raw = &[0x80, 0x20, 0x00, 0x00, 0x04, b'1', b'2', b'3', b'4'];
//! let apdu = parse_apdu(raw).unwrap();
//! assert_eq!(apdu.ins, 0x20);
//! ```

pub mod command;
mod response;
mod status;

pub use command::{BalanceOp, Command, DataField, Pin};
pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,

    #[error("Invalid extended APDU format")]
    InvalidExtendedFormat,
}

/// A parsed command APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
    /// Expected response length (Le), None if not specified
    pub le: Option<u32>,
}

impl APDU {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self::with_data(cla, ins, p1, p2, Vec::new())
    }

    /// Create a new APDU with data
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: None,
        }
    }

    /// Check if this is a chained APDU (CLA bit 4 set)
    pub fn is_chained(&self) -> bool {
        (self.cla & CHAINING_BIT) != 0
    }

    /// Class byte with the chaining bit cleared
    pub fn base_cla(&self) -> u8 {
        self.cla & !CHAINING_BIT
    }
}

/// Command-chaining bit of the class byte
pub const CHAINING_BIT: u8 = 0x10;

/// Proprietary class byte of every purse command
pub const CLA_PURSE: u8 = 0x80;

/// Parse raw bytes into an APDU
///
/// Supports both short and extended formats:
/// - Short: CLA INS P1 P2 [Lc Data] [Le]
/// - Extended: CLA INS P1 P2 00 Lc1 Lc2 Data [Le1 Le2], or 00 Le1 Le2
pub fn parse_apdu(data: &[u8]) -> Result<APDU, APDUError> {
    if data.len() < 4 {
        return Err(APDUError::TooShort(data.len()));
    }

    let mut apdu = APDU::new(data[0], data[1], data[2], data[3]);
    let body = &data[4..];

    match body.len() {
        // Case 1
        0 => Ok(apdu),
        // Case 2S: Le=0 means 256
        1 => {
            apdu.le = Some(short_le(body[0]));
            Ok(apdu)
        }
        // Extended forms start with a zero byte and carry 16-bit lengths
        _ if body[0] == 0x00 && body.len() >= 3 => parse_extended_body(apdu, &body[1..]),
        _ => parse_short_body(apdu, body),
    }
}

fn short_le(byte: u8) -> u32 {
    if byte == 0 {
        256
    } else {
        byte as u32
    }
}

fn extended_le(word: u32) -> u32 {
    if word == 0 {
        65536
    } else {
        word
    }
}

fn parse_short_body(mut apdu: APDU, body: &[u8]) -> Result<APDU, APDUError> {
    let lc = body[0] as usize;
    let rest = &body[1..];

    if rest.len() == lc {
        // Case 3S
        apdu.data = rest.to_vec();
    } else if rest.len() == lc + 1 {
        // Case 4S
        apdu.data = rest[..lc].to_vec();
        apdu.le = Some(short_le(rest[lc]));
    } else {
        return Err(APDUError::InvalidLength);
    }
    Ok(apdu)
}

fn parse_extended_body(mut apdu: APDU, body: &[u8]) -> Result<APDU, APDUError> {
    let first_word = u16::from_be_bytes([body[0], body[1]]) as u32;
    let rest = &body[2..];

    // Case 2E
    if rest.is_empty() {
        apdu.le = Some(extended_le(first_word));
        return Ok(apdu);
    }

    let lc = first_word as usize;
    if lc == 0 || rest.len() < lc {
        return Err(APDUError::InvalidExtendedFormat);
    }
    apdu.data = rest[..lc].to_vec();

    match rest.len() - lc {
        // Case 3E
        0 => Ok(apdu),
        // Case 4E
        2 => {
            let le = u16::from_be_bytes([rest[lc], rest[lc + 1]]) as u32;
            apdu.le = Some(extended_le(le));
            Ok(apdu)
        }
        _ => Err(APDUError::InvalidExtendedFormat),
    }
}

/// Purse instruction bytes
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const PROVISION: u8 = 0xE0;
    pub const VERIFY: u8 = 0x20;
    pub const CHANGE_REFERENCE_DATA: u8 = 0x24;
    pub const RESET_RETRY_COUNTER: u8 = 0x2C;
    pub const ACTIVATE_FILE: u8 = 0x44;
    pub const DEACTIVATE_FILE: u8 = 0x04;
    pub const CLEAR_CARD: u8 = 0xE4;
    pub const UPDATE_BALANCE: u8 = 0x50;
    pub const PUT_DATA: u8 = 0xDA;
    pub const UPLOAD_AVATAR: u8 = 0xD6;
    pub const GET_DATA: u8 = 0xCA;
    pub const INTERNAL_AUTHENTICATE: u8 = 0x88;
    pub const GET_RESPONSE: u8 = 0xC0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case1_no_data_no_le() {
        let apdu = parse_apdu(&[0x80, 0xE4, 0x00, 0x00]).unwrap();
        assert_eq!(apdu.ins, ins::CLEAR_CARD);
        assert!(apdu.data.is_empty());
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_case2_le_only() {
        let apdu = parse_apdu(&[0x80, 0xCA, 0x00, 0x01, 0x00]).unwrap();
        assert!(apdu.data.is_empty());
        assert_eq!(apdu.le, Some(256));
    }

    #[test]
    fn test_case3_lc_data() {
        let apdu = parse_apdu(&[0x80, 0x20, 0x00, 0x00, 0x04, 0x31, 0x32, 0x33, 0x34]).unwrap();
        assert_eq!(apdu.data, b"1234".to_vec());
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_case4_lc_data_le() {
        let apdu = parse_apdu(&[0x80, 0x88, 0x00, 0x00, 0x02, 0xAA, 0xBB, 0x80]).unwrap();
        assert_eq!(apdu.data, vec![0xAA, 0xBB]);
        assert_eq!(apdu.le, Some(0x80));
    }

    #[test]
    fn test_extended_lc_data() {
        let mut raw = vec![0x80, 0xDA, 0x00, 0x02, 0x00, 0x01, 0x2C];
        raw.extend(std::iter::repeat(0x41).take(300));
        let apdu = parse_apdu(&raw).unwrap();
        assert_eq!(apdu.data.len(), 300);
        assert!(apdu.le.is_none());

        raw.extend_from_slice(&[0x00, 0x00]);
        let apdu = parse_apdu(&raw).unwrap();
        assert_eq!(apdu.le, Some(65536));
    }

    #[test]
    fn test_extended_le_only() {
        let apdu = parse_apdu(&[0x80, 0xCA, 0x00, 0x03, 0x00, 0x01, 0x00]).unwrap();
        assert!(apdu.data.is_empty());
        assert_eq!(apdu.le, Some(256));
    }

    #[test]
    fn test_chained_command() {
        let apdu = parse_apdu(&[0x90, 0xDA, 0x00, 0x02, 0x02, 0x01, 0x02]).unwrap();
        assert!(apdu.is_chained());
        assert_eq!(apdu.base_cla(), CLA_PURSE);
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            parse_apdu(&[0x80, 0x20, 0x00, 0x00, 0x04, 0x31]),
            Err(APDUError::InvalidLength)
        );
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            parse_apdu(&[0x80, 0x20, 0x00]),
            Err(APDUError::TooShort(3))
        ));
    }
}
