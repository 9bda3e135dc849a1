//! Status Word (SW) constants for APDU responses
//!
//! ISO 7816-4 status words plus the purse-specific business codes.

/// Status Word constants
pub struct SW;

impl SW {
    // Success
    pub const SUCCESS: u16 = 0x9000;

    // Checking errors
    pub const WRONG_LENGTH: u16 = 0x6700;

    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    pub const AUTH_METHOD_BLOCKED: u16 = 0x6983;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;

    pub const WRONG_DATA: u16 = 0x6A80;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const INCORRECT_P1_P2: u16 = 0x6A86;

    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;
    pub const UNKNOWN_ERROR: u16 = 0x6F00;

    // Purse business errors (6A83..6A85, as used by classic wallet applets)
    pub const INVALID_TRANSACTION_AMOUNT: u16 = 0x6A83;
    pub const EXCEED_MAXIMUM_BALANCE: u16 = 0x6A84;
    pub const NEGATIVE_BALANCE: u16 = 0x6A85;

    /// Create a "more data available" status word (61xx)
    /// The low byte indicates how many more bytes are available
    #[inline]
    pub fn bytes_remaining(remaining: u8) -> u16 {
        0x6100 | (remaining as u16)
    }

    /// Create a warning with counter (63Cx)
    /// Used to indicate PIN retry count remaining
    #[inline]
    pub fn counter_warning(retries: u8) -> u16 {
        0x63C0 | ((retries & 0x0F) as u16)
    }

    /// Check if a status word indicates success (9000 or 61xx)
    #[inline]
    pub fn is_success(sw: u16) -> bool {
        sw == Self::SUCCESS || Self::is_more_data(sw)
    }

    /// Check if a status word indicates more data available (61xx)
    #[inline]
    pub fn is_more_data(sw: u16) -> bool {
        (sw & 0xFF00) == 0x6100
    }

    /// Extract retry count from counter warning (63Cx)
    #[inline]
    pub fn get_retry_count(sw: u16) -> Option<u8> {
        if (sw & 0xFFF0) == 0x63C0 {
            Some((sw & 0x0F) as u8)
        } else {
            None
        }
    }
}
