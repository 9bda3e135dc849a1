//! Card error taxonomy
//!
//! Every component returns [`CardError`]; the applet turns it into a status
//! word once, at the dispatch boundary.

use thiserror::Error;

use crate::apdu::{APDUError, SW};

/// Broad failure category, used for logging and by hosts deciding whether a
/// retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or oversized input, or an operation invalid in this state.
    /// Rejected before any mutation.
    Protocol,
    /// PIN mismatch or missing verification.
    Auth,
    /// Business rule violation (funds, amount). State is unchanged.
    Business,
    /// Try counter exhausted; only an admin reset or activate clears it.
    FatalSecurity,
    /// Crypto or storage failure inside the engine.
    Internal,
}

/// Errors produced by the purse engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CardError {
    #[error("malformed APDU: {0}")]
    Malformed(#[from] APDUError),

    #[error("wrong length: {0}")]
    WrongLength(&'static str),

    #[error("invalid data: {0}")]
    InvalidData(&'static str),

    #[error("incorrect P1/P2")]
    IncorrectP1P2,

    #[error("instruction 0x{0:02X} not supported")]
    InsNotSupported(u8),

    #[error("class 0x{0:02X} not supported")]
    ClaNotSupported(u8),

    #[error("card is not provisioned")]
    NotInitialized,

    #[error("card is already provisioned")]
    AlreadyInitialized,

    #[error("card is deactivated")]
    Inactive,

    #[error("operation requires a prior state that is not present: {0}")]
    ConditionsNotSatisfied(&'static str),

    #[error("PIN verification required")]
    NotVerified,

    #[error("wrong PIN, {tries_remaining} tries remaining")]
    PinMismatch { tries_remaining: u8 },

    #[error("PIN blocked, admin reset required")]
    PinBlocked,

    #[error("invalid transaction amount")]
    InvalidAmount,

    #[error("balance would exceed the maximum")]
    BalanceOverflow,

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i32, requested: i32 },

    #[error("crypto failure: {0}")]
    Crypto(String),
}

impl CardError {
    /// The category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_)
            | Self::WrongLength(_)
            | Self::InvalidData(_)
            | Self::IncorrectP1P2
            | Self::InsNotSupported(_)
            | Self::ClaNotSupported(_)
            | Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::Inactive
            | Self::ConditionsNotSatisfied(_) => ErrorKind::Protocol,
            Self::NotVerified | Self::PinMismatch { .. } => ErrorKind::Auth,
            Self::PinBlocked => ErrorKind::FatalSecurity,
            Self::InvalidAmount | Self::BalanceOverflow | Self::InsufficientFunds { .. } => {
                ErrorKind::Business
            }
            Self::Crypto(_) => ErrorKind::Internal,
        }
    }

    /// ISO 7816 status word reported for this error
    pub fn status_word(&self) -> u16 {
        match self {
            Self::Malformed(_) | Self::WrongLength(_) => SW::WRONG_LENGTH,
            Self::InvalidData(_) => SW::WRONG_DATA,
            Self::IncorrectP1P2 => SW::INCORRECT_P1_P2,
            Self::InsNotSupported(_) => SW::INS_NOT_SUPPORTED,
            Self::ClaNotSupported(_) => SW::CLA_NOT_SUPPORTED,
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::Inactive
            | Self::ConditionsNotSatisfied(_) => SW::CONDITIONS_NOT_SATISFIED,
            Self::NotVerified => SW::SECURITY_STATUS_NOT_SATISFIED,
            Self::PinMismatch { tries_remaining } => SW::counter_warning(*tries_remaining),
            Self::PinBlocked => SW::AUTH_METHOD_BLOCKED,
            Self::InvalidAmount => SW::INVALID_TRANSACTION_AMOUNT,
            Self::BalanceOverflow => SW::EXCEED_MAXIMUM_BALANCE,
            Self::InsufficientFunds { .. } => SW::NEGATIVE_BALANCE,
            Self::Crypto(_) => SW::UNKNOWN_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_words() {
        assert_eq!(CardError::WrongLength("pin").status_word(), 0x6700);
        assert_eq!(CardError::InvalidData("challenge").status_word(), 0x6A80);
        assert_eq!(CardError::NotInitialized.status_word(), 0x6985);
        assert_eq!(CardError::NotVerified.status_word(), 0x6982);
        assert_eq!(CardError::PinMismatch { tries_remaining: 3 }.status_word(), 0x63C3);
        assert_eq!(CardError::PinBlocked.status_word(), 0x6983);
        assert_eq!(
            CardError::InsufficientFunds { balance: 1, requested: 2 }.status_word(),
            0x6A85
        );
        assert_eq!(
            CardError::Malformed(APDUError::InvalidLength).status_word(),
            0x6700
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(CardError::AlreadyInitialized.kind(), ErrorKind::Protocol);
        assert_eq!(CardError::PinMismatch { tries_remaining: 1 }.kind(), ErrorKind::Auth);
        assert_eq!(CardError::PinBlocked.kind(), ErrorKind::FatalSecurity);
        assert_eq!(CardError::BalanceOverflow.kind(), ErrorKind::Business);
        assert_eq!(CardError::Crypto("x".into()).kind(), ErrorKind::Internal);
    }
}
