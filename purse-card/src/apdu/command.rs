//! Typed purse commands
//!
//! [`Command::parse`] validates an incoming [`APDU`] into one variant per
//! operation. Length and format problems are rejected here, before the
//! applet touches any state.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{ins, APDU, CLA_PURSE};
use crate::card::CardIdentity;
use crate::error::CardError;
use crate::purse::transfer::AvatarChunk;

/// Number of digits in a cardholder PIN
pub const PIN_LEN: usize = 4;

/// A 4-digit cardholder PIN, wiped when dropped
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Pin([u8; PIN_LEN]);

impl Pin {
    /// Validate and copy a PIN from command data
    pub fn new(bytes: &[u8]) -> Result<Self, CardError> {
        if bytes.len() != PIN_LEN {
            return Err(CardError::WrongLength("PIN must be 4 bytes"));
        }
        if !bytes.iter().all(u8::is_ascii_digit) {
            return Err(CardError::InvalidData("PIN must be ASCII digits"));
        }
        let mut pin = [0u8; PIN_LEN];
        pin.copy_from_slice(bytes);
        Ok(Self(pin))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin([REDACTED])")
    }
}

/// Balance update type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOp {
    TopUp,
    Payment,
}

impl TryFrom<u8> for BalanceOp {
    type Error = CardError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::TopUp),
            0x02 => Ok(Self::Payment),
            _ => Err(CardError::InvalidData("unknown balance operation")),
        }
    }
}

/// GET DATA targets, selected by P2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataField {
    Balance,
    Info,
    /// Whole avatar, segmented over GET RESPONSE
    Avatar,
    /// One random-access avatar chunk
    AvatarChunk,
    Identity,
    PublicKey,
    TriesRemaining,
}

impl TryFrom<u8> for DataField {
    type Error = CardError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Balance),
            0x02 => Ok(Self::Info),
            0x03 => Ok(Self::Avatar),
            0x04 => Ok(Self::AvatarChunk),
            0x05 => Ok(Self::Identity),
            0x06 => Ok(Self::PublicKey),
            0x07 => Ok(Self::TriesRemaining),
            _ => Err(CardError::IncorrectP1P2),
        }
    }
}

/// One decoded purse command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select { aid: Vec<u8> },
    Provision { pin: Pin, identity: CardIdentity },
    VerifyPin { pin: Pin },
    ChangePin { old_pin: Pin, new_pin: Pin },
    ResetTries,
    ForgetPin { new_pin: Pin },
    Activate,
    Deactivate,
    Clear,
    UpdateBalance { op: BalanceOp, amount: i32 },
    PutInfo { info: Vec<u8> },
    UploadAvatar(AvatarChunk),
    GetData(DataField),
    GetAvatarChunk { offset: u16 },
    Sign { challenge: Vec<u8> },
    GetResponse,
}

impl Command {
    /// Decode an APDU whose chained segments have already been joined
    pub fn parse(apdu: &APDU) -> Result<Self, CardError> {
        let data = apdu.data.as_slice();

        match apdu.ins {
            ins::SELECT => {
                if apdu.p1 != 0x04 {
                    return Err(CardError::IncorrectP1P2);
                }
                return Ok(Self::Select { aid: data.to_vec() });
            }
            ins::GET_RESPONSE => return Ok(Self::GetResponse),
            _ => {}
        }

        if apdu.base_cla() != CLA_PURSE {
            return Err(CardError::ClaNotSupported(apdu.cla));
        }

        match apdu.ins {
            ins::PROVISION => {
                if data.len() <= PIN_LEN {
                    return Err(CardError::WrongLength("PIN and identity required"));
                }
                Ok(Self::Provision {
                    pin: Pin::new(&data[..PIN_LEN])?,
                    identity: CardIdentity::new(&data[PIN_LEN..])?,
                })
            }
            ins::VERIFY => Ok(Self::VerifyPin { pin: Pin::new(data)? }),
            ins::CHANGE_REFERENCE_DATA => {
                if data.len() != 2 * PIN_LEN {
                    return Err(CardError::WrongLength("old and new PIN required"));
                }
                Ok(Self::ChangePin {
                    old_pin: Pin::new(&data[..PIN_LEN])?,
                    new_pin: Pin::new(&data[PIN_LEN..])?,
                })
            }
            ins::RESET_RETRY_COUNTER => match apdu.p1 {
                0x00 => Ok(Self::ResetTries),
                0x01 => Ok(Self::ForgetPin { new_pin: Pin::new(data)? }),
                _ => Err(CardError::IncorrectP1P2),
            },
            ins::ACTIVATE_FILE => Ok(Self::Activate),
            ins::DEACTIVATE_FILE => Ok(Self::Deactivate),
            ins::CLEAR_CARD => Ok(Self::Clear),
            ins::UPDATE_BALANCE => {
                if data.len() != 5 {
                    return Err(CardError::WrongLength("type byte and 4-byte amount required"));
                }
                Ok(Self::UpdateBalance {
                    op: BalanceOp::try_from(data[0])?,
                    amount: i32::from_be_bytes([data[1], data[2], data[3], data[4]]),
                })
            }
            ins::PUT_DATA => match DataField::try_from(apdu.p2)? {
                DataField::Info => Ok(Self::PutInfo { info: data.to_vec() }),
                _ => Err(CardError::IncorrectP1P2),
            },
            ins::UPLOAD_AVATAR => {
                let is_final = match apdu.p1 {
                    0x00 => false,
                    0x01 => true,
                    _ => return Err(CardError::IncorrectP1P2),
                };
                if data.len() < 4 {
                    return Err(CardError::WrongLength("chunk header is 4 bytes"));
                }
                Ok(Self::UploadAvatar(AvatarChunk {
                    total_len: u16::from_be_bytes([data[0], data[1]]),
                    offset: u16::from_be_bytes([data[2], data[3]]),
                    bytes: data[4..].to_vec(),
                    is_final,
                }))
            }
            ins::GET_DATA => match DataField::try_from(apdu.p2)? {
                DataField::AvatarChunk => {
                    if data.len() != 2 {
                        return Err(CardError::WrongLength("offset is 2 bytes"));
                    }
                    Ok(Self::GetAvatarChunk {
                        offset: u16::from_be_bytes([data[0], data[1]]),
                    })
                }
                field => Ok(Self::GetData(field)),
            },
            ins::INTERNAL_AUTHENTICATE => Ok(Self::Sign { challenge: data.to_vec() }),
            other => Err(CardError::InsNotSupported(other)),
        }
    }
}
