//! Encrypted balance and personal info
//!
//! Fields are encrypted under the master key with zero padding (see
//! [`AesOperations::encrypt_field`]). There is no authentication tag, so a
//! modified ciphertext decrypts to garbage instead of failing.

use log::debug;
use zeroize::Zeroize;

use crate::apdu::BalanceOp;
use crate::card::CardState;
use crate::crypto::{AesOperations, MasterKey};
use crate::error::CardError;

/// Largest personal-info plaintext
pub const MAX_INFO_LEN: usize = 512;

pub struct FieldStore;

impl FieldStore {
    /// One block: `BE32(balance) ∥ 12 zero bytes`
    pub fn encrypt_balance(key: &MasterKey, balance: i32) -> Result<Vec<u8>, CardError> {
        AesOperations::encrypt_field(key, &balance.to_be_bytes())
    }

    /// Reads the first four bytes of the block, so a zero balance survives
    /// the padding
    pub fn decrypt_balance(key: &MasterKey, ciphertext: &[u8]) -> Result<i32, CardError> {
        if ciphertext.len() != AesOperations::BLOCK_SIZE {
            return Err(CardError::Crypto(format!(
                "balance ciphertext must be one block, got {} bytes",
                ciphertext.len()
            )));
        }
        let mut block = AesOperations::decrypt_blocks(key, ciphertext)?;
        let balance = i32::from_be_bytes([block[0], block[1], block[2], block[3]]);
        block.zeroize();
        Ok(balance)
    }

    pub fn balance(card: &CardState, key: &MasterKey) -> Result<i32, CardError> {
        Self::decrypt_balance(key, &card.encrypted_balance)
    }

    /// Apply a top-up or payment and return the new balance. On any error
    /// the stored ciphertext is left as it was.
    pub fn apply_delta(
        card: &mut CardState,
        key: &MasterKey,
        op: BalanceOp,
        amount: i32,
    ) -> Result<i32, CardError> {
        if amount < 0 {
            return Err(CardError::InvalidAmount);
        }
        let current = Self::balance(card, key)?;
        let updated = match op {
            BalanceOp::TopUp => current
                .checked_add(amount)
                .ok_or(CardError::BalanceOverflow)?,
            BalanceOp::Payment => {
                if amount > current {
                    return Err(CardError::InsufficientFunds {
                        balance: current,
                        requested: amount,
                    });
                }
                current - amount
            }
        };
        card.encrypted_balance = Self::encrypt_balance(key, updated)?;
        debug!("Balance updated ({:?})", op);
        Ok(updated)
    }

    pub fn store_info(card: &mut CardState, key: &MasterKey, info: &[u8]) -> Result<(), CardError> {
        if info.len() > MAX_INFO_LEN {
            return Err(CardError::WrongLength("info exceeds 512 bytes"));
        }
        card.encrypted_info = AesOperations::encrypt_field(key, info)?;
        Ok(())
    }

    /// Stored info with trailing zeros stripped; empty if none was stored
    pub fn load_info(card: &CardState, key: &MasterKey) -> Result<Vec<u8>, CardError> {
        if card.encrypted_info.is_empty() {
            return Ok(Vec::new());
        }
        AesOperations::decrypt_field(key, &card.encrypted_info)
    }
}
