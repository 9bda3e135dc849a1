//! AES-128 Operations
//!
//! Master-key wrapping (single block) and field encryption (CBC, zero IV,
//! zero padding). No authentication tag is applied: a modified ciphertext
//! decrypts to garbage rather than failing.

use ::aes::cipher::{
    block_padding::NoPadding, generic_array::GenericArray, BlockDecrypt, BlockDecryptMut,
    BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
};
use ::aes::Aes128;
use log::debug;
use zeroize::Zeroize;

use super::keys::{MasterKey, PinKey, KEY_SIZE};
use crate::error::CardError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES Operations
pub struct AesOperations;

impl AesOperations {
    /// Block size for AES
    pub const BLOCK_SIZE: usize = 16;

    const ZERO_IV: [u8; 16] = [0u8; 16];

    /// `Encrypt(PinKey, MasterKey)`
    pub fn wrap_key(pin_key: &PinKey, master_key: &MasterKey) -> Vec<u8> {
        let cipher = Aes128::new(GenericArray::from_slice(pin_key.as_bytes()));
        let mut block = GenericArray::clone_from_slice(master_key.as_bytes());
        cipher.encrypt_block(&mut block);
        let wrapped = block.to_vec();
        block.as_mut_slice().zeroize();
        wrapped
    }

    /// `Decrypt(PinKey, EncryptedMasterKey)`
    pub fn unwrap_key(pin_key: &PinKey, wrapped: &[u8]) -> Result<MasterKey, CardError> {
        if wrapped.len() != KEY_SIZE {
            return Err(CardError::Crypto(format!(
                "wrapped key must be {} bytes, got {}",
                KEY_SIZE,
                wrapped.len()
            )));
        }
        let cipher = Aes128::new(GenericArray::from_slice(pin_key.as_bytes()));
        let mut block = GenericArray::clone_from_slice(wrapped);
        cipher.decrypt_block(&mut block);
        let master_key = MasterKey::from_slice(&block);
        block.as_mut_slice().zeroize();
        master_key.ok_or_else(|| CardError::Crypto("unwrapped key has wrong size".to_string()))
    }

    /// Zero-pad to the next block boundary and encrypt. A block-aligned
    /// plaintext (including an empty one) gains one full block of zeros.
    pub fn encrypt_field(key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>, CardError> {
        let padded_len = (plaintext.len() / Self::BLOCK_SIZE + 1) * Self::BLOCK_SIZE;
        let mut padded = plaintext.to_vec();
        padded.resize(padded_len, 0);

        let ciphertext = Self::encrypt_blocks(key, &padded);
        padded.zeroize();
        ciphertext
    }

    /// Decrypt and drop trailing zero bytes. Plaintexts that really ended in
    /// 0x00 lose those bytes.
    pub fn decrypt_field(key: &MasterKey, ciphertext: &[u8]) -> Result<Vec<u8>, CardError> {
        let mut plaintext = Self::decrypt_blocks(key, ciphertext)?;
        plaintext.truncate(Self::unpadded_len(&plaintext));
        Ok(plaintext)
    }

    /// Logical length of a zero-padded buffer: index after the last non-zero byte
    pub fn unpadded_len(data: &[u8]) -> usize {
        data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1)
    }

    /// AES-128-CBC with a zero IV over whole blocks
    pub fn encrypt_blocks(key: &MasterKey, data: &[u8]) -> Result<Vec<u8>, CardError> {
        Self::check_blocks(data)?;
        debug!("AES-CBC encrypting {} bytes", data.len());
        let cipher = Aes128CbcEnc::new(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(&Self::ZERO_IV),
        );
        Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(data))
    }

    /// Inverse of [`Self::encrypt_blocks`]
    pub fn decrypt_blocks(key: &MasterKey, data: &[u8]) -> Result<Vec<u8>, CardError> {
        Self::check_blocks(data)?;
        debug!("AES-CBC decrypting {} bytes", data.len());
        let cipher = Aes128CbcDec::new(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(&Self::ZERO_IV),
        );
        cipher
            .decrypt_padded_vec_mut::<NoPadding>(data)
            .map_err(|e| CardError::Crypto(e.to_string()))
    }

    fn check_blocks(data: &[u8]) -> Result<(), CardError> {
        if data.len() % Self::BLOCK_SIZE != 0 {
            return Err(CardError::Crypto(format!(
                "data length {} is not a multiple of block size {}",
                data.len(),
                Self::BLOCK_SIZE
            )));
        }
        Ok(())
    }
}
