//! Chunked avatar transfer
//!
//! Uploads arrive as `(total_len, offset, bytes)` chunks that are copied
//! into a fixed assembly buffer; the final chunk seals the first `total_len`
//! bytes under the master key. Downloads either return the whole avatar
//! (segmented by the dispatcher) or one chunk of at most
//! [`AVATAR_CHUNK_MAX`] bytes at an arbitrary offset.

use log::debug;
use zeroize::Zeroize;

use crate::buffer::FixedBuffer;
use crate::card::CardState;
use crate::crypto::{AesOperations, MasterKey};
use crate::error::CardError;

/// Largest avatar plaintext
pub const MAX_AVATAR_LEN: usize = 15360;

/// Largest random-access download chunk
pub const AVATAR_CHUNK_MAX: usize = 200;

/// One upload call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarChunk {
    /// Declared avatar length; the value on the final chunk is the one used
    pub total_len: u16,
    pub offset: u16,
    pub bytes: Vec<u8>,
    pub is_final: bool,
}

/// Result of accepting a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Stored in the assembly buffer; more chunks expected
    Pending,
    /// Final chunk sealed and committed as the card's avatar
    Committed { ciphertext_len: u16 },
}

/// One random-access download chunk. Empty `data` marks end of avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarSlice {
    pub total_len: u16,
    pub data: Vec<u8>,
}

impl AvatarSlice {
    /// Wire form: `BE16 total ∥ BE16 chunkLen ∥ data`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.data.len());
        out.extend_from_slice(&self.total_len.to_be_bytes());
        out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Upload assembly state. Not persisted. Sealing or a reset wipes it; an
/// upload abandoned without either leaves its bytes for the next one.
#[derive(Debug)]
pub struct AvatarTransfer {
    assembly: FixedBuffer,
}

impl Default for AvatarTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl AvatarTransfer {
    pub fn new() -> Self {
        Self {
            assembly: FixedBuffer::new(MAX_AVATAR_LEN),
        }
    }

    /// Bounds-check one chunk and copy it into the assembly buffer. Only
    /// this chunk's own `total_len` is checked.
    pub fn accept(&mut self, chunk: &AvatarChunk) -> Result<(), CardError> {
        let total_len = chunk.total_len as usize;
        if total_len > MAX_AVATAR_LEN {
            return Err(CardError::WrongLength("avatar exceeds 15360 bytes"));
        }
        let end = chunk.offset as usize + chunk.bytes.len();
        if end > total_len {
            return Err(CardError::InvalidData("chunk extends past declared avatar length"));
        }
        self.assembly
            .write_at(chunk.offset as usize, &chunk.bytes)
            .map_err(|_| CardError::InvalidData("chunk outside assembly buffer"))?;
        debug!("Avatar chunk accepted: {} bytes at {}", chunk.bytes.len(), chunk.offset);
        Ok(())
    }

    /// Zero-pad and encrypt the first `total_len` assembled bytes, then wipe
    /// the assembly so the next upload starts from zeros
    pub fn seal(&mut self, key: &MasterKey, total_len: u16) -> Result<Vec<u8>, CardError> {
        let sealed = self
            .assembly
            .view(0, total_len as usize)
            .map_err(|_| CardError::WrongLength("avatar exceeds 15360 bytes"))
            .and_then(|plaintext| AesOperations::encrypt_field(key, plaintext));
        self.assembly.wipe();
        sealed
    }

    /// Wipe the assembly buffer
    pub fn discard(&mut self) {
        self.assembly.wipe();
    }

    /// Whole stored avatar, trailing zeros stripped
    pub fn read_whole(card: &CardState, key: &MasterKey) -> Result<Vec<u8>, CardError> {
        if card.encrypted_avatar.is_empty() {
            return Ok(Vec::new());
        }
        AesOperations::decrypt_field(key, &card.encrypted_avatar)
    }

    /// Up to [`AVATAR_CHUNK_MAX`] bytes starting at `offset`. Decrypts the
    /// whole avatar on every call.
    pub fn read_chunk(card: &CardState, key: &MasterKey, offset: u16) -> Result<AvatarSlice, CardError> {
        let mut avatar = Self::read_whole(card, key)?;
        let total_len = avatar.len();
        let start = (offset as usize).min(total_len);
        let end = (start + AVATAR_CHUNK_MAX).min(total_len);
        let slice = AvatarSlice {
            total_len: total_len as u16,
            data: avatar[start..end].to_vec(),
        };
        avatar.zeroize();
        Ok(slice)
    }
}
