//! AES-128 key holders for the PIN key and the master key.
//!
//! Both wipe their bytes on drop and never print them.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-128 key size in bytes
pub const KEY_SIZE: usize = 16;

macro_rules! secret_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name {
            bytes: [u8; KEY_SIZE],
        }

        impl $name {
            pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self { bytes }
            }

            /// Copy from a slice; `None` unless it is exactly 16 bytes
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                let bytes: [u8; KEY_SIZE] = bytes.try_into().ok()?;
                Some(Self { bytes })
            }

            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.bytes
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

secret_key!(
    /// Key derived from the cardholder PIN and the card identity. Only ever
    /// wraps and unwraps the master key.
    PinKey
);

secret_key!(
    /// Random key protecting every stored field. Persisted only wrapped.
    MasterKey
);

impl PinKey {
    /// Constant-time comparison against a stored reference key
    pub fn matches(&self, reference: &[u8]) -> bool {
        ct_eq(&self.bytes, reference)
    }
}

impl MasterKey {
    /// Fresh random master key from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        key
    }
}

/// Compare without an early exit on the first differing byte
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
