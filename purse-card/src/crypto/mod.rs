//! Cryptographic Operations
//!
//! Primitives used by the purse applet: the PIN-based KDF, AES-128 key
//! wrapping and field encryption, and RSA challenge signing.

pub mod aes;
pub mod kdf;
pub mod keys;
pub mod rsa;

pub use self::aes::AesOperations;
pub use self::kdf::{derive, hmac_sha1, DEFAULT_KDF_ITERATIONS};
pub use self::keys::{MasterKey, PinKey, KEY_SIZE};
pub use self::rsa::RsaOperations;
