//! PIN key derivation
//!
//! PBKDF2 over HMAC-SHA1, restricted to the first 20-byte output block and
//! truncated to an AES-128 key:
//!
//! ```text
//! U1 = HMAC(password, salt || BE32(1))
//! Ui = HMAC(password, U(i-1))            for i = 2..=iterations
//! K  = (U1 ^ U2 ^ ... ^ Un)[..16]
//! ```
//!
//! The iteration count is an engine constant kept low so a verify stays
//! interactive on card-class hardware. Hosts running on ordinary CPUs should
//! raise it through `EngineConfig::kdf_iterations`; it trades brute-force
//! cost per PIN guess against verify latency.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroize;

use super::keys::{PinKey, KEY_SIZE};
use crate::card::MAX_IDENTITY_LEN;
use crate::error::CardError;

type HmacSha1 = Hmac<Sha1>;

/// HMAC-SHA1 output size
pub const MAC_SIZE: usize = 20;

/// Default PBKDF2 iteration count
pub const DEFAULT_KDF_ITERATIONS: u16 = 100;

/// HMAC-SHA1 with the standard inner/outer construction (64-byte block,
/// longer keys are hashed first)
pub fn hmac_sha1(key: &[u8], data: &[u8]) -> Result<[u8; MAC_SIZE], CardError> {
    let mut mac = new_mac(key)?;
    mac.update(data);
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn new_mac(key: &[u8]) -> Result<HmacSha1, CardError> {
    <HmacSha1 as Mac>::new_from_slice(key).map_err(|e| CardError::Crypto(e.to_string()))
}

/// Derive the 16-byte PIN key from `password` and `salt`
pub fn derive(password: &[u8], salt: &[u8], iterations: u16) -> Result<PinKey, CardError> {
    if salt.is_empty() || salt.len() > MAX_IDENTITY_LEN {
        return Err(CardError::InvalidData("KDF salt must be 1..=50 bytes"));
    }
    if iterations == 0 {
        return Err(CardError::InvalidData("KDF iterations must be non-zero"));
    }

    let prf = new_mac(password)?;

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u = [0u8; MAC_SIZE];
    u.copy_from_slice(&mac.finalize().into_bytes());
    let mut acc = u;

    for _ in 1..iterations {
        let mut mac = prf.clone();
        mac.update(&u);
        u.copy_from_slice(&mac.finalize().into_bytes());
        acc.iter_mut().zip(u.iter()).for_each(|(a, b)| *a ^= b);
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&acc[..KEY_SIZE]);
    let pin_key = PinKey::from_bytes(key);

    u.zeroize();
    acc.zeroize();
    key.zeroize();
    Ok(pin_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha1::{Digest, Sha1};

    fn derive_hex(password: &[u8], salt: &[u8], iterations: u16) -> String {
        hex::encode(derive(password, salt, iterations).unwrap().as_bytes())
    }

    #[test]
    fn test_known_answers() {
        assert_eq!(derive_hex(b"1234", b"CARD001", 1), "7dd7b46014c61c5531d301c44cbff6d4");
        assert_eq!(derive_hex(b"1234", b"CARD001", 2), "ecf4ff754b6f60d2cf4c24c24b4d1470");
        assert_eq!(derive_hex(b"1234", b"CARD001", 1000), "c073717b66bde9bade9a45119069ec21");
    }

    #[test]
    fn test_rfc6070_prefix() {
        // RFC 6070 vectors, first 16 bytes
        assert_eq!(derive_hex(b"password", b"salt", 1), "0c60c80f961f0e71f3a9b524af601206");
        assert_eq!(derive_hex(b"password", b"salt", 2), "ea6c014dc72d6f8ccd1ed92ace1d41f0");
    }

    #[test]
    fn test_matches_pbkdf2_crate() {
        for iterations in [1u16, 7, 100, 513] {
            let mut expected = [0u8; KEY_SIZE];
            pbkdf2::pbkdf2_hmac::<Sha1>(b"0000", b"some-card", iterations as u32, &mut expected);
            assert_eq!(derive(b"0000", b"some-card", iterations).unwrap().as_bytes(), &expected);
        }
    }

    #[test]
    fn test_deterministic() {
        let a = derive(b"4321", b"CARD002", 100).unwrap();
        let b = derive(b"4321", b"CARD002", 100).unwrap();
        let c = derive(b"4321", b"CARD003", 100).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn test_long_key_is_prehashed() {
        let long_key = [0x5Au8; 100];
        let hashed_key = Sha1::digest(long_key);
        assert_eq!(
            hmac_sha1(&long_key, b"msg").unwrap(),
            hmac_sha1(&hashed_key, b"msg").unwrap()
        );
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(derive(b"1234", b"", 1).is_err());
        assert!(derive(b"1234", &[0x41; 51], 1).is_err());
        assert!(derive(b"1234", b"CARD001", 0).is_err());
    }
}
