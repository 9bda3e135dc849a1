//! RSA Operations
//!
//! Per-card RSA-1024 keypair: generation, storage encoding, challenge
//! signing (PKCS#1 v1.5 over SHA-1) and public key export.

use log::debug;
use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use zeroize::Zeroize;

use crate::error::CardError;

/// Modulus size of the card keypair
pub const RSA_KEY_BITS: usize = 1024;

/// RSA Operations
pub struct RsaOperations;

impl RsaOperations {
    /// Generate a new RSA keypair
    pub fn generate_keypair(bits: usize) -> Result<RsaPrivateKey, CardError> {
        debug!("Generating RSA-{} keypair", bits);
        RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| CardError::Crypto(e.to_string()))
    }

    /// Encode a private key for the state file
    ///
    /// Format: for each of n, e, d, p, q: len(2) || big-endian bytes
    pub fn encode_private_key(key: &RsaPrivateKey) -> Result<Vec<u8>, CardError> {
        let primes = key.primes();
        if primes.len() != 2 {
            return Err(CardError::Crypto("expected two prime factors".to_string()));
        }

        let mut data = Vec::new();
        for component in [key.n(), key.e(), key.d(), &primes[0], &primes[1]] {
            let mut bytes = component.to_bytes_be();
            data.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            data.extend_from_slice(&bytes);
            bytes.zeroize();
        }
        Ok(data)
    }

    /// Decode a private key written by [`Self::encode_private_key`]
    pub fn decode_private_key(data: &[u8]) -> Result<RsaPrivateKey, CardError> {
        let mut offset = 0;
        let mut components = Vec::with_capacity(5);

        for name in ["n", "e", "d", "p", "q"] {
            if offset + 2 > data.len() {
                return Err(CardError::Crypto(format!("missing {name} length")));
            }
            let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
            offset += 2;
            if offset + len > data.len() {
                return Err(CardError::Crypto(format!("invalid {name} length")));
            }
            components.push(BigUint::from_bytes_be(&data[offset..offset + len]));
            offset += len;
        }

        let q = components.remove(4);
        let p = components.remove(3);
        let d = components.remove(2);
        let e = components.remove(1);
        let n = components.remove(0);
        RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| CardError::Crypto(e.to_string()))
    }

    /// Sign SHA-1(challenge) with PKCS#1 v1.5 padding
    pub fn sign_challenge(key: &RsaPrivateKey, challenge: &[u8]) -> Result<Vec<u8>, CardError> {
        if challenge.is_empty() {
            return Err(CardError::InvalidData("challenge must not be empty"));
        }
        let digest = Sha1::digest(challenge);
        let signature = key
            .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
            .map_err(|e| CardError::Crypto(e.to_string()))?;
        debug!("Signed {} byte challenge, signature {} bytes", challenge.len(), signature.len());
        Ok(signature)
    }

    /// Host-side check of a challenge signature
    pub fn verify_challenge(key: &RsaPublicKey, challenge: &[u8], signature: &[u8]) -> bool {
        let digest = Sha1::digest(challenge);
        key.verify(Pkcs1v15Sign::new::<Sha1>(), &digest, signature).is_ok()
    }

    /// Public key blob: expLen(2) || exponent || modLen(2) || modulus
    pub fn export_public_key(key: &RsaPublicKey) -> Vec<u8> {
        let e = key.e().to_bytes_be();
        let n = key.n().to_bytes_be();

        let mut data = Vec::with_capacity(4 + e.len() + n.len());
        data.extend_from_slice(&(e.len() as u16).to_be_bytes());
        data.extend_from_slice(&e);
        data.extend_from_slice(&(n.len() as u16).to_be_bytes());
        data.extend_from_slice(&n);
        data
    }

    /// Parse a public key blob produced by [`Self::export_public_key`]
    pub fn import_public_key(data: &[u8]) -> Option<RsaPublicKey> {
        if data.len() < 2 {
            return None;
        }
        let e_len = u16::from_be_bytes([data[0], data[1]]) as usize;
        let n_offset = 2 + e_len;
        if data.len() < n_offset + 2 {
            return None;
        }
        let n_len = u16::from_be_bytes([data[n_offset], data[n_offset + 1]]) as usize;
        if data.len() != n_offset + 2 + n_len {
            return None;
        }
        let e = BigUint::from_bytes_be(&data[2..n_offset]);
        let n = BigUint::from_bytes_be(&data[n_offset + 2..]);
        RsaPublicKey::new(n, e).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SIGNING_KEY;

    #[test]
    fn test_generated_key_size() {
        assert_eq!(SIGNING_KEY.size(), RSA_KEY_BITS / 8);
    }

    #[test]
    fn test_private_key_encoding() {
        let encoded = RsaOperations::encode_private_key(&SIGNING_KEY).unwrap();
        let decoded = RsaOperations::decode_private_key(&encoded).unwrap();
        assert_eq!(decoded, *SIGNING_KEY);

        assert!(RsaOperations::decode_private_key(&encoded[..encoded.len() - 1]).is_err());
        assert!(RsaOperations::decode_private_key(&[]).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let signature = RsaOperations::sign_challenge(&SIGNING_KEY, b"nonce-0001").unwrap();
        assert_eq!(signature.len(), 128);

        let public = RsaPublicKey::from(&*SIGNING_KEY);
        assert!(RsaOperations::verify_challenge(&public, b"nonce-0001", &signature));
        assert!(!RsaOperations::verify_challenge(&public, b"nonce-0002", &signature));
    }

    #[test]
    fn test_empty_challenge_rejected() {
        assert!(matches!(
            RsaOperations::sign_challenge(&SIGNING_KEY, b""),
            Err(CardError::InvalidData(_))
        ));
    }

    #[test]
    fn test_public_key_export_layout() {
        let public = RsaPublicKey::from(&*SIGNING_KEY);
        let blob = RsaOperations::export_public_key(&public);

        // 65537 = 01 00 01
        assert_eq!(&blob[..5], &[0x00, 0x03, 0x01, 0x00, 0x01]);
        assert_eq!(&blob[5..7], &[0x00, 0x80]);
        assert_eq!(blob.len(), 7 + 128);

        assert_eq!(RsaOperations::import_public_key(&blob), Some(public));
        assert_eq!(RsaOperations::import_public_key(&blob[..10]), None);
    }
}
