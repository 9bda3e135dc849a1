//! Shared test fixtures
//!
//! RSA key generation dominates test time, so every applet built here
//! reuses one keypair per test binary.

use once_cell::sync::Lazy;
use rsa::RsaPrivateKey;

use crate::apdu::Pin;
use crate::card::{CardDataStore, CardIdentity};
use crate::config::EngineConfig;
use crate::crypto::rsa::RSA_KEY_BITS;
use crate::crypto::RsaOperations;
use crate::purse::PurseApplet;

pub(crate) static SIGNING_KEY: Lazy<RsaPrivateKey> = Lazy::new(|| {
    RsaOperations::generate_keypair(RSA_KEY_BITS).expect("RSA key generation failed")
});

pub(crate) fn pin(digits: &str) -> Pin {
    Pin::new(digits.as_bytes()).expect("test PIN must be 4 digits")
}

/// Defaults with a cheap KDF
pub(crate) fn test_config() -> EngineConfig {
    EngineConfig {
        kdf_iterations: 10,
        ..EngineConfig::default()
    }
}

/// Fresh applet over the configured store, using the shared keypair
pub(crate) fn applet_with_config(config: EngineConfig) -> PurseApplet {
    let store = CardDataStore::new(config.storage_dir.as_deref());
    PurseApplet::new(store, config)
        .with_signing_key(&SIGNING_KEY)
        .expect("shared key encodes")
}

pub(crate) fn test_applet() -> PurseApplet {
    applet_with_config(test_config())
}

/// Applet provisioned with PIN "1234" and identity "CARD001"
pub(crate) fn provisioned_applet() -> PurseApplet {
    let mut applet = test_applet();
    applet
        .provision(&pin("1234"), CardIdentity::new(b"CARD001").expect("valid identity"))
        .expect("provisioning succeeds");
    applet
}
