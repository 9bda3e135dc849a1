//! Engine configuration
//!
//! Defaults suit a card-class device. Hosts can overlay environment
//! variables with [`EngineConfig::from_env`] or load a JSON file with
//! [`EngineConfig::from_json`].

use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::DEFAULT_KDF_ITERATIONS;

/// Default number of PIN attempts before lockout
pub const DEFAULT_MAX_PIN_TRIES: u8 = 5;

/// Default response segment size (short APDU)
pub const DEFAULT_MAX_RESPONSE_LEN: usize = 256;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Tunables of one purse engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// PBKDF2 iterations for the PIN key
    pub kdf_iterations: u16,
    /// PIN attempts before lockout (1..=15, reported in a 63Cx nibble)
    pub max_pin_tries: u8,
    /// Longest single response; longer data continues via GET RESPONSE
    pub max_response_len: usize,
    /// Directory of the state file; `None` keeps state in RAM
    pub storage_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            max_pin_tries: DEFAULT_MAX_PIN_TRIES,
            max_response_len: DEFAULT_MAX_RESPONSE_LEN,
            storage_dir: None,
        }
    }
}

impl EngineConfig {
    pub const STORAGE_DIR_ENV: &'static str = "PURSE_CARD_STORAGE_DIR";
    pub const KDF_ITERATIONS_ENV: &'static str = "PURSE_CARD_KDF_ITERATIONS";
    pub const MAX_TRIES_ENV: &'static str = "PURSE_CARD_MAX_TRIES";

    /// Defaults overlaid with `PURSE_CARD_*` environment variables. Without
    /// `PURSE_CARD_STORAGE_DIR` the state lives in `~/.purse-card`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.storage_dir = match lookup(Self::STORAGE_DIR_ENV) {
            Some(dir) => Some(PathBuf::from(dir)),
            None => dirs::home_dir().map(|home| home.join(".purse-card")),
        };

        if let Some(value) = lookup(Self::KDF_ITERATIONS_ENV) {
            match value.parse::<u16>() {
                Ok(n) if n > 0 => config.kdf_iterations = n,
                _ => warn!("Ignoring invalid {}={:?}", Self::KDF_ITERATIONS_ENV, value),
            }
        }
        if let Some(value) = lookup(Self::MAX_TRIES_ENV) {
            match value.parse::<u8>() {
                Ok(n) if (1..=15).contains(&n) => config.max_pin_tries = n,
                _ => warn!("Ignoring invalid {}={:?}", Self::MAX_TRIES_ENV, value),
            }
        }
        config
    }

    /// Parse and validate a JSON config; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kdf_iterations == 0 {
            return Err(ConfigError::Invalid("kdf_iterations must be at least 1"));
        }
        if !(1..=15).contains(&self.max_pin_tries) {
            return Err(ConfigError::Invalid("max_pin_tries must be 1..=15"));
        }
        if !(1..=65536).contains(&self.max_response_len) {
            return Err(ConfigError::Invalid("max_response_len must be 1..=65536"));
        }
        Ok(())
    }

    /// Pull every tunable into its valid range, warning about each change
    pub fn clamped(mut self) -> Self {
        if self.kdf_iterations == 0 {
            warn!("kdf_iterations 0 raised to 1");
            self.kdf_iterations = 1;
        }
        let tries = self.max_pin_tries.clamp(1, 15);
        if tries != self.max_pin_tries {
            warn!("max_pin_tries {} clamped to {}", self.max_pin_tries, tries);
            self.max_pin_tries = tries;
        }
        let response_len = self.max_response_len.clamp(1, 65536);
        if response_len != self.max_response_len {
            warn!("max_response_len {} clamped to {}", self.max_response_len, response_len);
            self.max_response_len = response_len;
        }
        self
    }
}
