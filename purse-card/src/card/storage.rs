//! Card state storage
//!
//! Persists [`CardState`] as JSON. A store created without a directory keeps
//! the state in RAM only.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use super::state::CardState;

/// Errors raised while reading or writing the state file
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handles persistent storage of card state
#[derive(Debug)]
pub struct CardDataStore {
    state_file: Option<PathBuf>,
    pub state: CardState,
}

impl CardDataStore {
    const DEFAULT_STATE_FILE: &'static str = "card_state.json";

    /// Create a store backed by `<storage_dir>/card_state.json`, or a
    /// RAM-only store when no directory is given
    pub fn new(storage_dir: Option<&Path>) -> Self {
        Self {
            state_file: storage_dir.map(|dir| dir.join(Self::DEFAULT_STATE_FILE)),
            state: CardState::default(),
        }
    }

    /// RAM-only store
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Whether the store writes to disk
    pub fn is_persistent(&self) -> bool {
        self.state_file.is_some()
    }

    /// Load card state from storage
    ///
    /// Returns true if state was loaded, false if a fresh state was created.
    /// An unreadable or corrupt file is reported and replaced by a fresh state.
    pub fn load(&mut self) -> bool {
        let Some(path) = &self.state_file else {
            return false;
        };
        if !path.exists() {
            info!("No existing card state, creating new");
            self.state = CardState::default();
            return false;
        }

        match Self::read_state(path) {
            Ok(state) => {
                self.state = state;
                info!("Loaded card state from {:?}", path);
                true
            }
            Err(e) => {
                warn!("Failed to load card state: {}", e);
                self.state = CardState::default();
                false
            }
        }
    }

    fn read_state(path: &Path) -> Result<CardState, StorageError> {
        let content = fs::read_to_string(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save card state to storage
    pub fn save(&self) -> Result<(), StorageError> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        let io_err = |source| StorageError::Io {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;

        // The file holds the wrapped master key and its unwrapping key, so it
        // is created owner-only and never exists with wider permissions
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(io_err)?;
        #[cfg(unix)]
        {
            // A file from an older run may predate the mode above
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }
        file.write_all(json.as_bytes()).map_err(io_err)?;
        debug!("Saved card state to {:?}", path);
        Ok(())
    }

    /// Get a reference to the current card state
    pub fn get_state(&self) -> &CardState {
        &self.state
    }

    /// Get a mutable reference to the current card state
    pub fn get_state_mut(&mut self) -> &mut CardState {
        &mut self.state
    }
}
