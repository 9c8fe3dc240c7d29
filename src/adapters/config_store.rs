//! Configuration storage adapters.
//!
//! Both implement [`ConfigPort`] and validate on the way in and on the way
//! out, so a corrupted or hand-edited store can never hand the engine an
//! out-of-range parameter.
//!
//! - [`MemoryConfigStore`] keeps a postcard blob, the same encoding a
//!   flash-backed store would use.
//! - [`JsonConfigFile`] reads and writes a human-editable JSON file. Fields
//!   missing from the file take their defaults.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::EngineConfig;

// ───────────────────────────────────────────────────────────────
// In-memory postcard store
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryConfigStore {
    blob: RefCell<Option<Vec<u8>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes, if any.
    pub fn blob(&self) -> Option<Vec<u8>> {
        self.blob.borrow().clone()
    }

    /// Replace the stored bytes verbatim (tests use this to corrupt them).
    pub fn set_blob(&self, bytes: Vec<u8>) {
        *self.blob.borrow_mut() = Some(bytes);
    }
}

impl ConfigPort for MemoryConfigStore {
    fn load(&self) -> Result<EngineConfig, ConfigError> {
        match self.blob.borrow().as_deref() {
            Some(bytes) => {
                let cfg: EngineConfig =
                    postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                cfg.validate()?;
                info!("MemoryConfigStore: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            None => {
                info!("MemoryConfigStore: no stored config, using defaults");
                Ok(EngineConfig::default())
            }
        }
    }

    fn save(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        info!("MemoryConfigStore: config saved ({} bytes)", bytes.len());
        *self.blob.borrow_mut() = Some(bytes);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// JSON file
// ───────────────────────────────────────────────────────────────

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<EngineConfig, ConfigError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound,
            _ => {
                warn!("JsonConfigFile: cannot read {}: {e}", self.path.display());
                ConfigError::IoError
            }
        })?;
        let cfg: EngineConfig = serde_json::from_str(&text).map_err(|e| {
            warn!("JsonConfigFile: {} is not a valid config: {e}", self.path.display());
            ConfigError::Corrupted
        })?;
        cfg.validate()?;
        info!("JsonConfigFile: loaded {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let text = serde_json::to_string_pretty(config).map_err(|_| ConfigError::IoError)?;
        std::fs::write(&self.path, text).map_err(|e| {
            warn!("JsonConfigFile: cannot write {}: {e}", self.path.display());
            ConfigError::IoError
        })?;
        info!("JsonConfigFile: saved {}", self.path.display());
        Ok(())
    }
}
