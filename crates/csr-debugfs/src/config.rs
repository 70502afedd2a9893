//! Configuration file loading.
//!
//! A configuration is a JSON document holding the probe settings plus the
//! tree options. Every field is optional:
//!
//! ```json
//! {
//!   "units": 8,
//!   "initial_mask": 0,
//!   "dispatch": "direct",
//!   "registers": [
//!     { "id": 48, "name": "SAVE0", "reset": 0, "writable": 18446744073709551615,
//!       "unit_indexed": false }
//!   ],
//!   "tree": { "legacy_poke_nodes": false }
//! }
//! ```

use std::path::Path;

use csr_core::ProbeConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which optional node families the tree exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TreeOptions {
    /// Expose the flat `poke-<id>` nodes next to `poke/<id>`.
    pub legacy_poke_nodes: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            legacy_poke_nodes: true,
        }
    }
}

/// Full configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DebugfsConfig {
    /// Probe settings.
    #[serde(flatten)]
    pub probe: ProbeConfig,
    /// Tree layout options.
    pub tree: TreeOptions,
}

impl DebugfsConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed documents.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not a valid document.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
