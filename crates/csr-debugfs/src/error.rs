//! Errors reported to attribute readers and writers.

use std::path::PathBuf;

use csr_core::ProbeError;
use thiserror::Error;

/// Failure loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid configuration document.
    #[error("invalid configuration in {}: {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Error returned by attribute-tree operations.
#[derive(Debug, Error)]
pub enum AttrError {
    /// No node exists at the path.
    #[error("no such attribute: {0}")]
    NotFound(String),
    /// The node does not allow the requested access.
    #[error("attribute {0} is read-only")]
    PermissionDenied(String),
    /// Written text is not a valid value for the node.
    #[error("invalid value {value:?} for {path}")]
    InvalidValue {
        /// Node that was written.
        path: String,
        /// Text as written.
        value: String,
    },
    /// The probe refused or failed the access.
    #[error(transparent)]
    Probe(#[from] ProbeError),
    /// The configuration or register map could not be loaded.
    #[error(transparent)]
    RegisterMap(#[from] ConfigError),
}
