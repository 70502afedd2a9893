//! Attribute-tree front end for the control/status register prober.

/// Configuration documents and their loader.
pub mod config;
pub use config::{DebugfsConfig, TreeOptions};

/// Error types for tree operations and configuration loading.
pub mod error;
pub use error::{AttrError, ConfigError};

/// Node modes, operations and value parsing.
pub mod node;
pub use node::{parse_u64, Mode, Node, NodeOps};

/// Read sessions with text fixed at open.
pub mod session;
pub use session::Session;

/// Path-addressed node tree.
pub mod tree;
pub use tree::AttrTree;

#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
