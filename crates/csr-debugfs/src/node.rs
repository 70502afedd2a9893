//! Attribute nodes and the callbacks behind them.
//!
//! Every node carries an access mode, one word of private data (the
//! register id for per-id nodes) and a shared set of operations. Nodes of
//! the same family share one operations object.

use std::sync::Arc;

use csr_core::{format_value, AccessKind, CsrProbe, RegisterId, Task};
use log::debug;

use crate::error::AttrError;

/// Access permitted on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// Callbacks behind a node.
pub trait NodeOps: Send + Sync {
    /// Produces the node's text for a read session.
    ///
    /// # Errors
    ///
    /// Returns the probe failure behind the read.
    fn show(&self, probe: &CsrProbe, task: &Task, data: u64) -> Result<String, AttrError>;

    /// Applies written text. Read-only families keep the default.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::InvalidValue`] for unparsable text or the probe
    /// failure behind the write.
    fn store(&self, _probe: &CsrProbe, _data: u64, _text: &str) -> Result<(), AttrError> {
        Err(AttrError::PermissionDenied(String::new()))
    }
}

/// One entry of the attribute tree.
#[derive(Clone)]
pub struct Node {
    /// Permitted access.
    pub mode: Mode,
    /// Private word handed to the operations.
    pub data: u64,
    /// Shared operations of the node family.
    pub ops: Arc<dyn NodeOps>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("mode", &self.mode)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Parses an unsigned value written as `0x`-prefixed hex or decimal.
#[must_use]
pub fn parse_u64(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn register_id(data: u64) -> RegisterId {
    RegisterId::new(data as u16)
}

/// `mask`: the poke operand.
#[derive(Debug, Default)]
pub struct MaskAttr;

impl NodeOps for MaskAttr {
    fn show(&self, probe: &CsrProbe, _task: &Task, _data: u64) -> Result<String, AttrError> {
        Ok(format_value(probe.mask()))
    }

    fn store(&self, probe: &CsrProbe, _data: u64, text: &str) -> Result<(), AttrError> {
        let mask = parse_u64(text).ok_or_else(|| AttrError::InvalidValue {
            path: "mask".to_owned(),
            value: text.to_owned(),
        })?;
        probe.set_mask(mask);
        debug!("mask set to {mask:#018x}");
        Ok(())
    }
}

/// `csr`: the register selected for the patch buffer.
#[derive(Debug, Default)]
pub struct SelectAttr;

impl NodeOps for SelectAttr {
    fn show(&self, probe: &CsrProbe, _task: &Task, _data: u64) -> Result<String, AttrError> {
        let id = probe.selection().current_id.map_or(0, RegisterId::get);
        Ok(format!("{id}\n"))
    }

    fn store(&self, probe: &CsrProbe, _data: u64, text: &str) -> Result<(), AttrError> {
        let raw: u64 = text.trim().parse().map_err(|_| AttrError::InvalidValue {
            path: "csr".to_owned(),
            value: text.to_owned(),
        })?;
        probe.select(register_id(raw))?;
        Ok(())
    }
}

/// `csr-read` / `csr-poke`: invoke the patch buffer.
#[derive(Debug)]
pub struct SelectedAttr(pub AccessKind);

impl NodeOps for SelectedAttr {
    fn show(&self, probe: &CsrProbe, task: &Task, _data: u64) -> Result<String, AttrError> {
        let value = match self.0 {
            AccessKind::Read => probe.read_selected(task)?,
            AccessKind::Poke => probe.poke_selected(task)?,
        };
        Ok(format_value(value))
    }
}

/// `read/<id>`, `poke/<id>` and `poke-<id>`: single-unit access.
#[derive(Debug)]
pub struct AccessAttr(pub AccessKind);

impl NodeOps for AccessAttr {
    fn show(&self, probe: &CsrProbe, task: &Task, data: u64) -> Result<String, AttrError> {
        let id = register_id(data);
        let value = match self.0 {
            AccessKind::Read => probe.read(task, id)?,
            AccessKind::Poke => probe.poke(task, id)?,
        };
        Ok(format_value(value))
    }
}

/// `global/read/<id>` and `global/poke/<id>`: whole-machine snapshot.
#[derive(Debug)]
pub struct GlobalAttr(pub AccessKind);

impl NodeOps for GlobalAttr {
    fn show(&self, probe: &CsrProbe, _task: &Task, data: u64) -> Result<String, AttrError> {
        let id = register_id(data);
        let report = match self.0 {
            AccessKind::Read => probe.global_read(id)?,
            AccessKind::Poke => probe.global_poke(id)?,
        };
        Ok(report)
    }
}
