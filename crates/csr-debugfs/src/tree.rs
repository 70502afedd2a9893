//! The attribute tree.
//!
//! ```text
//! mask, poke/mask         rw  poke operand, 0x%016x
//! csr                     rw  patch-buffer target, decimal
//! csr-read, csr-poke      ro  invoke the patch buffer
//! read/<id>               ro  read on the caller's unit
//! poke/<id>, poke-<id>    ro  poke with the current mask on the caller's unit
//! global/read/<id>        ro  read on every active unit
//! global/poke/<id>        ro  poke on every active unit
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use csr_core::{AccessKind, CsrProbe, RegisterId, Task};
use log::{debug, info};

use crate::config::{DebugfsConfig, TreeOptions};
use crate::error::AttrError;
use crate::node::{
    AccessAttr, GlobalAttr, MaskAttr, Mode, Node, NodeOps, SelectAttr, SelectedAttr,
};
use crate::session::Session;

/// Path-addressed nodes over one probe.
pub struct AttrTree {
    probe: Arc<CsrProbe>,
    nodes: BTreeMap<String, Node>,
}

impl std::fmt::Debug for AttrTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttrTree")
            .field("probe", &self.probe)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

fn family(nodes: &mut BTreeMap<String, Node>, prefix: &str, ops: &Arc<dyn NodeOps>) {
    for id in RegisterId::all() {
        nodes.insert(
            format!("{prefix}{id}"),
            Node {
                mode: Mode::ReadOnly,
                data: u64::from(id.get()),
                ops: Arc::clone(ops),
            },
        );
    }
}

fn single(nodes: &mut BTreeMap<String, Node>, path: &str, mode: Mode, ops: Arc<dyn NodeOps>) {
    nodes.insert(path.to_owned(), Node { mode, data: 0, ops });
}

impl AttrTree {
    /// Builds every node over `probe`.
    #[must_use]
    pub fn new(probe: Arc<CsrProbe>, options: TreeOptions) -> Self {
        let mut nodes = BTreeMap::new();
        let mask: Arc<dyn NodeOps> = Arc::new(MaskAttr);
        single(&mut nodes, "mask", Mode::ReadWrite, Arc::clone(&mask));
        single(&mut nodes, "poke/mask", Mode::ReadWrite, mask);
        single(&mut nodes, "csr", Mode::ReadWrite, Arc::new(SelectAttr));
        single(
            &mut nodes,
            "csr-read",
            Mode::ReadOnly,
            Arc::new(SelectedAttr(AccessKind::Read)),
        );
        single(
            &mut nodes,
            "csr-poke",
            Mode::ReadOnly,
            Arc::new(SelectedAttr(AccessKind::Poke)),
        );

        let read: Arc<dyn NodeOps> = Arc::new(AccessAttr(AccessKind::Read));
        let poke: Arc<dyn NodeOps> = Arc::new(AccessAttr(AccessKind::Poke));
        family(&mut nodes, "read/", &read);
        family(&mut nodes, "poke/", &poke);
        if options.legacy_poke_nodes {
            family(&mut nodes, "poke-", &poke);
        }

        let global_read: Arc<dyn NodeOps> = Arc::new(GlobalAttr(AccessKind::Read));
        let global_poke: Arc<dyn NodeOps> = Arc::new(GlobalAttr(AccessKind::Poke));
        family(&mut nodes, "global/read/", &global_read);
        family(&mut nodes, "global/poke/", &global_poke);

        info!("attribute tree ready with {} nodes", nodes.len());
        Self { probe, nodes }
    }

    /// Brings up a probe from `config` and builds its tree.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::Probe`] when the probe cannot be brought up;
    /// no tree exists in that case.
    pub fn from_config(config: DebugfsConfig) -> Result<Self, AttrError> {
        let probe = CsrProbe::new(config.probe)?;
        Ok(Self::new(Arc::new(probe), config.tree))
    }

    /// Loads a configuration file and builds the tree it describes.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::RegisterMap`] for unreadable or malformed files,
    /// or [`AttrError::Probe`] for bring-up failures.
    pub fn load(path: &Path) -> Result<Self, AttrError> {
        Self::from_config(DebugfsConfig::load(path)?)
    }

    /// The probe behind the tree.
    #[must_use]
    pub const fn probe(&self) -> &Arc<CsrProbe> {
        &self.probe
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` for a tree without nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` when a node exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Paths starting with `prefix`, in lexical order.
    pub fn paths<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes
            .range(prefix.to_owned()..)
            .map(|(path, _)| path.as_str())
            .take_while(move |path| path.starts_with(prefix))
    }

    /// Access mode of the node at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::NotFound`] for unknown paths.
    pub fn mode(&self, path: &str) -> Result<Mode, AttrError> {
        self.node(path).map(|node| node.mode)
    }

    /// Opens `path` for reading on behalf of `task`.
    ///
    /// The node's text is produced now and kept by the session.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::NotFound`] or the failure of the access the
    /// node performs.
    pub fn open(&self, path: &str, task: &Task) -> Result<Session, AttrError> {
        let node = self.node(path)?;
        let text = node.ops.show(&self.probe, task, node.data)?;
        Ok(Session::new(path.to_owned(), text))
    }

    /// Opens `path` and returns its whole text.
    ///
    /// # Errors
    ///
    /// See [`AttrTree::open`].
    pub fn read_to_string(&self, path: &str, task: &Task) -> Result<String, AttrError> {
        self.open(path, task)
            .map(|session| session.contents().to_owned())
    }

    /// Writes `text` to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::NotFound`], [`AttrError::PermissionDenied`] for
    /// read-only nodes, [`AttrError::InvalidValue`] for unparsable text, or
    /// the probe failure the write triggered.
    pub fn write(&self, path: &str, text: &str) -> Result<(), AttrError> {
        let node = self.node(path)?;
        if node.mode != Mode::ReadWrite {
            return Err(AttrError::PermissionDenied(path.to_owned()));
        }
        debug!("write {path} <- {:?}", text.trim());
        node.ops.store(&self.probe, node.data, text)
    }

    fn node(&self, path: &str) -> Result<&Node, AttrError> {
        self.nodes
            .get(path.trim_matches('/'))
            .ok_or_else(|| AttrError::NotFound(path.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use csr_core::{CsrProbe, ProbeConfig, REGISTER_ID_COUNT};

    use super::AttrTree;
    use crate::config::TreeOptions;
    use crate::node::Mode;

    fn tree(options: TreeOptions) -> AttrTree {
        let probe = CsrProbe::new(ProbeConfig {
            units: 2,
            ..ProbeConfig::default()
        })
        .expect("probe");
        AttrTree::new(Arc::new(probe), options)
    }

    #[test]
    fn node_families_cover_every_id() {
        let tree = tree(TreeOptions::default());
        assert_eq!(tree.len(), 5 + 5 * REGISTER_ID_COUNT);
        assert_eq!(tree.paths("global/read/").count(), REGISTER_ID_COUNT);
        assert!(tree.contains("poke-16383"));
        assert!(!tree.contains("read/16384"));
    }

    #[test]
    fn legacy_nodes_are_optional() {
        let tree = tree(TreeOptions {
            legacy_poke_nodes: false,
        });
        assert_eq!(tree.len(), 5 + 4 * REGISTER_ID_COUNT);
        assert!(!tree.contains("poke-0"));
    }

    #[test]
    fn modes_follow_the_layout() {
        let tree = tree(TreeOptions::default());
        assert_eq!(tree.mode("mask").expect("mask"), Mode::ReadWrite);
        assert_eq!(tree.mode("csr").expect("csr"), Mode::ReadWrite);
        assert_eq!(tree.mode("poke/mask").expect("alias"), Mode::ReadWrite);
        assert_eq!(tree.mode("/read/32").expect("read"), Mode::ReadOnly);
        assert!(tree.mode("write/32").is_err());
    }
}
