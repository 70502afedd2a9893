//! Operator-facing probe.
//!
//! [`CsrProbe`] owns the machine, the broadcast workers and the
//! `(current id, mask)` selection, and exposes the read, poke and snapshot
//! operations the attribute tree calls.

use std::sync::Arc;

use log::{debug, info};
use spin::Mutex;

use crate::broadcast::BroadcastSnapshot;
use crate::machine::Machine;
use crate::memory::{AlwaysGrant, PageProtector};
use crate::report::format_report;
use crate::unit::Task;
use crate::{AccessKind, AccessOp, ProbeConfig, ProbeError, RegisterId, TraceSink};

/// The `(current id, mask)` pair set through configuration writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    /// Register the patch buffer targets, `None` until first selected.
    pub current_id: Option<RegisterId>,
    /// Operand of every poke.
    pub mask: u64,
}

/// Control/status register prober over a simulated machine.
pub struct CsrProbe {
    config: ProbeConfig,
    selection: Mutex<Selection>,
    broadcast: BroadcastSnapshot,
    machine: Arc<Machine>,
}

impl std::fmt::Debug for CsrProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrProbe")
            .field("config", &self.config)
            .field("selection", &self.selection())
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

impl CsrProbe {
    /// Brings up a probe whose protection transitions always succeed.
    ///
    /// # Errors
    ///
    /// See [`CsrProbe::with_hooks`].
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        Self::with_hooks(config, Arc::new(AlwaysGrant), None)
    }

    /// Brings up a probe with an explicit protector and trace sink.
    ///
    /// Nothing is left running when bring-up fails.
    ///
    /// # Errors
    ///
    /// Returns the allocation, protection or worker start-up failure.
    pub fn with_hooks(
        config: ProbeConfig,
        protector: Arc<dyn PageProtector>,
        trace: Option<Arc<dyn TraceSink>>,
    ) -> Result<Self, ProbeError> {
        let machine = Arc::new(Machine::new(&config, protector, trace)?);
        let broadcast = BroadcastSnapshot::new(Arc::clone(&machine))?;
        info!(
            "csr probe up: {} units, {:?} dispatch, {} registers mapped",
            config.units,
            config.dispatch,
            config.registers.len()
        );

        Ok(Self {
            selection: Mutex::new(Selection {
                current_id: None,
                mask: config.initial_mask,
            }),
            config,
            broadcast,
            machine,
        })
    }

    /// Configuration the probe was built from.
    #[must_use]
    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// The underlying machine.
    #[must_use]
    pub const fn machine(&self) -> &Arc<Machine> {
        &self.machine
    }

    /// Current selection.
    #[must_use]
    pub fn selection(&self) -> Selection {
        *self.selection.lock()
    }

    /// Current poke mask.
    #[must_use]
    pub fn mask(&self) -> u64 {
        self.selection.lock().mask
    }

    /// Replaces the poke mask.
    pub fn set_mask(&self, mask: u64) {
        self.selection.lock().mask = mask;
    }

    /// Selects `id` and retargets the patch buffer to it.
    ///
    /// # Errors
    ///
    /// Returns the retarget failure; the previous selection stays in force.
    pub fn select(&self, id: RegisterId) -> Result<(), ProbeError> {
        let mut selection = self.selection.lock();
        self.machine.retarget(id)?;
        selection.current_id = Some(id);
        debug!("selected csr {id}");
        Ok(())
    }

    /// Reads `id` on `task`'s unit.
    ///
    /// # Errors
    ///
    /// Returns the serializer refusal or execution fault.
    pub fn read(&self, task: &Task, id: RegisterId) -> Result<u64, ProbeError> {
        self.machine
            .execute(task, AccessOp::Read(id), self.config.dispatch)
    }

    /// Pokes `id` with the current mask on `task`'s unit.
    ///
    /// # Errors
    ///
    /// Returns the serializer refusal or execution fault.
    pub fn poke(&self, task: &Task, id: RegisterId) -> Result<u64, ProbeError> {
        self.poke_with(task, id, self.mask())
    }

    /// Pokes `id` with an explicit `mask` on `task`'s unit.
    ///
    /// # Errors
    ///
    /// Returns the serializer refusal or execution fault.
    pub fn poke_with(&self, task: &Task, id: RegisterId, mask: u64) -> Result<u64, ProbeError> {
        self.machine
            .execute(task, AccessOp::Poke(id, mask), self.config.dispatch)
    }

    /// Reads the selected register through the patch buffer.
    ///
    /// # Errors
    ///
    /// Faults with a breakpoint until a register has been selected.
    pub fn read_selected(&self, task: &Task) -> Result<u64, ProbeError> {
        self.machine.execute_patched(task, AccessKind::Read, 0)
    }

    /// Pokes the selected register through the patch buffer.
    ///
    /// # Errors
    ///
    /// Faults with a breakpoint until a register has been selected.
    pub fn poke_selected(&self, task: &Task) -> Result<u64, ProbeError> {
        self.machine
            .execute_patched(task, AccessKind::Poke, self.mask())
    }

    /// Runs `op` on every active unit.
    ///
    /// # Errors
    ///
    /// See [`BroadcastSnapshot::run`].
    pub fn snapshot(&self, op: AccessOp) -> Result<Vec<(usize, u64)>, ProbeError> {
        self.broadcast.run(op, self.config.dispatch)
    }

    /// Reads `id` on every active unit and renders the report.
    ///
    /// # Errors
    ///
    /// See [`BroadcastSnapshot::run`].
    pub fn global_read(&self, id: RegisterId) -> Result<String, ProbeError> {
        Ok(format_report(&self.snapshot(AccessOp::Read(id))?))
    }

    /// Pokes `id` with the current mask on every active unit and renders
    /// the report.
    ///
    /// # Errors
    ///
    /// See [`BroadcastSnapshot::run`].
    pub fn global_poke(&self, id: RegisterId) -> Result<String, ProbeError> {
        let mask = self.mask();
        Ok(format_report(&self.snapshot(AccessOp::Poke(id, mask))?))
    }

    /// Stops the unit workers and releases the machine.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for CsrProbe {
    fn drop(&mut self) {
        info!("csr probe shutting down");
    }
}
