//! The simulated multi-unit machine.
//!
//! Owns the units, the precomputed code table and the patch buffer, and
//! routes every single-unit access through the [`AccessSerializer`].

use std::ops::Range;
use std::sync::Arc;

use log::debug;

use crate::direct::direct_access;
use crate::execute::run_fragment;
use crate::icache::CodeSource;
use crate::memory::PageProtector;
use crate::patch::{PatchBuffer, PatchRegion};
use crate::serializer::AccessSerializer;
use crate::table::CodeTable;
use crate::unit::{LocalGuard, Task, Unit};
use crate::{
    AccessKind, AccessOp, DispatchStrategy, ProbeConfig, ProbeError, RegisterId, TraceSink,
};

/// Units plus the code they run.
pub struct Machine {
    units: Box<[Unit]>,
    table: CodeTable,
    patch: PatchBuffer,
    trace: Option<Arc<dyn TraceSink>>,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("units", &self.units)
            .field("patch", &self.patch)
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Brings up `config.units` active units and generates all code.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::NoUnits`] for an empty machine, or the
    /// allocation or protection failure that stopped code generation.
    pub fn new(
        config: &ProbeConfig,
        protector: Arc<dyn PageProtector>,
        trace: Option<Arc<dyn TraceSink>>,
    ) -> Result<Self, ProbeError> {
        if config.units == 0 {
            return Err(ProbeError::NoUnits);
        }
        let table = CodeTable::generate(protector.as_ref())?;
        let patch = PatchBuffer::new(protector)?;
        let units = (0..config.units)
            .map(|index| Unit::new(index, &config.registers))
            .collect();

        Ok(Self {
            units,
            table,
            patch,
            trace,
        })
    }

    /// Number of units, active or not.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// All units in index order.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Unit `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::UnknownUnit`] for an index past the last unit.
    pub fn unit(&self, index: usize) -> Result<&Unit, ProbeError> {
        self.units.get(index).ok_or(ProbeError::UnknownUnit(index))
    }

    /// Brings unit `index` online or takes it offline.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::UnknownUnit`] for an index past the last unit.
    pub fn set_active(&self, index: usize, active: bool) -> Result<(), ProbeError> {
        self.unit(index)?.set_active(active);
        debug!("unit {index} {}", if active { "online" } else { "offline" });
        Ok(())
    }

    /// Indices of the currently active units, ascending.
    #[must_use]
    pub fn active_units(&self) -> Vec<usize> {
        self.units
            .iter()
            .filter(|unit| unit.is_active())
            .map(Unit::index)
            .collect()
    }

    /// Moves `task` to unit `to`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::UnknownUnit`] or [`ProbeError::Pinned`].
    pub fn migrate(&self, task: &Task, to: usize) -> Result<(), ProbeError> {
        self.unit(to)?;
        task.try_migrate(to)
    }

    /// Serializer over this machine's units.
    #[must_use]
    pub fn serializer(&self) -> AccessSerializer<'_> {
        AccessSerializer::new(&self.units, self.trace.as_deref())
    }

    /// Runs `op` on `task`'s unit through the per-id code path `strategy`.
    ///
    /// # Errors
    ///
    /// Returns the serializer refusal or the fault of the fragment.
    pub fn execute(
        &self,
        task: &Task,
        op: AccessOp,
        strategy: DispatchStrategy,
    ) -> Result<u64, ProbeError> {
        self.serializer().run(task, |local| match strategy {
            DispatchStrategy::Table => {
                let entry = CodeTable::entry(op.kind(), op.id());
                self.run(local, entry, op.arg(), &self.table)
            }
            DispatchStrategy::Direct => Ok(direct_access(&mut local.csr, op)),
        })
    }

    /// Invokes the patch buffer's `kind` fragment on `task`'s unit.
    ///
    /// # Errors
    ///
    /// Returns the serializer refusal or the fault of the fragment; a
    /// buffer that was never retargeted faults with a breakpoint.
    pub fn execute_patched(
        &self,
        task: &Task,
        kind: AccessKind,
        arg: u64,
    ) -> Result<u64, ProbeError> {
        self.serializer().run(task, |local| {
            let region = self.patch.read();
            local.sync_icache();
            self.run(local, PatchRegion::entry(kind), arg, &*region)
        })
    }

    /// Rewrites the patch buffer to target `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Protection`]; the buffer is unchanged or
    /// rolled back.
    pub fn retarget(&self, id: RegisterId) -> Result<(), ProbeError> {
        let invalidate = |range: Range<u64>| {
            for unit in self.units.iter() {
                unit.queue_invalidation(range.clone());
            }
        };
        self.patch.retarget(id, &invalidate, self.trace.as_deref())
    }

    /// Installed trace sink.
    #[must_use]
    pub fn trace(&self) -> Option<&dyn TraceSink> {
        self.trace.as_deref()
    }

    /// Register the patch buffer targets.
    #[must_use]
    pub fn patch_target(&self) -> Option<RegisterId> {
        self.patch.target()
    }

    fn run(
        &self,
        local: &mut LocalGuard<'_>,
        entry: u64,
        arg: u64,
        source: &dyn CodeSource,
    ) -> Result<u64, ProbeError> {
        let unit = local.index;
        run_fragment(entry, arg, local, source, self.trace.as_deref())
            .map_err(|fault| ProbeError::Execution { unit, fault })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::Machine;
    use crate::memory::AlwaysGrant;
    use crate::patch::PATCH_IMAGE_BYTES;
    use crate::state::{CSR_CPUID, CSR_SAVE0};
    use crate::unit::Task;
    use crate::{
        AccessKind, AccessOp, DispatchStrategy, Fault, ProbeConfig, ProbeError, RegisterId,
    };

    fn machine(units: usize) -> Machine {
        let config = ProbeConfig {
            units,
            ..ProbeConfig::default()
        };
        Machine::new(&config, Arc::new(AlwaysGrant), None).expect("machine")
    }

    #[test]
    fn empty_machine_is_rejected() {
        let config = ProbeConfig {
            units: 0,
            ..ProbeConfig::default()
        };
        assert_eq!(
            Machine::new(&config, Arc::new(AlwaysGrant), None).unwrap_err(),
            ProbeError::NoUnits
        );
    }

    #[rstest]
    #[case(DispatchStrategy::Table)]
    #[case(DispatchStrategy::Direct)]
    fn strategies_read_the_task_unit(#[case] strategy: DispatchStrategy) {
        let machine = machine(4);
        for unit in 0..4 {
            let task = Task::new(unit);
            let value = machine.execute(&task, AccessOp::Read(CSR_CPUID), strategy);
            assert_eq!(value, Ok(unit as u64));
        }
    }

    #[rstest]
    #[case(DispatchStrategy::Table)]
    #[case(DispatchStrategy::Direct)]
    fn strategies_poke_and_restore(#[case] strategy: DispatchStrategy) {
        let machine = machine(2);
        let task = Task::new(1);
        machine.units()[1].lock().csr.write(CSR_SAVE0, 0x0F0F);

        let readback = machine.execute(&task, AccessOp::Poke(CSR_SAVE0, 0xF000), strategy);
        assert_eq!(readback, Ok(0xFF0F));
        assert_eq!(
            machine.execute(&task, AccessOp::Read(CSR_SAVE0), strategy),
            Ok(0x0F0F)
        );
    }

    #[test]
    fn patched_access_follows_the_latest_retarget() {
        let machine = machine(3);
        let task = Task::new(2);

        assert_eq!(
            machine.execute_patched(&task, AccessKind::Read, 0),
            Err(ProbeError::Execution {
                unit: 2,
                fault: Fault::Breakpoint
            })
        );

        machine.retarget(CSR_CPUID).expect("retarget");
        assert_eq!(machine.execute_patched(&task, AccessKind::Read, 0), Ok(2));

        machine.units()[2].lock().csr.write(CSR_SAVE0, 7);
        machine.retarget(CSR_SAVE0).expect("retarget");
        assert_eq!(machine.execute_patched(&task, AccessKind::Read, 0), Ok(7));
        assert_eq!(machine.patch_target(), Some(CSR_SAVE0));
    }

    #[test]
    fn migration_checks_the_destination() {
        let machine = machine(2);
        let task = Task::new(0);
        assert_eq!(machine.migrate(&task, 2), Err(ProbeError::UnknownUnit(2)));
        assert_eq!(machine.migrate(&task, 1), Ok(()));
        assert_eq!(task.current_unit(), 1);
    }

    #[test]
    fn offline_units_drop_out_of_the_active_set() {
        let machine = machine(4);
        machine.set_active(2, false).expect("unit exists");
        assert_eq!(machine.active_units(), vec![0, 1, 3]);
        assert_eq!(
            machine.execute(&Task::new(2), AccessOp::Read(CSR_CPUID), DispatchStrategy::Table),
            Err(ProbeError::InactiveUnit(2))
        );
    }

    #[test]
    fn idle_units_hold_one_pending_invalidation() {
        let machine = machine(4);
        machine.set_active(3, false).expect("unit exists");
        let task = Task::new(0);
        for n in 0..2_000_u16 {
            machine.retarget(RegisterId::new(n)).expect("retarget");
            machine
                .execute_patched(&task, AccessKind::Read, 0)
                .expect("patched read");
        }
        assert_eq!(machine.units()[0].pending_invalidation(), None);
        for unit in &machine.units()[1..] {
            let pending = unit.pending_invalidation().expect("queued");
            assert_eq!(pending.end - pending.start, PATCH_IMAGE_BYTES as u64);
        }

        machine.retarget(CSR_CPUID).expect("retarget");
        assert_eq!(
            machine.execute_patched(&Task::new(1), AccessKind::Read, 0),
            Ok(1)
        );
        assert_eq!(machine.units()[1].pending_invalidation(), None);
    }
}
