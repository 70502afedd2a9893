//! Single-unit critical sections.

use crate::unit::{LocalGuard, Task, Unit};
use crate::{ProbeError, TraceEvent, TraceSink};

/// Runs one access on the caller's unit with migration disabled and the
/// unit's local lock held.
///
/// Guards are released in reverse order of acquisition on every exit
/// path, including when the body fails.
#[derive(Clone, Copy)]
pub struct AccessSerializer<'a> {
    units: &'a [Unit],
    trace: Option<&'a dyn TraceSink>,
}

impl std::fmt::Debug for AccessSerializer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSerializer")
            .field("units", &self.units.len())
            .field("traced", &self.trace.is_some())
            .finish()
    }
}

impl<'a> AccessSerializer<'a> {
    /// Creates a serializer over `units`.
    #[must_use]
    pub const fn new(units: &'a [Unit], trace: Option<&'a dyn TraceSink>) -> Self {
        Self { units, trace }
    }

    /// Runs `body` inside the critical section of `task`'s unit.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::UnknownUnit`] or [`ProbeError::InactiveUnit`]
    /// when the task's unit cannot run accesses, otherwise whatever `body`
    /// returns.
    pub fn run<R>(
        &self,
        task: &Task,
        body: impl FnOnce(&mut LocalGuard<'_>) -> Result<R, ProbeError>,
    ) -> Result<R, ProbeError> {
        let pin = task.migrate_disable();
        let unit = self
            .units
            .get(pin.unit())
            .ok_or(ProbeError::UnknownUnit(pin.unit()))?;
        if !unit.is_active() {
            return Err(ProbeError::InactiveUnit(unit.index()));
        }

        self.emit(TraceEvent::CriticalEnter {
            unit: task.current_unit(),
        });
        let result = {
            let mut local = unit.lock();
            body(&mut local)
        };
        self.emit(TraceEvent::CriticalExit {
            unit: task.current_unit(),
        });

        drop(pin);
        result
    }

    fn emit(&self, event: TraceEvent) {
        if let Some(sink) = self.trace {
            sink.on_event(event);
        }
    }
}
