//! Execution units and caller tasks.
//!
//! A [`Unit`] owns its architectural state behind a spin lock. Taking the
//! lock raises the unit's preemption count first, and the count drops
//! only after the lock is released. A [`Task`] models a caller bound to
//! one unit at a time; while it holds a [`MigrationGuard`] it cannot be
//! moved.

use std::ops::{Deref, DerefMut, Range};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use spin::{Mutex, MutexGuard};

use crate::state::{RegisterSpec, UnitState};
use crate::ProbeError;

/// One simulated execution unit.
pub struct Unit {
    index: usize,
    active: AtomicBool,
    preempt_count: AtomicU32,
    local: Mutex<UnitState>,
    icache_inbox: Mutex<Option<Range<u64>>>,
}

impl std::fmt::Debug for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unit")
            .field("index", &self.index)
            .field("active", &self.is_active())
            .field("preempt_count", &self.preempt_count())
            .finish_non_exhaustive()
    }
}

impl Unit {
    /// Creates an active unit in reset state.
    #[must_use]
    pub fn new(index: usize, map: &[RegisterSpec]) -> Self {
        Self {
            index,
            active: AtomicBool::new(true),
            preempt_count: AtomicU32::new(0),
            local: Mutex::new(UnitState::new(index, map)),
            icache_inbox: Mutex::new(None),
        }
    }

    /// Index of this unit.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` while the unit takes part in accesses.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Brings the unit online or takes it offline.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Current preemption-disable depth.
    #[must_use]
    pub fn preempt_count(&self) -> u32 {
        self.preempt_count.load(Ordering::Acquire)
    }

    /// Disables preemption and takes the local lock.
    pub fn lock(&self) -> LocalGuard<'_> {
        let preempt = PreemptGuard::new(&self.preempt_count);
        LocalGuard {
            state: self.local.lock(),
            inbox: &self.icache_inbox,
            _preempt: preempt,
        }
    }

    /// Queues an instruction-cache invalidation applied before the unit
    /// next runs patched code.
    ///
    /// Pending ranges merge into one covering range, so a unit that never
    /// runs patched code holds at most one entry.
    pub fn queue_invalidation(&self, range: Range<u64>) {
        let mut pending = self.icache_inbox.lock();
        *pending = Some(match pending.take() {
            Some(queued) => queued.start.min(range.start)..queued.end.max(range.end),
            None => range,
        });
    }

    /// Invalidation still waiting for the unit's next patched run.
    #[must_use]
    pub fn pending_invalidation(&self) -> Option<Range<u64>> {
        self.icache_inbox.lock().clone()
    }
}

struct PreemptGuard<'a>(&'a AtomicU32);

impl<'a> PreemptGuard<'a> {
    fn new(count: &'a AtomicU32) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(count)
    }
}

impl Drop for PreemptGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Exclusive access to a unit's state with preemption disabled.
pub struct LocalGuard<'a> {
    // Field order is drop order: the lock goes before the preempt count.
    state: MutexGuard<'a, UnitState>,
    inbox: &'a Mutex<Option<Range<u64>>>,
    _preempt: PreemptGuard<'a>,
}

impl LocalGuard<'_> {
    /// Applies queued invalidations to this unit's instruction cache.
    pub fn sync_icache(&mut self) {
        let pending = self.inbox.lock().take();
        if let Some(range) = pending {
            self.state.icache.invalidate_range(&range);
        }
    }
}

impl Deref for LocalGuard<'_> {
    type Target = UnitState;

    fn deref(&self) -> &UnitState {
        &self.state
    }
}

impl DerefMut for LocalGuard<'_> {
    fn deref_mut(&mut self) -> &mut UnitState {
        &mut self.state
    }
}

#[derive(Debug)]
struct Placement {
    unit: usize,
    pinned: u32,
}

/// A caller context that runs on one unit at a time.
#[derive(Debug)]
pub struct Task {
    placement: Mutex<Placement>,
}

impl Task {
    /// Creates a task placed on `unit`.
    #[must_use]
    pub const fn new(unit: usize) -> Self {
        Self {
            placement: Mutex::new(Placement { unit, pinned: 0 }),
        }
    }

    /// Unit the task currently runs on.
    #[must_use]
    pub fn current_unit(&self) -> usize {
        self.placement.lock().unit
    }

    /// Returns `true` while migration is disabled.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.placement.lock().pinned > 0
    }

    /// Disables migration until the returned guard drops. Nests.
    pub fn migrate_disable(&self) -> MigrationGuard<'_> {
        let mut placement = self.placement.lock();
        placement.pinned += 1;
        MigrationGuard {
            task: self,
            unit: placement.unit,
        }
    }

    /// Moves the task to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Pinned`] while migration is disabled.
    pub fn try_migrate(&self, to: usize) -> Result<(), ProbeError> {
        let mut placement = self.placement.lock();
        if placement.pinned > 0 {
            return Err(ProbeError::Pinned(placement.unit));
        }
        placement.unit = to;
        Ok(())
    }
}

/// Keeps a [`Task`] on its unit while alive.
#[derive(Debug)]
pub struct MigrationGuard<'a> {
    task: &'a Task,
    unit: usize,
}

impl MigrationGuard<'_> {
    /// Unit the task is pinned to.
    #[must_use]
    pub const fn unit(&self) -> usize {
        self.unit
    }
}

impl Drop for MigrationGuard<'_> {
    fn drop(&mut self) {
        self.task.placement.lock().pinned -= 1;
    }
}
