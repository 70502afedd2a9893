//! Whole-machine snapshots.
//!
//! One worker thread per unit, each bound to its unit for life. A
//! snapshot takes the global window lock, hands the operation to the
//! workers of every unit active at dispatch, waits for all of them to
//! acknowledge, and reads the result slots before letting go of the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::machine::Machine;
use crate::unit::Task;
use crate::{AccessOp, DispatchStrategy, ProbeError, TraceEvent};

/// One result word per unit, each written only by that unit's worker.
#[derive(Debug)]
pub struct ResultSlots(Box<[AtomicU64]>);

impl ResultSlots {
    /// Allocates `count` zeroed slots.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::OutOfMemory`] when the slots cannot be allocated.
    pub fn new(count: usize) -> Result<Self, ProbeError> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(count)
            .map_err(|_| ProbeError::OutOfMemory {
                bytes: count.saturating_mul(std::mem::size_of::<AtomicU64>()),
            })?;
        slots.extend((0..count).map(|_| AtomicU64::new(0)));
        Ok(Self(slots.into_boxed_slice()))
    }

    /// Last value written for `unit`.
    #[must_use]
    pub fn get(&self, unit: usize) -> Option<u64> {
        self.0.get(unit).map(|slot| slot.load(Ordering::Acquire))
    }

    fn set(&self, unit: usize, value: u64) {
        if let Some(slot) = self.0.get(unit) {
            slot.store(value, Ordering::Release);
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for a machine without slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

type Ack = (usize, Result<(), ProbeError>);

enum Job {
    Run {
        op: AccessOp,
        strategy: DispatchStrategy,
        ack: Sender<Ack>,
    },
    Stop,
}

struct Worker {
    jobs: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

/// Dispatch-and-collect across every active unit.
pub struct BroadcastSnapshot {
    machine: Arc<Machine>,
    window: Mutex<()>,
    slots: Arc<ResultSlots>,
    workers: Vec<Worker>,
}

impl std::fmt::Debug for BroadcastSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastSnapshot")
            .field("workers", &self.workers.len())
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

fn worker_loop(unit: usize, machine: &Machine, slots: &ResultSlots, jobs: &Receiver<Job>) {
    let task = Task::new(unit);
    while let Ok(Job::Run { op, strategy, ack }) = jobs.recv() {
        let outcome = match machine.execute(&task, op, strategy) {
            Ok(value) => {
                slots.set(unit, value);
                Ok(())
            }
            Err(ProbeError::InactiveUnit(_)) => {
                debug!("unit {unit} went offline before its job; slot left as is");
                Ok(())
            }
            Err(err) => Err(err),
        };
        if ack.send((unit, outcome)).is_err() {
            warn!("unit {unit}: snapshot coordinator stopped waiting");
        }
    }
}

impl BroadcastSnapshot {
    /// Starts one pinned worker per unit of `machine`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::OutOfMemory`] for the slots or
    /// [`ProbeError::Spawn`] if a worker thread cannot be started.
    pub fn new(machine: Arc<Machine>) -> Result<Self, ProbeError> {
        let count = machine.unit_count();
        let slots = Arc::new(ResultSlots::new(count)?);
        let mut snapshot = Self {
            machine,
            window: Mutex::new(()),
            slots,
            workers: Vec::with_capacity(count),
        };

        for unit in 0..count {
            let (jobs, inbox) = mpsc::channel();
            let machine = Arc::clone(&snapshot.machine);
            let slots = Arc::clone(&snapshot.slots);
            let handle = thread::Builder::new()
                .name(format!("csr-unit-{unit}"))
                .spawn(move || worker_loop(unit, &machine, &slots, &inbox))
                .map_err(|_| ProbeError::Spawn(unit))?;
            snapshot.workers.push(Worker {
                jobs,
                handle: Some(handle),
            });
        }
        Ok(snapshot)
    }

    /// Result slots written by the workers.
    #[must_use]
    pub fn slots(&self) -> &ResultSlots {
        &self.slots
    }

    /// Runs `op` on every active unit and returns `(unit, value)` pairs in
    /// ascending unit order.
    ///
    /// Blocks until no other snapshot is in its window. The active set is
    /// sampled once, before `WindowOpen` is emitted, and only those units
    /// are dispatched: a unit coming online later is left out. A unit that
    /// goes offline before running its job reports its previous slot value.
    ///
    /// # Errors
    ///
    /// Returns the error of the lowest-numbered unit that failed, after
    /// every dispatched unit has finished.
    pub fn run(
        &self,
        op: AccessOp,
        strategy: DispatchStrategy,
    ) -> Result<Vec<(usize, u64)>, ProbeError> {
        let _window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let dispatched = self.machine.active_units();
        self.emit(TraceEvent::WindowOpen { op });
        debug!("snapshot {op:?} dispatched to {} units", dispatched.len());

        let mut failures = Vec::new();
        let mut outstanding = Vec::with_capacity(dispatched.len());
        let (ack, acks) = mpsc::channel();
        for &unit in &dispatched {
            let job = Job::Run {
                op,
                strategy,
                ack: ack.clone(),
            };
            match self.workers.get(unit).map(|worker| worker.jobs.send(job)) {
                Some(Ok(())) => outstanding.push(unit),
                _ => failures.push((unit, ProbeError::WorkerGone(unit))),
            }
        }
        drop(ack);

        while !outstanding.is_empty() {
            let Ok((unit, outcome)) = acks.recv() else {
                failures.extend(
                    outstanding
                        .drain(..)
                        .map(|unit| (unit, ProbeError::WorkerGone(unit))),
                );
                break;
            };
            outstanding.retain(|&pending| pending != unit);
            if let Err(err) = outcome {
                failures.push((unit, err));
            }
        }

        let rows = dispatched
            .iter()
            .filter_map(|&unit| self.slots.get(unit).map(|value| (unit, value)))
            .collect();
        self.emit(TraceEvent::WindowClose { op });

        failures.sort_by_key(|(unit, _)| *unit);
        match failures.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(rows),
        }
    }

    fn emit(&self, event: TraceEvent) {
        if let Some(sink) = self.machine.trace() {
            sink.on_event(event);
        }
    }

    fn stop_workers(&mut self) {
        for worker in &self.workers {
            // A worker that already exited has dropped its receiver.
            let _ = worker.jobs.send(Job::Stop);
        }
        for (unit, worker) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!("worker for unit {unit} panicked");
                }
            }
        }
    }
}

impl Drop for BroadcastSnapshot {
    fn drop(&mut self) {
        self.stop_workers();
    }
}
