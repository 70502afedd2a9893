//! Multi-threaded coverage: patch retargeting against invocations,
//! snapshot window exclusion, per-unit reports and failure handling.

#![allow(clippy::pedantic, clippy::nursery, clippy::cast_possible_truncation)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use csr_core::state::{CSR_CPUID, CSR_CRMD, CSR_SAVE0};
use csr_core::{
    read_fragment, AccessKind, AlwaysGrant, CsrProbe, DispatchStrategy, Fault, Machine,
    PageProtector, ProbeConfig, ProbeError, Protection, RegionDescriptor, Task, TraceEvent,
    TraceSink,
};
use log as _;
use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use spin as _;
use thiserror as _;

#[derive(Default)]
struct Recorder(Mutex<Vec<TraceEvent>>);

impl TraceSink for Recorder {
    fn on_event(&self, event: TraceEvent) {
        self.0.lock().unwrap().push(event);
    }
}

impl Recorder {
    fn events(&self) -> Vec<TraceEvent> {
        self.0.lock().unwrap().clone()
    }
}

fn traced_machine(units: usize) -> (Arc<Machine>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let sink: Arc<dyn TraceSink> = recorder.clone();
    let config = ProbeConfig {
        units,
        ..ProbeConfig::default()
    };
    let machine = Machine::new(&config, Arc::new(AlwaysGrant), Some(sink)).expect("machine");
    (Arc::new(machine), recorder)
}

fn traced_probe(units: usize) -> (Arc<CsrProbe>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let sink: Arc<dyn TraceSink> = recorder.clone();
    let config = ProbeConfig {
        units,
        ..ProbeConfig::default()
    };
    let probe = CsrProbe::with_hooks(config, Arc::new(AlwaysGrant), Some(sink)).expect("probe");
    (Arc::new(probe), recorder)
}

#[test]
fn retargets_never_expose_a_torn_fragment() {
    const UNITS: usize = 3;
    const ROUNDS: usize = 300;
    let (machine, recorder) = traced_machine(UNITS);
    for unit in machine.units() {
        unit.lock().csr.write(CSR_SAVE0, 0x5A00 + unit.index() as u64);
    }
    machine.retarget(CSR_CPUID).expect("initial retarget");

    let done = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = [CSR_CPUID, CSR_SAVE0]
        .into_iter()
        .map(|id| {
            let machine = Arc::clone(&machine);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    machine.retarget(id).expect("retarget");
                    thread::yield_now();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..UNITS)
        .map(|unit| {
            let machine = Arc::clone(&machine);
            thread::spawn(move || {
                let task = Task::new(unit);
                (0..ROUNDS)
                    .map(|_| {
                        machine
                            .execute_patched(&task, AccessKind::Read, 0)
                            .expect("patched read")
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<Vec<u64>> = readers
        .into_iter()
        .map(|reader| reader.join().expect("reader"))
        .collect();
    done.store(true, Ordering::Release);
    for writer in writers {
        writer.join().expect("writer");
    }

    let cpuid = read_fragment(CSR_CPUID).to_vec();
    let save0 = read_fragment(CSR_SAVE0).to_vec();
    let mut streams: BTreeMap<usize, Vec<Vec<u32>>> = BTreeMap::new();
    let mut open: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
    for event in recorder.events() {
        match event {
            TraceEvent::CriticalEnter { unit } => {
                assert!(open.insert(unit, Vec::new()).is_none());
            }
            TraceEvent::InstructionRetired { unit, word, .. } => {
                open.get_mut(&unit).expect("retired inside a section").push(word);
            }
            TraceEvent::CriticalExit { unit } => {
                let words = open.remove(&unit).expect("matching enter");
                streams.entry(unit).or_default().push(words);
            }
            _ => {}
        }
    }

    for (unit, values) in results.iter().enumerate() {
        let executed = &streams[&unit];
        assert_eq!(executed.len(), ROUNDS);
        for (words, value) in executed.iter().zip(values) {
            if *words == cpuid {
                assert_eq!(*value, unit as u64);
            } else if *words == save0 {
                assert_eq!(*value, 0x5A00 + unit as u64);
            } else {
                panic!("unit {unit} ran a torn stream {words:08x?}");
            }
        }
    }
}

#[test]
fn snapshot_windows_never_overlap() {
    let (probe, recorder) = traced_probe(4);
    let callers: Vec<_> = (0..4)
        .map(|caller| {
            let probe = Arc::clone(&probe);
            thread::spawn(move || {
                for round in 0..25 {
                    if (caller + round) % 2 == 0 {
                        probe.global_read(CSR_CPUID).expect("global read");
                    } else {
                        probe.global_poke(CSR_SAVE0).expect("global poke");
                    }
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().expect("caller");
    }

    let mut windows = 0;
    let mut open = None;
    for event in recorder.events() {
        match event {
            TraceEvent::WindowOpen { op } => {
                assert_eq!(open, None, "two snapshot windows open at once");
                open = Some(op);
            }
            TraceEvent::WindowClose { op } => {
                assert_eq!(open.take(), Some(op));
                windows += 1;
            }
            _ => {}
        }
    }
    assert_eq!(open, None);
    assert_eq!(windows, 100);
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(7)]
fn report_has_one_ascending_line_per_unit(#[case] units: usize) {
    let (probe, _) = traced_probe(units);
    for unit in probe.machine().units() {
        unit.lock().csr.write(CSR_SAVE0, 0x100 * unit.index() as u64);
    }
    probe.set_mask(0xF);

    let report = probe.global_poke(CSR_SAVE0).expect("snapshot");
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines.len(), units);
    for (unit, line) in lines.iter().enumerate() {
        let expected = 0x100 * unit as u64 | 0xF;
        assert_eq!(*line, format!("UNIT{unit}: 0x{expected:016x}"));
    }

    let report = probe.global_read(CSR_SAVE0).expect("snapshot");
    for (unit, line) in report.lines().enumerate() {
        assert_eq!(line, format!("UNIT{unit}: 0x{:016x}", 0x100 * unit as u64));
    }
}

#[test]
fn offline_units_are_left_out_of_reports_and_single_access() {
    let (probe, _) = traced_probe(4);
    probe.machine().set_active(2, false).expect("unit");

    let report = probe.global_read(CSR_CPUID).expect("snapshot");
    assert_eq!(
        report,
        "UNIT0: 0x0000000000000000\nUNIT1: 0x0000000000000001\nUNIT3: 0x0000000000000003\n"
    );
    assert_eq!(
        probe.read(&Task::new(2), CSR_CPUID),
        Err(ProbeError::InactiveUnit(2))
    );

    probe.machine().set_active(2, true).expect("unit");
    assert_eq!(probe.global_read(CSR_CPUID).expect("snapshot").lines().count(), 4);
}

struct SealOnce {
    refuse_seal: AtomicBool,
}

impl PageProtector for SealOnce {
    fn set_protection(&self, _region: RegionDescriptor, to: Protection) -> bool {
        !(to == Protection::ExecOnly && self.refuse_seal.load(Ordering::SeqCst))
    }
}

#[test]
fn failed_selection_keeps_the_previous_target() {
    let protector = Arc::new(SealOnce {
        refuse_seal: AtomicBool::new(false),
    });
    let probe = CsrProbe::with_hooks(ProbeConfig::default(), protector.clone(), None)
        .expect("probe");
    let task = Task::new(3);
    probe.select(CSR_CPUID).expect("select");
    assert_eq!(probe.read_selected(&task), Ok(3));

    protector.refuse_seal.store(true, Ordering::SeqCst);
    assert!(matches!(
        probe.select(CSR_SAVE0),
        Err(ProbeError::Protection {
            to: Protection::ExecOnly,
            ..
        })
    ));
    assert_eq!(probe.selection().current_id, Some(CSR_CPUID));
    assert_eq!(
        probe.read_selected(&task),
        Err(ProbeError::Execution {
            unit: 3,
            fault: Fault::NonExecutableFetch
        })
    );

    protector.refuse_seal.store(false, Ordering::SeqCst);
    probe.select(CSR_SAVE0).expect("select");
    assert_eq!(probe.read_selected(&task), Ok(0));
}

#[test]
fn bring_up_fails_cleanly_when_tables_cannot_be_sealed() {
    let protector = Arc::new(SealOnce {
        refuse_seal: AtomicBool::new(true),
    });
    let err = CsrProbe::with_hooks(ProbeConfig::default(), protector, None).unwrap_err();
    assert!(matches!(err, ProbeError::Protection { .. }));
}

#[test]
fn strategies_agree_on_every_unit() {
    let table = CsrProbe::new(ProbeConfig::default()).expect("probe");
    let direct = CsrProbe::new(ProbeConfig {
        dispatch: DispatchStrategy::Direct,
        ..ProbeConfig::default()
    })
    .expect("probe");
    table.set_mask(0xFFFF);
    direct.set_mask(0xFFFF);
    for id in [CSR_CPUID, CSR_SAVE0, CSR_CRMD] {
        assert_eq!(table.global_poke(id), direct.global_poke(id));
        assert_eq!(table.global_read(id), direct.global_read(id));
    }
}
