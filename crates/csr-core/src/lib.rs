//! Core crate for probing per-unit control/status registers.

/// Fault taxonomy and the crate error type.
pub mod fault;
pub use fault::{Fault, FaultClass, ProbeError};

/// Architectural unit state: register numbering and CSR banks.
pub mod state;
pub use state::{
    default_register_map, CsrBank, RegisterId, RegisterSpec, UnitState, GPR_A0, GPR_RA, GPR_ZERO,
    REGISTER_ID_COUNT, REGISTER_ID_MASK,
};

/// Public configuration, operation and trace types.
pub mod api;
pub use api::{
    AccessKind, AccessOp, DispatchStrategy, ProbeConfig, TraceEvent, TraceSink,
    DEFAULT_UNIT_COUNT,
};

/// Code address space and region protections.
pub mod memory;
pub use memory::{AlwaysGrant, CodeRegion, PageProtector, Protection, RegionDescriptor};

/// Fragment instruction encodings.
pub mod encoding;
pub use encoding::{Instruction, RETURN_WORD, TRAP_WORD};

/// Instruction word decoder.
pub mod decoder;
pub use decoder::decode;

/// Non-coherent per-unit instruction cache.
pub mod icache;
pub use icache::{CodeSource, InstructionCache};

/// Fragment interpreter.
pub mod execute;
pub use execute::{run_fragment, MAX_FRAGMENT_STEPS};

/// Read and poke fragment templates.
pub mod codegen;
pub use codegen::{poke_fragment, read_fragment};

/// Precomputed per-id fragment table.
pub mod table;
pub use table::CodeTable;

/// Retargetable patch buffer.
pub mod patch;
pub use patch::{PatchBuffer, PatchRegion};

/// Native parametrized access routine.
pub mod direct;
pub use direct::direct_access;

/// Units, local locks and caller tasks.
pub mod unit;
pub use unit::{LocalGuard, MigrationGuard, Task, Unit};

/// Migration- and preemption-safe single-unit sections.
pub mod serializer;
pub use serializer::AccessSerializer;

/// Simulated multi-unit machine.
pub mod machine;
pub use machine::Machine;

/// Whole-machine dispatch and collect.
pub mod broadcast;
pub use broadcast::{BroadcastSnapshot, ResultSlots};

/// Snapshot report rendering.
pub mod report;
pub use report::{format_report, format_value, MAX_REPORT_LINE_BYTES};

/// Operator-facing probe.
pub mod probe;
pub use probe::{CsrProbe, Selection};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
