//! Fragment executor.
//!
//! A fragment is entered with `$a0` holding the argument and `$ra` holding
//! [`RETURN_ADDRESS`]; it ends when control reaches that address and its
//! result is `$a0`. Fragments are straight-line code, so execution is
//! capped at [`MAX_FRAGMENT_STEPS`] instructions.

use crate::decoder::decode;
use crate::encoding::{Instruction, INSN_BYTES};
use crate::icache::CodeSource;
use crate::memory::RETURN_ADDRESS;
use crate::state::UnitState;
use crate::{Fault, TraceEvent, TraceSink, GPR_A0, GPR_RA};

/// Upper bound on instructions retired by one fragment call.
pub const MAX_FRAGMENT_STEPS: usize = 8;

/// Runs the fragment at `entry` on `unit` and returns `$a0`.
///
/// # Errors
///
/// Returns the fetch, decode or trap fault that stopped the fragment, or
/// [`Fault::StepBudgetExceeded`] if it never returned.
pub fn run_fragment(
    entry: u64,
    arg: u64,
    unit: &mut UnitState,
    source: &dyn CodeSource,
    trace: Option<&dyn TraceSink>,
) -> Result<u64, Fault> {
    unit.gpr.set(GPR_RA, RETURN_ADDRESS);
    unit.gpr.set(GPR_A0, arg);

    let mut pc = entry;
    let mut steps = 0;
    loop {
        if pc == RETURN_ADDRESS {
            return Ok(unit.gpr.get(GPR_A0));
        }
        if steps == MAX_FRAGMENT_STEPS {
            return Err(Fault::StepBudgetExceeded);
        }
        steps += 1;

        let word = unit.icache.fetch(pc, source)?;
        let next_pc = pc.wrapping_add(INSN_BYTES as u64);
        let target = match decode(word)? {
            Instruction::CsrRead { rd, csr } => {
                let value = unit.csr.read(csr);
                unit.gpr.set(rd, value);
                next_pc
            }
            Instruction::CsrWrite { rd, csr } => {
                let old = unit.csr.write(csr, unit.gpr.get(rd));
                unit.gpr.set(rd, old);
                next_pc
            }
            Instruction::CsrExchange { rd, rj, csr } => {
                let old = unit.csr.exchange(csr, unit.gpr.get(rd), unit.gpr.get(rj));
                unit.gpr.set(rd, old);
                next_pc
            }
            Instruction::JumpLink { rd, rj, offs } => {
                let target = unit.gpr.get(rj).wrapping_add_signed(i64::from(offs) << 2);
                unit.gpr.set(rd, next_pc);
                target
            }
            Instruction::Break { .. } => return Err(Fault::Breakpoint),
        };

        if let Some(sink) = trace {
            sink.on_event(TraceEvent::InstructionRetired {
                unit: unit.index,
                pc,
                word,
            });
        }
        pc = target;
    }
}
