//! Parametrized access routine.
//!
//! Applies an [`AccessOp`] to a register bank with the id as a runtime
//! argument, with the same exchange-and-restore semantics as the poke
//! fragment. No code memory is involved.

use crate::state::CsrBank;
use crate::AccessOp;

/// Performs `op` on `bank` and returns the read value or the poke readback.
pub fn direct_access(bank: &mut CsrBank, op: AccessOp) -> u64 {
    match op {
        AccessOp::Read(id) => bank.read(id),
        AccessOp::Poke(id, mask) => {
            let old = bank.exchange(id, mask, mask);
            bank.write(id, old)
        }
    }
}
