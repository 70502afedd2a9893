//! Access fragment templates.
//!
//! ```text
//! read:  csrrd   $a0, id
//!        jirl    $zero, $ra, 0
//! poke:  csrxchg $a0, $a0, id     # csr |= mask (writable bits), a0 = old
//!        csrwr   $a0, id          # csr = old, a0 = readback
//!        jirl    $zero, $ra, 0
//!        break   0
//! ```

use crate::encoding::{Instruction, RETURN_WORD, TRAP_WORD};
use crate::{RegisterId, GPR_A0};

/// Instruction words of a read fragment.
pub const READ_FRAGMENT_WORDS: usize = 2;
/// Instruction words of a poke fragment.
pub const POKE_FRAGMENT_WORDS: usize = 4;

/// Builds the read fragment for `id`.
#[must_use]
pub const fn read_fragment(id: RegisterId) -> [u32; READ_FRAGMENT_WORDS] {
    [
        Instruction::CsrRead { rd: GPR_A0, csr: id }.encode(),
        RETURN_WORD,
    ]
}

/// Builds the poke fragment for `id`.
#[must_use]
pub const fn poke_fragment(id: RegisterId) -> [u32; POKE_FRAGMENT_WORDS] {
    [
        Instruction::CsrExchange {
            rd: GPR_A0,
            rj: GPR_A0,
            csr: id,
        }
        .encode(),
        Instruction::CsrWrite { rd: GPR_A0, csr: id }.encode(),
        RETURN_WORD,
        TRAP_WORD,
    ]
}
