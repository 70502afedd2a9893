//! Instruction decoder for fragment words.

use crate::encoding::{
    Instruction, BREAK_BASE, BREAK_CODE_MASK, CSR_GROUP_OPCODE, CSR_RJ_READ, CSR_RJ_WRITE,
    JIRL_OPCODE,
};
use crate::{Fault, RegisterId};

/// Decodes one instruction word.
///
/// # Errors
///
/// Returns [`Fault::IllegalInstruction`] for any word outside the fragment
/// subset.
#[allow(clippy::cast_possible_truncation)]
pub const fn decode(word: u32) -> Result<Instruction, Fault> {
    let rd = (word & 0x1F) as u8;
    let rj = ((word >> 5) & 0x1F) as u8;

    if word >> 24 == CSR_GROUP_OPCODE {
        let csr = RegisterId::new(((word >> 10) & 0x3FFF) as u16);
        return Ok(match rj {
            CSR_RJ_READ => Instruction::CsrRead { rd, csr },
            CSR_RJ_WRITE => Instruction::CsrWrite { rd, csr },
            _ => Instruction::CsrExchange { rd, rj, csr },
        });
    }

    if word >> 26 == JIRL_OPCODE {
        let offs = ((word >> 10) & 0xFFFF) as u16 as i16;
        return Ok(Instruction::JumpLink { rd, rj, offs });
    }

    if word & !BREAK_CODE_MASK == BREAK_BASE {
        return Ok(Instruction::Break {
            code: (word & BREAK_CODE_MASK) as u16,
        });
    }

    Err(Fault::IllegalInstruction)
}
