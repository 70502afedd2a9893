//! Machine-word encodings for the fragment instruction subset.
//!
//! Fragments use the LoongArch base-ISA formats: every instruction is one
//! little-endian 32-bit word.

use crate::RegisterId;

/// Size in bytes of one instruction word.
pub const INSN_BYTES: usize = 4;

/// Major opcode of the CSR access group (`bits 31..24`).
pub const CSR_GROUP_OPCODE: u32 = 0x04;
/// `rj` value selecting `csrrd`.
pub const CSR_RJ_READ: u8 = 0;
/// `rj` value selecting `csrwr`.
pub const CSR_RJ_WRITE: u8 = 1;
/// Major opcode of `jirl` (`bits 31..26`).
pub const JIRL_OPCODE: u32 = 0x13;
/// Fixed upper bits of `break` (`bits 31..15`).
pub const BREAK_BASE: u32 = 0x002A_0000;
/// Code field mask of `break`.
pub const BREAK_CODE_MASK: u32 = 0x7FFF;

/// `break 0`, used to fill code that must never run.
pub const TRAP_WORD: u32 = BREAK_BASE;
/// `jirl $zero, $ra, 0`, the fragment return.
pub const RETURN_WORD: u32 = encode_jirl(0, 1, 0);

/// Instruction forms understood by the fragment executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// `csrrd rd, csr`: `rd = csr`.
    CsrRead {
        /// Destination register.
        rd: u8,
        /// Register number.
        csr: RegisterId,
    },
    /// `csrwr rd, csr`: `csr = rd`, `rd = old csr`.
    CsrWrite {
        /// Source and destination register.
        rd: u8,
        /// Register number.
        csr: RegisterId,
    },
    /// `csrxchg rd, rj, csr`: bits of `rj` select which bits of `rd` are
    /// written, `rd = old csr`.
    CsrExchange {
        /// Value and destination register.
        rd: u8,
        /// Mask register (`>= 2`).
        rj: u8,
        /// Register number.
        csr: RegisterId,
    },
    /// `jirl rd, rj, offs`: `rd = pc + 4`, `pc = rj + (offs << 2)`.
    JumpLink {
        /// Link register.
        rd: u8,
        /// Base register.
        rj: u8,
        /// Signed 16-bit word offset.
        offs: i16,
    },
    /// `break code`.
    Break {
        /// 15-bit trap code.
        code: u16,
    },
}

impl Instruction {
    /// Encodes this instruction as a machine word.
    #[must_use]
    pub const fn encode(self) -> u32 {
        match self {
            Self::CsrRead { rd, csr } => encode_csr(rd, CSR_RJ_READ, csr),
            Self::CsrWrite { rd, csr } => encode_csr(rd, CSR_RJ_WRITE, csr),
            Self::CsrExchange { rd, rj, csr } => encode_csr(rd, rj, csr),
            Self::JumpLink { rd, rj, offs } => encode_jirl(rd, rj, offs),
            Self::Break { code } => BREAK_BASE | (code as u32 & BREAK_CODE_MASK),
        }
    }
}

/// Encodes one instruction of the CSR group.
#[must_use]
pub const fn encode_csr(rd: u8, rj: u8, csr: RegisterId) -> u32 {
    (CSR_GROUP_OPCODE << 24)
        | ((csr.get() as u32) << 10)
        | (((rj & 0x1F) as u32) << 5)
        | ((rd & 0x1F) as u32)
}

/// Encodes `jirl rd, rj, offs`.
#[must_use]
pub const fn encode_jirl(rd: u8, rj: u8, offs: i16) -> u32 {
    (JIRL_OPCODE << 26)
        | (((offs as u16) as u32) << 10)
        | (((rj & 0x1F) as u32) << 5)
        | ((rd & 0x1F) as u32)
}

/// Serialises instruction words into little-endian bytes.
pub fn write_words(dst: &mut [u8], words: &[u32]) {
    for (chunk, word) in dst.chunks_exact_mut(INSN_BYTES).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}
