//! Per-unit instruction cache.
//!
//! The cache is not coherent with data writes to code memory: once a line
//! is filled it keeps serving the old words until the line is invalidated.

use std::collections::HashMap;
use std::ops::Range;

use crate::encoding::INSN_BYTES;
use crate::Fault;

/// Size in bytes of one cache line.
pub const ICACHE_LINE_BYTES: u64 = 16;
/// Instruction words per cache line.
pub const ICACHE_LINE_WORDS: usize = 4;
/// Lines held before the cache is flushed wholesale.
pub const ICACHE_CAPACITY_LINES: usize = 256;

/// Backing code memory as seen by instruction fetch.
pub trait CodeSource {
    /// Checks that `addr` may be fetched from.
    ///
    /// # Errors
    ///
    /// Returns the fetch fault raised for `addr`.
    fn check_fetch(&self, addr: u64) -> Result<(), Fault>;

    /// Loads the words of the line starting at `line_addr` from memory.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnmappedFetch`] when the line is outside the source.
    fn load_line(&self, line_addr: u64) -> Result<[u32; ICACHE_LINE_WORDS], Fault>;
}

/// Reads one cache line of little-endian words from a region backing store.
///
/// # Errors
///
/// Returns [`Fault::UnmappedFetch`] when the line is not fully inside `bytes`.
pub fn read_line(bytes: &[u8], offset: usize) -> Result<[u32; ICACHE_LINE_WORDS], Fault> {
    let line = bytes
        .get(offset..offset + ICACHE_LINE_WORDS * INSN_BYTES)
        .ok_or(Fault::UnmappedFetch)?;
    let mut words = [0_u32; ICACHE_LINE_WORDS];
    for (word, chunk) in words.iter_mut().zip(line.chunks_exact(INSN_BYTES)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(words)
}

/// Instruction cache of one unit.
#[derive(Debug, Clone, Default)]
pub struct InstructionCache {
    lines: HashMap<u64, [u32; ICACHE_LINE_WORDS]>,
    hits: u64,
    misses: u64,
}

impl InstructionCache {
    /// Fetches the instruction word at `addr`, filling the line on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnalignedFetch`] for unaligned addresses, or the fault
    /// reported by `source`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn fetch(&mut self, addr: u64, source: &dyn CodeSource) -> Result<u32, Fault> {
        if addr % INSN_BYTES as u64 != 0 {
            return Err(Fault::UnalignedFetch);
        }
        source.check_fetch(addr)?;

        let line_addr = addr & !(ICACHE_LINE_BYTES - 1);
        let slot = ((addr - line_addr) / INSN_BYTES as u64) as usize;
        if let Some(words) = self.lines.get(&line_addr) {
            self.hits += 1;
            return Ok(words[slot]);
        }

        self.misses += 1;
        let words = source.load_line(line_addr)?;
        if self.lines.len() >= ICACHE_CAPACITY_LINES {
            self.lines.clear();
        }
        self.lines.insert(line_addr, words);
        Ok(words[slot])
    }

    /// Drops every line overlapping `range`.
    pub fn invalidate_range(&mut self, range: &Range<u64>) {
        self.lines
            .retain(|line, _| *line + ICACHE_LINE_BYTES <= range.start || *line >= range.end);
    }

    /// Drops every line.
    pub fn invalidate_all(&mut self) {
        self.lines.clear();
    }

    /// Number of cached lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` when no line is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `(hits, misses)` since creation.
    #[must_use]
    pub const fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
