//! Text rendering of snapshots.

use std::fmt::Write as _;

/// Longest possible report line: `UNIT`, a 20-digit index, `: 0x`, 16 hex
/// digits and a newline.
pub const MAX_REPORT_LINE_BYTES: usize = 4 + 20 + 4 + 16 + 1;

/// Renders `(unit, value)` rows as one `UNIT<id>: 0x<value>` line each.
///
/// Rows are printed in ascending unit order whatever order they come in.
#[must_use]
pub fn format_report(rows: &[(usize, u64)]) -> String {
    let mut sorted = rows.to_vec();
    sorted.sort_unstable_by_key(|(unit, _)| *unit);

    let mut text = String::with_capacity(sorted.len() * MAX_REPORT_LINE_BYTES);
    for (unit, value) in sorted {
        // Writing into a String cannot fail.
        let _ = writeln!(text, "UNIT{unit}: {value:#018x}");
    }
    text
}

/// Renders a single value the way per-id nodes show it.
#[must_use]
pub fn format_value(value: u64) -> String {
    format!("{value:#018x}\n")
}
