//! Opcode-to-bubble-cycle lookup table.
//!
//! Per the Design Notes ("a CSV of `opcode,cycles` loaded at startup; missing
//! entries default to 0 bubbles... load once and share immutably"), this is a
//! flat `HashMap` built once from a two-column CSV (`opcode,cycles`, no
//! header) and consulted read-only from every core's bubble-accounting step.

use std::collections::HashMap;
use std::io;
use std::path::Path;

/// Opcode to non-memory ("bubble") cycle-count mapping.
#[derive(Debug, Clone, Default)]
pub struct OpcodeTable {
    cycles: HashMap<String, u64>,
}

impl OpcodeTable {
    /// An empty table; every lookup returns the zero-bubble default.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a `opcode,cycles` CSV with no header row. Malformed lines are
    /// skipped rather than failing the whole load, since a typo'd row should
    /// not prevent every other opcode's timing from loading.
    pub fn load(path: &Path) -> io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse(&contents))
    }

    fn parse(contents: &str) -> Self {
        let mut cycles = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((opcode, count)) = line.split_once(',') else {
                continue;
            };
            if let Ok(count) = count.trim().parse::<u64>() {
                cycles.insert(opcode.trim().to_string(), count);
            }
        }
        Self { cycles }
    }

    /// Bubble cycles for `opcode`; unknown opcodes default to zero.
    pub fn bubble_cycles(&self, opcode: &str) -> u64 {
        self.cycles.get(opcode).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_opcode_defaults_to_zero_bubbles() {
        let table = OpcodeTable::empty();
        assert_eq!(table.bubble_cycles("FADD"), 0);
    }

    #[test]
    fn parses_two_column_csv() {
        let table = OpcodeTable::parse("FADD,3\nFMUL,5\n# a comment that is not valid,x\n");
        assert_eq!(table.bubble_cycles("FADD"), 3);
        assert_eq!(table.bubble_cycles("FMUL"), 5);
        assert_eq!(table.bubble_cycles("UNKNOWN"), 0);
    }
}
