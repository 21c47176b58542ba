//! Compilation statistics.
//!
//! The builder counts what its construction-time optimizer did, `compile`
//! adds what lowering kept, and the finished `Program` carries the result for
//! tools and tests to inspect.

use hashbrown::HashMap;
use std::fmt;

/// Counters gathered while building and compiling one kernel.
#[derive(Debug, Clone, Default)]
pub struct CompileStats {
    /// Instructions appended to the builder, including the phantom and `done`.
    pub instructions_pushed: usize,
    /// Operations evaluated at build time instead of emitted.
    pub constants_folded: usize,
    /// Constructions answered by an existing identical instruction.
    pub cse_hits: usize,
    /// Additions rewritten into a fused multiply-add.
    pub fused_multiply_adds: usize,
    /// Times `mutate` threw away the hash-consing table.
    pub cse_resets: usize,
    /// Instructions that survived dead-code elimination.
    pub live_instructions: usize,
    /// Instructions dropped by dead-code elimination.
    pub dead_instructions: usize,
    /// Length of the loop-invariant prefix.
    pub invariant_instructions: usize,
    /// Emitted instruction count per opcode name.
    pub op_counts: HashMap<&'static str, usize>,
}

impl CompileStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one emitted instruction.
    pub fn record_emitted(&mut self, name: &'static str) {
        *self.op_counts.entry(name).or_insert(0) += 1;
    }

    /// Emitted instructions of a given opcode name.
    pub fn emitted(&self, name: &str) -> usize {
        self.op_counts.get(name).copied().unwrap_or(0)
    }
}

impl fmt::Display for CompileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Statistics:")?;
        writeln!(f, "  Instructions pushed: {}", self.instructions_pushed)?;
        writeln!(f, "  Constants folded: {}", self.constants_folded)?;
        writeln!(f, "  CSE hits: {}", self.cse_hits)?;
        writeln!(f, "  Fused multiply-adds: {}", self.fused_multiply_adds)?;
        writeln!(f, "  CSE resets: {}", self.cse_resets)?;
        writeln!(f, "  Live / dead: {} / {}", self.live_instructions, self.dead_instructions)?;
        writeln!(f, "  Loop-invariant prefix: {}", self.invariant_instructions)?;

        let mut ops: Vec<_> = self.op_counts.iter().collect();
        ops.sort();
        for (name, count) in ops {
            writeln!(f, "    {}: {}", name, count)?;
        }
        Ok(())
    }
}
