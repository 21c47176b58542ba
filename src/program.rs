// This module lowers a finished Builder into an immutable Program. Lowering is three linear
// sweeps over the builder's append-only instruction array: a backward liveness sweep seeded
// from the live roots (stores, mutations, back edges and the appended done), a forward sweep
// that marks everything varying or fed by varying work as loop-dependent, and a two-region
// emission that writes the live loop-invariant instructions first and the live loop-dependent
// ones after. Operands are rewritten from absolute builder ids to offsets relative to the
// consuming instruction's own tape position. Per-compile scratch (live flags, loop flags and
// tape positions) lives in a bumpalo arena that is dropped as a unit when lowering finishes.

//! Compiled programs and the `compile` pass.

use crate::builder::Builder;
use crate::core::{CompileStats, Eval, Shape, Value};
use crate::ir::Op;
use bumpalo::Bump;
use std::fmt;

/// One tape instruction.
///
/// `x`, `y` and `z` are offsets from this instruction's own position, almost
/// always negative. Unused operands hold zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inst {
    pub op: Op,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Float bits for `splat`, the pointer slot for memory operations.
    pub imm: u32,
}

impl Inst {
    /// Pointer slot of a memory operation.
    pub fn slot(&self) -> usize {
        self.imm as usize
    }

    /// Immediate of a `splat`.
    pub fn immediate(&self) -> f32 {
        f32::from_bits(self.imm)
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.op.info();
        write!(f, "{:<16}", info.name)?;
        for offset in [self.x, self.y, self.z].iter().take(info.operands as usize) {
            write!(f, " {:+}", offset)?;
        }
        if info.uses_slot {
            write!(f, " slot {}", self.imm)?;
        } else if self.op == Op::Splat {
            write!(f, " {}", self.immediate())?;
        }
        Ok(())
    }
}

/// An immutable compiled kernel.
///
/// Instructions before [`loop_offset`](Program::loop_offset) run once per
/// `execute` call; the rest run for every chunk of lanes.
#[derive(Debug, Clone)]
pub struct Program {
    insts: Vec<Inst>,
    loop_offset: usize,
    slots: usize,
    stats: CompileStats,
}

impl Program {
    /// Number of tape instructions, which is also the register count.
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// First instruction of the loop-dependent suffix.
    pub fn loop_offset(&self) -> usize {
        self.loop_offset
    }

    /// Pointer slots declared by the builder.
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn instructions(&self) -> &[Inst] {
        &self.insts
    }

    pub fn ops(&self) -> impl Iterator<Item = Op> + '_ {
        self.insts.iter().map(|inst| inst.op)
    }

    pub fn stats(&self) -> &CompileStats {
        &self.stats
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "program: {} instructions, {} slots", self.len(), self.slots)?;
        for (pos, inst) in self.insts.iter().enumerate() {
            if pos == self.loop_offset {
                writeln!(f, "loop:")?;
            }
            writeln!(f, "{:4}  {}", pos, inst)?;
        }
        Ok(())
    }
}

/// Per-builder-instruction scratch used while lowering.
struct Lowering<'arena> {
    live: &'arena mut [bool],
    loop_dependent: &'arena mut [bool],
    position: &'arena mut [u32],
}

impl<'arena> Lowering<'arena> {
    fn new(arena: &'arena Bump, len: usize) -> Self {
        Self {
            live: arena.alloc_slice_fill_copy(len, false),
            loop_dependent: arena.alloc_slice_fill_copy(len, false),
            position: arena.alloc_slice_fill_copy(len, 0),
        }
    }

    /// Relative offset from the instruction emitted at `at` to operand `v`.
    fn offset(&self, at: usize, v: Value) -> i32 {
        if v.is_none() {
            return 0;
        }
        self.position[v.index()] as i32 - at as i32
    }
}

/// Lower a builder into a program, consuming it.
///
/// Panics if the emitted instruction count disagrees with the live count,
/// which would mean the builder's instruction graph was malformed.
pub fn compile(mut builder: Builder) -> Program {
    builder.push_done();

    let arena = Bump::new();
    let insts = builder.instructions();
    let mut scratch = Lowering::new(&arena, insts.len());

    // Dead code elimination: operands always precede their users, so one
    // backward sweep reaches every transitive input of a live root.
    scratch.live[0] = true;
    for (id, inst) in insts.iter().enumerate().rev() {
        if inst.eval == Eval::Live {
            scratch.live[id] = true;
        }
        if scratch.live[id] {
            for operand in inst.operands() {
                scratch.live[operand.index()] = true;
            }
        }
    }
    let live = scratch.live[1..].iter().filter(|&&l| l).count();

    // Loop-invariant hoisting: anything varying, or fed by something
    // loop-dependent, must run per chunk.
    for (id, inst) in insts.iter().enumerate().skip(1) {
        scratch.loop_dependent[id] = inst.shape == Shape::Varying
            || inst.operands().iter().any(|v| scratch.loop_dependent[v.index()]);
    }

    let mut stats = builder.stats().clone();
    let mut tape = Vec::with_capacity(live);
    let mut loop_offset = 0;
    for region in [false, true] {
        if region {
            loop_offset = tape.len();
        }
        for (id, inst) in insts.iter().enumerate().skip(1) {
            if !scratch.live[id] || scratch.loop_dependent[id] != region {
                continue;
            }
            let at = tape.len();
            scratch.position[id] = at as u32;
            let emitted = Inst {
                op: inst.op,
                x: scratch.offset(at, inst.x),
                y: scratch.offset(at, inst.y),
                z: scratch.offset(at, inst.z),
                imm: inst.imm,
            };
            log::trace!("emit {:4} <- {}: {}", at, Value::new(id as u32), emitted);
            stats.record_emitted(inst.op.name());
            tape.push(emitted);
        }
    }
    assert_eq!(tape.len(), live, "emitted instruction count must match live count");

    stats.live_instructions = live;
    stats.dead_instructions = insts.len() - 1 - live;
    stats.invariant_instructions = loop_offset;
    log::debug!(
        "compile: {} builder instructions, {} live, {} dead, loop offset {}",
        insts.len(),
        live,
        stats.dead_instructions,
        loop_offset
    );

    Program {
        insts: tape,
        loop_offset,
        slots: builder.slots(),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_compiles_to_done() {
        let program = compile(Builder::new(0));
        assert_eq!(program.len(), 1);
        assert_eq!(program.loop_offset(), 0);
        assert_eq!(program.instructions()[0].op, Op::Done);
    }

    #[test]
    fn test_dead_code_elimination() {
        let mut b = Builder::new(1);
        let live = b.splat(2.0);
        let _dead = b.splat(4.0);
        let ix = b.lane_id();
        b.store(0, ix, live);

        let program = compile(b);
        // splat(2), store, done
        assert_eq!(program.len(), 3);
        assert_eq!(program.stats().dead_instructions, 2);
        assert!(program.ops().all(|op| op != Op::LaneId));
    }

    #[test]
    fn test_loop_hoisting() {
        let mut b = Builder::new(1);
        let ix = b.lane_id();
        let x = b.load(0, ix);
        let y = b.uniform(0, 0.0);
        let one = b.splat(1.0);
        let z = b.add(y, one);
        let w = b.mul(x, z);
        let ix = b.lane_id();
        b.store(0, ix, w);

        let program = compile(b);
        let ops: Vec<_> = program.ops().collect();
        assert_eq!(
            ops,
            [
                Op::Splat,
                Op::LoadUniform,
                Op::Splat,
                Op::Add,
                Op::LoadContiguous,
                Op::Mul,
                Op::StoreContiguous,
                Op::Done,
            ]
        );
        assert_eq!(program.loop_offset(), 4);
        assert_eq!(program.stats().invariant_instructions, 4);
    }

    #[test]
    fn test_offsets_are_relative() {
        let mut b = Builder::new(1);
        let ix = b.lane_id();
        let x = b.load(0, ix);
        let y = b.mul(x, x);
        let ix = b.lane_id();
        b.store(0, ix, y);

        let program = compile(b);
        let tape = program.instructions();
        assert_eq!(tape[0].op, Op::LoadContiguous);
        assert_eq!((tape[1].op, tape[1].x, tape[1].y), (Op::Mul, -1, -1));
        assert_eq!((tape[2].op, tape[2].x), (Op::StoreContiguous, -1));
        assert_eq!(tape[2].slot(), 0);
    }

    #[test]
    fn test_listing_marks_loop_region() {
        let mut b = Builder::new(1);
        let ix = b.lane_id();
        let x = b.load(0, ix);
        let two = b.splat(2.0);
        let y = b.mul(x, two);
        b.store(0, ix, y);

        let listing = compile(b).to_string();
        assert!(listing.contains("splat"));
        assert!(listing.contains("loop:"));
        assert!(listing.contains("store_contiguous"));
    }
}
