//! Opcodes shared by builder instructions and the compiled tape.
//!
//! Every property the optimizer needs about an operator (intrinsic shape,
//! evaluation policy, commutativity, whether it can be folded) is answered
//! by [`Op::info`], so adding an operator means adding one row here and one
//! kernel in the interpreter.

use crate::core::{Eval, Shape};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Placeholder at builder id 0; never emitted.
    Phantom,
    /// Terminal instruction ending a tape walk.
    Done,
    /// Lane index as a float.
    LaneId,
    /// Immediate broadcast to every lane.
    Splat,
    LoadUniform,
    LoadContiguous,
    Gather,
    /// Store `x` at the lane indices.
    StoreContiguous,
    /// Store `x` at the per-lane indices in `y`.
    Scatter,
    /// Like `Scatter`, only where lanes of `z` are non-zero.
    ScatterMasked,
    Add,
    Sub,
    Mul,
    Div,
    /// `x * y + z`.
    Fmad,
    Eq,
    Lt,
    Le,
    And,
    Or,
    Xor,
    Not,
    /// Bitwise blend `(x & y) | (!x & z)`.
    Select,
    /// Copy register `y` into the register of value `x`.
    Mutate,
    /// Rewind to `x` while any lane of `y` is non-zero.
    Jump,
}

/// Static description of an operator.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    /// Number of value operands actually read.
    pub operands: u8,
    /// Shape before joining with the operands.
    pub shape: Shape,
    pub eval: Eval,
    /// `op(x, y) == op(y, x)`; the builder sorts `x` and `y`.
    pub commutative: bool,
    /// Pure lane arithmetic that can be evaluated at build time.
    pub foldable: bool,
    /// Carries a pointer-slot index in its immediate.
    pub uses_slot: bool,
}

impl Op {
    pub const fn info(self) -> OpInfo {
        use Op::*;
        const fn alu(name: &'static str, operands: u8, commutative: bool) -> OpInfo {
            OpInfo {
                name,
                operands,
                shape: Shape::Constant,
                eval: Eval::Pure,
                commutative,
                foldable: true,
                uses_slot: false,
            }
        }
        const fn memory(name: &'static str, operands: u8, shape: Shape, eval: Eval) -> OpInfo {
            OpInfo { uses_slot: true, ..other(name, operands, shape, eval) }
        }
        const fn other(name: &'static str, operands: u8, shape: Shape, eval: Eval) -> OpInfo {
            OpInfo {
                name,
                operands,
                shape,
                eval,
                commutative: false,
                foldable: false,
                uses_slot: false,
            }
        }
        match self {
            Phantom => other("<none>", 0, Shape::Constant, Eval::Opaque),
            Done => other("done", 0, Shape::Varying, Eval::Live),
            LaneId => other("lane_id", 0, Shape::Varying, Eval::Pure),
            Splat => other("splat", 0, Shape::Constant, Eval::Pure),
            LoadUniform => memory("load_uniform", 1, Shape::Uniform, Eval::Pure),
            LoadContiguous => memory("load_contiguous", 0, Shape::Varying, Eval::Opaque),
            Gather => memory("gather", 1, Shape::Varying, Eval::Opaque),
            StoreContiguous => memory("store_contiguous", 1, Shape::Varying, Eval::Live),
            Scatter => memory("scatter", 2, Shape::Varying, Eval::Live),
            ScatterMasked => memory("scatter_masked", 3, Shape::Varying, Eval::Live),
            Add => alu("add", 2, true),
            Sub => alu("sub", 2, false),
            Mul => alu("mul", 2, true),
            Div => alu("div", 2, false),
            Fmad => alu("fmad", 3, true),
            Eq => alu("eq", 2, true),
            Lt => alu("lt", 2, false),
            Le => alu("le", 2, false),
            And => alu("and", 2, true),
            Or => alu("or", 2, true),
            Xor => alu("xor", 2, true),
            Not => alu("not", 1, false),
            Select => alu("select", 3, false),
            Mutate => other("mutate", 2, Shape::Varying, Eval::Live),
            Jump => other("jump", 2, Shape::Varying, Eval::Live),
        }
    }

    pub const fn name(self) -> &'static str {
        self.info().name
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
