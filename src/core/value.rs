//! Value identities, the shape lattice and evaluation policies.
//!
//! These are the typed building blocks every builder instruction carries.

use std::fmt;

/// Identity of a builder instruction.
///
/// Identities are handed out in construction order and stay valid until the
/// builder is compiled. `Value::NONE` (id 0) is a phantom constant that fills
/// unused operand slots, so every instruction can carry three operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Value(u32);

impl Value {
    /// The phantom "no operand" value.
    pub const NONE: Value = Value(0);

    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Index into the builder's instruction array.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// How much a value may vary, weakest first.
///
/// The derived `Ord` is the lattice order: a derived value's shape is the
/// maximum of its operator's intrinsic shape and all of its operands' shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Shape {
    /// A single scalar immediate known while building.
    Constant,
    /// The same in every lane of one `execute` call.
    Uniform,
    /// May differ from lane to lane.
    Varying,
}

impl Shape {
    /// Least upper bound of two shapes.
    pub fn join(self, other: Shape) -> Shape {
        self.max(other)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Constant => "constant",
            Shape::Uniform => "uniform",
            Shape::Varying => "varying",
        };
        f.write_str(name)
    }
}

/// Evaluation policy of a builder instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eval {
    /// Pure; structurally identical instructions are hash-consed.
    Pure,
    /// Pure-looking but never deduplicated (per-lane loads).
    Opaque,
    /// Has an effect; always kept and always a dead-code root.
    Live,
}

impl Eval {
    pub fn is_cacheable(self) -> bool {
        self == Eval::Pure
    }
}
