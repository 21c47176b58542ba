// This module implements the Builder, the public surface for constructing kernels, together
// with the optimizer that runs as each value is constructed. Every constructor funnels into a
// single push routine that joins the shape lattice over the operator and its operands, folds
// pure arithmetic on constants by running the interpreter's own lane kernels on one lane,
// sorts the operands of commutative operators, and hash-conses pure instructions through the
// ConsTable so structurally identical expressions share one identity. Loads key their cache
// entry on a per-slot generation counter that every store bumps, so CSE never merges loads
// across an intervening store. A multiply feeding an add is rewritten into a fused
// multiply-add as the add is built. Mutation is modelled as a live copy plus a full reset of
// the hash-consing table.

//! Kernel construction and the construction-time optimizer.
//!
//! ```
//! use tapevm::Builder;
//!
//! let mut b = Builder::new(1);
//! let ix = b.lane_id();
//! let x = b.load(0, ix);
//! let three = b.splat(3.0);
//! let y = b.mul(x, three);
//! b.store(0, ix, y);
//!
//! let program = b.compile();
//! let mut data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
//! program.execute(data.len(), &mut [&mut data[..]]);
//! assert_eq!(data, [3.0, 6.0, 9.0, 12.0, 15.0, 18.0]);
//! ```

use crate::core::{CompileStats, ConsTable, Eval, Shape, Value};
use crate::interp;
use crate::ir::Op;
use crate::program::{self, Program};
use fnv::FnvHasher;
use hashbrown::HashSet;
use std::hash::{Hash, Hasher};

/// A builder instruction.
///
/// Operands are absolute ids of earlier instructions; unused ones are
/// [`Value::NONE`]. Equality and hashing cover the whole record, so two
/// loads only compare equal when they were built under the same slot
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BInst {
    pub op: Op,
    pub x: Value,
    pub y: Value,
    pub z: Value,
    /// Float bits or pointer slot.
    pub imm: u32,
    /// Slot generation a load was built under.
    pub generation: u32,
    pub shape: Shape,
    pub eval: Eval,
}

impl BInst {
    const fn new(op: Op) -> Self {
        let info = op.info();
        Self {
            op,
            x: Value::NONE,
            y: Value::NONE,
            z: Value::NONE,
            imm: 0,
            generation: 0,
            shape: info.shape,
            eval: info.eval,
        }
    }

    fn with_operands(op: Op, x: Value, y: Value, z: Value) -> Self {
        Self { x, y, z, ..Self::new(op) }
    }

    pub fn operands(&self) -> [Value; 3] {
        [self.x, self.y, self.z]
    }

    fn structural_hash(&self) -> u32 {
        let mut hasher = FnvHasher::default();
        self.hash(&mut hasher);
        let h = hasher.finish();
        (h ^ (h >> 32)) as u32
    }
}

/// Append-only kernel graph plus the construction-time optimizer.
///
/// Values returned by the constructors stay valid until [`Builder::compile`]
/// consumes the builder.
pub struct Builder {
    insts: Vec<BInst>,
    cse: ConsTable,
    /// Store count per pointer slot; part of every load's cache key.
    generations: Vec<u32>,
    /// Values overwritten by `mutate`; a mutated lane id no longer indexes contiguously.
    mutated: HashSet<Value>,
    /// Most recent `Mutate` instruction, or the phantom if none.
    last_mutate: Value,
    stats: CompileStats,
}

impl Builder {
    /// Create a builder for kernels addressing `slots` external buffers.
    pub fn new(slots: usize) -> Self {
        let mut stats = CompileStats::new();
        stats.instructions_pushed = 1;
        Self {
            // Phantom id 0: a constant every unused operand slot points at.
            insts: vec![BInst::new(Op::Phantom)],
            cse: ConsTable::new(),
            generations: vec![0; slots],
            mutated: HashSet::new(),
            last_mutate: Value::NONE,
            stats,
        }
    }

    /// Number of builder instructions, including the phantom at id 0.
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.len() <= 1
    }

    /// Pointer slots this builder may address.
    pub fn slots(&self) -> usize {
        self.generations.len()
    }

    pub fn shape(&self, v: Value) -> Shape {
        self.inst(v).shape
    }

    pub fn op(&self, v: Value) -> Op {
        self.inst(v).op
    }

    /// The immediate of a constant value.
    pub fn constant(&self, v: Value) -> Option<f32> {
        let inst = self.inst(v);
        (inst.op == Op::Splat).then(|| f32::from_bits(inst.imm))
    }

    pub fn stats(&self) -> &CompileStats {
        &self.stats
    }

    /// Lower into a [`Program`], consuming the builder.
    pub fn compile(self) -> Program {
        program::compile(self)
    }

    pub(crate) fn instructions(&self) -> &[BInst] {
        &self.insts
    }

    pub(crate) fn push_done(&mut self) {
        self.append(BInst::new(Op::Done));
    }

    fn inst(&self, v: Value) -> &BInst {
        assert!(
            v.index() < self.insts.len(),
            "value {} out of range ({} instructions)",
            v,
            self.insts.len()
        );
        &self.insts[v.index()]
    }

    fn check_slot(&self, slot: usize) {
        assert!(
            slot < self.generations.len(),
            "pointer slot {} out of range ({} declared)",
            slot,
            self.generations.len()
        );
    }

    fn is_lane_id(&self, v: Value) -> bool {
        self.inst(v).op == Op::LaneId && !self.mutated.contains(&v)
    }

    fn append(&mut self, inst: BInst) -> Value {
        let id = Value::new(self.insts.len() as u32);
        self.insts.push(inst);
        self.stats.instructions_pushed += 1;
        id
    }

    fn push(&mut self, mut inst: BInst) -> Value {
        let info = inst.op.info();
        inst.shape = inst
            .operands()
            .iter()
            .fold(info.shape, |shape, &v| shape.join(self.inst(v).shape));
        inst.eval = info.eval;

        if info.commutative && inst.x > inst.y {
            std::mem::swap(&mut inst.x, &mut inst.y);
        }

        if info.foldable && inst.shape == Shape::Constant {
            let [x, y, z] = inst.operands().map(|v| self.insts[v.index()].imm);
            let bits = interp::fold(inst.op, x, y, z);
            self.stats.constants_folded += 1;
            log::trace!("fold {} -> {}", inst.op, f32::from_bits(bits));
            return self.splat_bits(bits);
        }

        if !inst.eval.is_cacheable() {
            return self.append(inst);
        }

        let hash = inst.structural_hash();
        let insts = &self.insts;
        if let Some(id) = self.cse.lookup(hash, |id| insts[id as usize] == inst) {
            self.stats.cse_hits += 1;
            log::trace!("cse {} -> v{}", inst.op, id);
            return Value::new(id);
        }

        let id = self.append(inst);
        self.cse.insert(hash, id.index() as u32);
        id
    }

    fn binary(&mut self, op: Op, x: Value, y: Value) -> Value {
        self.push(BInst::with_operands(op, x, y, Value::NONE))
    }

    fn splat_bits(&mut self, bits: u32) -> Value {
        self.push(BInst { imm: bits, ..BInst::new(Op::Splat) })
    }

    /// The lane index, as a float.
    pub fn lane_id(&mut self) -> Value {
        self.push(BInst::new(Op::LaneId))
    }

    /// A constant broadcast to every lane.
    pub fn splat(&mut self, imm: f32) -> Value {
        self.splat_bits(imm.to_bits())
    }

    /// Load from pointer slot `slot` at index `ix`.
    ///
    /// A constant or uniform index reads one element per call, the lane id
    /// reads contiguously, and any other varying index gathers.
    pub fn load(&mut self, slot: usize, ix: Value) -> Value {
        self.check_slot(slot);
        let index = *self.inst(ix);
        let (op, x) = if index.shape <= Shape::Uniform {
            (Op::LoadUniform, ix)
        } else if self.is_lane_id(ix) {
            (Op::LoadContiguous, Value::NONE)
        } else {
            (Op::Gather, ix)
        };
        self.push(BInst {
            x,
            imm: slot as u32,
            generation: self.generations[slot],
            ..BInst::new(op)
        })
    }

    /// Load the uniform at a constant index of `slot`.
    pub fn uniform(&mut self, slot: usize, index: f32) -> Value {
        let ix = self.splat(index);
        self.load(slot, ix)
    }

    /// Store `val` into pointer slot `slot` at index `ix`.
    ///
    /// The lane id stores contiguously; any other index scatters. A uniform
    /// index scatters every lane to one element, and the last lane wins.
    pub fn store(&mut self, slot: usize, ix: Value, val: Value) {
        self.check_slot(slot);
        let inst = if self.is_lane_id(ix) {
            BInst { x: val, ..BInst::new(Op::StoreContiguous) }
        } else {
            BInst::with_operands(Op::Scatter, val, ix, Value::NONE)
        };
        self.push_store(slot, inst);
    }

    /// Store `val` only in lanes where `mask` is non-zero.
    pub fn store_masked(&mut self, slot: usize, ix: Value, val: Value, mask: Value) {
        self.check_slot(slot);
        self.push_store(slot, BInst::with_operands(Op::ScatterMasked, val, ix, mask));
    }

    fn push_store(&mut self, slot: usize, inst: BInst) {
        self.push(BInst { imm: slot as u32, ..inst });
        // Later loads from this slot must not hash-cons with earlier ones.
        self.generations[slot] = self.generations[slot].wrapping_add(1);
    }

    pub fn add(&mut self, x: Value, y: Value) -> Value {
        for (product, addend) in [(x, y), (y, x)] {
            let mul = *self.inst(product);
            // Registers read by a multiply built before the last mutate may
            // have been overwritten since, so only a later product is rebuilt.
            if mul.op == Op::Mul && product > self.last_mutate {
                self.stats.fused_multiply_adds += 1;
                log::trace!("fuse {} * {} + {}", mul.x, mul.y, addend);
                return self.fmad(mul.x, mul.y, addend);
            }
        }
        self.binary(Op::Add, x, y)
    }

    pub fn sub(&mut self, x: Value, y: Value) -> Value {
        self.binary(Op::Sub, x, y)
    }

    pub fn mul(&mut self, x: Value, y: Value) -> Value {
        self.binary(Op::Mul, x, y)
    }

    pub fn div(&mut self, x: Value, y: Value) -> Value {
        self.binary(Op::Div, x, y)
    }

    /// `x * y + z`.
    pub fn fmad(&mut self, x: Value, y: Value, z: Value) -> Value {
        self.push(BInst::with_operands(Op::Fmad, x, y, z))
    }

    pub fn eq(&mut self, x: Value, y: Value) -> Value {
        self.binary(Op::Eq, x, y)
    }

    pub fn ne(&mut self, x: Value, y: Value) -> Value {
        let eq = self.eq(x, y);
        self.not(eq)
    }

    pub fn lt(&mut self, x: Value, y: Value) -> Value {
        self.binary(Op::Lt, x, y)
    }

    pub fn le(&mut self, x: Value, y: Value) -> Value {
        self.binary(Op::Le, x, y)
    }

    pub fn gt(&mut self, x: Value, y: Value) -> Value {
        self.lt(y, x)
    }

    pub fn ge(&mut self, x: Value, y: Value) -> Value {
        self.le(y, x)
    }

    pub fn and(&mut self, x: Value, y: Value) -> Value {
        self.binary(Op::And, x, y)
    }

    pub fn or(&mut self, x: Value, y: Value) -> Value {
        self.binary(Op::Or, x, y)
    }

    pub fn xor(&mut self, x: Value, y: Value) -> Value {
        self.binary(Op::Xor, x, y)
    }

    pub fn not(&mut self, x: Value) -> Value {
        self.push(BInst::with_operands(Op::Not, x, Value::NONE, Value::NONE))
    }

    /// Per-bit `cond ? t : f`.
    pub fn select(&mut self, cond: Value, t: Value, f: Value) -> Value {
        self.push(BInst::with_operands(Op::Select, cond, t, f))
    }

    /// Overwrite the register of `var` with `val` from here on.
    ///
    /// Existing handles to `var` read the new value wherever the copy has run.
    /// Every hash-consed entry is forgotten, since an expression over `var`
    /// built after this point must not reuse one built before it.
    pub fn mutate(&mut self, var: Value, val: Value) {
        assert_eq!(
            self.inst(var).shape,
            Shape::Varying,
            "mutated value {} must be varying",
            var
        );
        self.last_mutate = self.push(BInst::with_operands(Op::Mutate, var, val, Value::NONE));
        self.mutated.insert(var);

        // TODO: per-variable versioning would let unrelated expressions keep hash-consing.
        self.cse.clear();
        self.stats.cse_resets += 1;
        log::trace!("mutate {} <- {}, cse reset", var, val);
    }

    /// Jump back to `target` while any lane of `cond` is non-zero.
    pub fn jump(&mut self, target: Value, cond: Value) {
        let target_shape = self.inst(target).shape;
        assert_eq!(target_shape, Shape::Varying, "jump target {} must be varying", target);
        let cond_shape = self.inst(cond).shape;
        assert_eq!(cond_shape, Shape::Varying, "loop condition {} must be varying", cond);
        self.push(BInst::with_operands(Op::Jump, target, cond, Value::NONE));
    }

    /// Re-run everything from `cond`'s computation while any lane of it holds.
    ///
    /// The back edge lands wherever `cond` sits on the tape, so `cond` must be
    /// a fresh instruction at the top of the loop body. If an identical
    /// comparison was built earlier with no `mutate` in between, hash-consing
    /// hands back that earlier instruction and the loop re-enters there.
    pub fn loop_while(&mut self, cond: Value) {
        self.jump(cond, cond);
    }
}
