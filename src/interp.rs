//! Tape interpreter.
//!
//! A [`Program`] runs over `n` lanes in chunks of [`LANES`]: the first chunk
//! walks the whole tape, every later chunk re-enters at the loop offset and
//! reuses the invariant prefix already sitting in the register file. Lanes
//! left over after the last full chunk run one at a time through the same
//! kernels with a width of one.
//!
//! Dispatch is an explicit cursor loop over the opcode. Registers are indexed
//! by tape position, so an operand is found at `pc + offset`.

use crate::core::{ExecError, ExecResult};
use crate::ir::Op;
use crate::program::Program;

/// Number of lanes held by one register.
pub const LANES: usize = 4;

/// One register: `LANES` raw 32-bit lanes, read as `f32` or as bit masks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(16))]
pub struct Reg(pub [u32; LANES]);

impl Reg {
    /// Broadcast one bit pattern to every lane.
    pub fn splat(bits: u32) -> Self {
        Reg([bits; LANES])
    }

    pub fn lane_f32(&self, lane: usize) -> f32 {
        f32::from_bits(self.0[lane])
    }

    fn any(&self, lanes: usize) -> bool {
        self.0[..lanes].iter().any(|&bits| bits != 0)
    }
}

const TRUE: u32 = !0;

fn mask(cond: bool) -> u32 {
    if cond { TRUE } else { 0 }
}

/// Truncate a lane value to a buffer index.
fn index(bits: u32) -> usize {
    f32::from_bits(bits) as usize
}

fn float_op<F>(x: &Reg, y: &Reg, lanes: usize, f: F) -> Reg
where
    F: Fn(f32, f32) -> f32,
{
    let mut out = Reg::default();
    for i in 0..lanes {
        out.0[i] = f(x.lane_f32(i), y.lane_f32(i)).to_bits();
    }
    out
}

fn compare_op<F>(x: &Reg, y: &Reg, lanes: usize, f: F) -> Reg
where
    F: Fn(f32, f32) -> bool,
{
    let mut out = Reg::default();
    for i in 0..lanes {
        out.0[i] = mask(f(x.lane_f32(i), y.lane_f32(i)));
    }
    out
}

fn bit_op<F>(x: &Reg, y: &Reg, z: &Reg, lanes: usize, f: F) -> Reg
where
    F: Fn(u32, u32, u32) -> u32,
{
    let mut out = Reg::default();
    for i in 0..lanes {
        out.0[i] = f(x.0[i], y.0[i], z.0[i]);
    }
    out
}

/// Evaluate a pure lane operator over the first `lanes` lanes.
///
/// The interpreter and the builder's constant folder both go through here,
/// so a folded constant is bit-identical to what the tape would compute.
pub(crate) fn alu(op: Op, x: &Reg, y: &Reg, z: &Reg, lanes: usize) -> Reg {
    match op {
        Op::Add => float_op(x, y, lanes, |a, b| a + b),
        Op::Sub => float_op(x, y, lanes, |a, b| a - b),
        Op::Mul => float_op(x, y, lanes, |a, b| a * b),
        Op::Div => float_op(x, y, lanes, |a, b| a / b),
        // Two roundings, same as the unfused mul + add it replaces.
        Op::Fmad => {
            let product = float_op(x, y, lanes, |a, b| a * b);
            float_op(&product, z, lanes, |p, c| p + c)
        }
        Op::Eq => compare_op(x, y, lanes, |a, b| a == b),
        Op::Lt => compare_op(x, y, lanes, |a, b| a < b),
        Op::Le => compare_op(x, y, lanes, |a, b| a <= b),
        Op::And => bit_op(x, y, z, lanes, |a, b, _| a & b),
        Op::Or => bit_op(x, y, z, lanes, |a, b, _| a | b),
        Op::Xor => bit_op(x, y, z, lanes, |a, b, _| a ^ b),
        Op::Not => bit_op(x, y, z, lanes, |a, _, _| !a),
        Op::Select => bit_op(x, y, z, lanes, |c, t, f| (c & t) | (!c & f)),
        _ => unreachable!("{op} is not a lane operator"),
    }
}

/// Fold a pure operator applied to scalar immediates.
pub(crate) fn fold(op: Op, x: u32, y: u32, z: u32) -> u32 {
    alu(op, &Reg::splat(x), &Reg::splat(y), &Reg::splat(z), 1).0[0]
}

impl Program {
    /// Run the program over `n` lanes.
    ///
    /// `slots` are the external buffers addressed by pointer-slot index.
    /// Indexing past the end of a buffer is a caller bug and panics; use
    /// [`Program::try_execute`] to check the contiguous accesses up front.
    pub fn execute(&self, n: usize, slots: &mut [&mut [f32]]) {
        let full = n / LANES * LANES;
        log::debug!(
            "execute: {} lanes ({} chunks of {}, {} remainder) over {} instructions",
            n,
            full / LANES,
            LANES,
            n - full,
            self.len()
        );

        let mut regs = vec![Reg::default(); self.len()];
        let mut start = 0;

        let mut base = 0;
        while base < full {
            self.run(&mut regs, start, base, LANES, slots);
            start = self.loop_offset();
            base += LANES;
        }
        while base < n {
            self.run(&mut regs, start, base, 1, slots);
            start = self.loop_offset();
            base += 1;
        }
    }

    /// Validate buffer contracts, then [`execute`](Program::execute).
    pub fn try_execute(&self, n: usize, slots: &mut [&mut [f32]]) -> ExecResult<()> {
        if slots.len() < self.slots() {
            return Err(ExecError::MissingSlot {
                needed: self.slots(),
                provided: slots.len(),
            });
        }
        for inst in self.instructions() {
            if matches!(inst.op, Op::LoadContiguous | Op::StoreContiguous) {
                let slot = inst.slot();
                if slots[slot].len() < n {
                    return Err(ExecError::ShortBuffer {
                        slot,
                        len: slots[slot].len(),
                        needed: n,
                    });
                }
            }
        }
        self.execute(n, slots);
        Ok(())
    }

    /// Walk the tape from `start` until `done`, computing lanes
    /// `base..base + lanes`.
    fn run(
        &self,
        regs: &mut [Reg],
        start: usize,
        base: usize,
        lanes: usize,
        slots: &mut [&mut [f32]],
    ) {
        let tape = self.instructions();
        let mut pc = start;
        loop {
            let inst = tape[pc];
            let here = pc;
            let at = move |offset: i32| here.wrapping_add_signed(offset as isize);

            let result = match inst.op {
                Op::Done | Op::Phantom => return,

                Op::LaneId => {
                    let mut out = Reg::default();
                    for (i, lane) in out.0.iter_mut().enumerate().take(lanes) {
                        *lane = ((base + i) as f32).to_bits();
                    }
                    out
                }
                Op::Splat => Reg::splat(inst.imm),

                Op::LoadUniform => {
                    let ix = index(regs[at(inst.x)].0[0]);
                    Reg::splat(slots[inst.slot()][ix].to_bits())
                }
                Op::LoadContiguous => {
                    let src = &slots[inst.slot()][base..base + lanes];
                    let mut out = Reg::default();
                    for (lane, value) in out.0.iter_mut().zip(src) {
                        *lane = value.to_bits();
                    }
                    out
                }
                Op::Gather => {
                    let ix = regs[at(inst.x)];
                    let src = &slots[inst.slot()];
                    let mut out = Reg::default();
                    for i in 0..lanes {
                        out.0[i] = src[index(ix.0[i])].to_bits();
                    }
                    out
                }

                Op::StoreContiguous => {
                    let val = regs[at(inst.x)];
                    let dst = &mut slots[inst.slot()][base..base + lanes];
                    for (value, &bits) in dst.iter_mut().zip(&val.0) {
                        *value = f32::from_bits(bits);
                    }
                    Reg::default()
                }
                Op::Scatter | Op::ScatterMasked => {
                    let val = regs[at(inst.x)];
                    let ix = regs[at(inst.y)];
                    let keep = if inst.op == Op::ScatterMasked {
                        regs[at(inst.z)]
                    } else {
                        Reg::splat(TRUE)
                    };
                    let dst = &mut slots[inst.slot()];
                    for i in 0..lanes {
                        if keep.0[i] != 0 {
                            dst[index(ix.0[i])] = f32::from_bits(val.0[i]);
                        }
                    }
                    Reg::default()
                }

                Op::Mutate => {
                    regs[at(inst.x)] = regs[at(inst.y)];
                    Reg::default()
                }
                Op::Jump => {
                    if regs[at(inst.y)].any(lanes) {
                        pc = at(inst.x);
                        continue;
                    }
                    Reg::default()
                }

                op => alu(op, &regs[at(inst.x)], &regs[at(inst.y)], &regs[at(inst.z)], lanes),
            };

            regs[pc] = result;
            pc += 1;
        }
    }
}
