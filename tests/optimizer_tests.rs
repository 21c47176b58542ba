//! Construction-time optimizer and compile pass tests.
//!
//! These check hash-consing, canonicalization, aliasing, dead-code
//! elimination and the invariant/loop partition without running anything.

mod common;

use tapevm::{Builder, Op, Shape};

/// A builder with one contiguous load from slot 0 already in place.
fn with_varying_load(slots: usize) -> (Builder, tapevm::Value) {
    common::init_logging();
    let mut b = Builder::new(slots);
    let ix = b.lane_id();
    let x = b.load(0, ix);
    (b, x)
}

#[test]
fn test_cse() {
    let (mut b, x) = with_varying_load(1);
    let y = b.mul(x, x);
    let z = b.mul(x, x);
    assert_eq!(y, z);
}

#[test]
fn test_no_cse_after_mutate() {
    let (mut b, x) = with_varying_load(1);
    let y = b.mul(x, x);
    b.mutate(x, y);
    let z = b.mul(x, x);
    assert_ne!(y, z);
    assert_eq!(b.stats().cse_resets, 1);
}

#[test]
fn test_mutate_is_not_retroactive() {
    let (mut b, x) = with_varying_load(1);
    let two = b.splat(2.0);
    let before = b.mul(x, two);
    assert_eq!(b.mul(x, two), before);

    let next = b.add(x, two);
    b.mutate(x, next);
    let two = b.splat(2.0);
    let after = b.mul(x, two);
    assert_ne!(after, before);
    assert_eq!(b.op(before), Op::Mul);
    assert_eq!(b.mul(x, two), after);
}

#[test]
fn test_cse_sort() {
    let (mut b, x) = with_varying_load(1);
    let c = b.splat(2.0);
    let y = b.mul(x, c);
    let k = b.splat(2.0);
    let z = b.mul(k, x);
    assert_eq!(c, k);
    assert_eq!(y, z);
}

#[test]
fn test_cse_no_sort() {
    let (mut b, x) = with_varying_load(1);
    let c = b.splat(2.0);
    let y = b.div(x, c);
    let z = b.div(c, x);
    assert_ne!(y, z);
    let y = b.sub(x, c);
    let z = b.sub(c, x);
    assert_ne!(y, z);
    let y = b.lt(x, c);
    let z = b.lt(c, x);
    assert_ne!(y, z);
}

#[test]
fn test_commutative_ops_canonicalize() {
    let (mut b, x) = with_varying_load(2);
    let ix = b.lane_id();
    let y = b.load(1, ix);
    for op in [Builder::add, Builder::mul, Builder::eq, Builder::and, Builder::or, Builder::xor] {
        let xy = op(&mut b, x, y);
        let yx = op(&mut b, y, x);
        assert_eq!(xy, yx);
    }
}

#[test]
fn test_mirrored_comparisons_share_identity() {
    let (mut b, x) = with_varying_load(1);
    let c = b.splat(1.0);
    let gt = b.gt(x, c);
    let lt = b.lt(c, x);
    assert_eq!(gt, lt);
    let ge = b.ge(x, c);
    let le = b.le(c, x);
    assert_eq!(ge, le);
}

#[test]
fn test_lane_id_cse() {
    let mut b = Builder::new(0);
    let x = b.lane_id();
    let y = b.lane_id();
    assert_eq!(x, y);
    assert_eq!(b.shape(x), Shape::Varying);
}

#[test]
fn test_uniform_load_cse() {
    let mut b = Builder::new(1);
    let x = b.uniform(0, 0.0);
    let y = b.uniform(0, 0.0);
    assert_eq!(x, y);
    assert_eq!(b.shape(x), Shape::Uniform);
}

#[test]
fn test_varying_load_no_cse() {
    let (mut b, x) = with_varying_load(1);
    let ix = b.lane_id();
    let y = b.load(0, ix);
    assert_ne!(x, y);
    let g1 = b.load(0, x);
    let g2 = b.load(0, x);
    assert_ne!(g1, g2);
    assert_eq!(b.op(g1), Op::Gather);
}

#[test]
fn test_store_separates_loads_of_same_slot() {
    let mut b = Builder::new(2);
    let before = b.uniform(0, 0.0);
    let other_before = b.uniform(1, 0.0);

    let ix = b.lane_id();
    let one = b.splat(1.0);
    b.store(0, ix, one);

    let after = b.uniform(0, 0.0);
    let other_after = b.uniform(1, 0.0);
    assert_ne!(before, after);
    assert_eq!(other_before, other_after);
}

#[test]
fn test_load_forms() {
    let (mut b, x) = with_varying_load(2);
    assert_eq!(b.op(x), Op::LoadContiguous);
    let u = b.uniform(1, 0.0);
    assert_eq!(b.op(u), Op::LoadUniform);
    let indirect = b.load(1, u);
    assert_eq!(b.op(indirect), Op::LoadUniform);
    let gathered = b.load(1, x);
    assert_eq!(b.op(gathered), Op::Gather);
    assert_eq!(b.shape(gathered), Shape::Varying);
}

#[test]
fn test_mutated_lane_id_is_not_contiguous() {
    let mut b = Builder::new(1);
    let i = b.lane_id();
    let one = b.splat(1.0);
    let next = b.add(i, one);
    b.mutate(i, next);
    let x = b.load(0, i);
    assert_eq!(b.op(x), Op::Gather);
}

#[test]
fn test_fusion_removes_multiply() {
    let (mut b, x) = with_varying_load(1);
    let y = b.mul(x, x);
    let three = b.splat(3.0);
    let z = b.add(y, three);
    let ix = b.lane_id();
    b.store(0, ix, z);

    let program = b.compile();
    assert_eq!(program.stats().emitted("fmad"), 1);
    assert_eq!(program.stats().emitted("mul"), 0);
    assert_eq!(program.stats().emitted("add"), 0);
}

#[test]
fn test_no_fusion_across_mutate() {
    let (mut b, x) = with_varying_load(1);
    let p = b.mul(x, x);
    let ten = b.splat(10.0);
    let bumped = b.add(x, ten);
    b.mutate(x, bumped);
    let one = b.splat(1.0);
    let y = b.add(p, one);
    assert_eq!(b.op(y), Op::Add);
    assert_eq!(b.stats().fused_multiply_adds, 0);

    // A product built after the mutate still fuses.
    let q = b.mul(x, x);
    let z = b.add(q, one);
    assert_eq!(b.op(z), Op::Fmad);
    assert_eq!(b.stats().fused_multiply_adds, 1);
}

#[test]
fn test_dead_code_count() {
    let mut b = Builder::new(1);
    let live = b.splat(2.0);
    let _dead = b.splat(4.0);
    let ix = b.lane_id();
    b.store(0, ix, live);
    let program = b.compile();
    assert_eq!(program.len(), 3);
}

#[test]
fn test_emitted_count_matches_reachable() {
    let (mut b, x) = with_varying_load(2);
    let sq = b.mul(x, x);
    let _unused_sum = b.add(sq, x);
    let u = b.uniform(1, 0.0);
    let _unused_uniform = b.mul(u, u);
    let scaled = b.mul(x, u);
    let ix = b.lane_id();
    b.store(0, ix, scaled);

    let program = b.compile();
    // Reachable: splat(0) index, load_uniform, load_contiguous, mul, store, done.
    assert_eq!(program.len(), 6);
    assert_eq!(program.stats().live_instructions, 6);
}

#[test]
fn test_loop_invariant_partition() {
    let (mut b, x) = with_varying_load(2);
    let u = b.uniform(1, 0.0);
    let v = b.uniform(1, 1.0);
    let one = b.splat(1.0);
    let uv = b.div(u, v);
    let k = b.sub(uv, one);
    let y = b.mul(x, k);
    let ix = b.lane_id();
    b.store(0, ix, y);

    let program = b.compile();
    // splat(0), load_uniform, splat(1) (also the second index), load_uniform, div, sub
    assert_eq!(program.loop_offset(), 6);
    for inst in &program.instructions()[..program.loop_offset()] {
        let hoistable = matches!(inst.op, Op::Splat | Op::LoadUniform | Op::Div | Op::Sub);
        assert!(hoistable, "{} hoisted", inst.op);
    }
    let suffix: Vec<_> = program.ops().skip(program.loop_offset()).collect();
    assert_eq!(suffix, [Op::LoadContiguous, Op::Mul, Op::StoreContiguous, Op::Done]);
}

#[test]
fn test_suffix_never_feeds_prefix() {
    let (mut b, x) = with_varying_load(2);
    let u = b.uniform(1, 0.0);
    let y = b.add(x, u);
    let cond = b.lt(y, u);
    let z = b.select(cond, y, x);
    let ix = b.lane_id();
    b.store(0, ix, z);

    let program = b.compile();
    let tape = program.instructions();
    for (pos, inst) in tape.iter().enumerate().take(program.loop_offset()) {
        for offset in [inst.x, inst.y, inst.z] {
            let operand = pos as i64 + offset as i64;
            assert!(operand <= pos as i64 && operand < program.loop_offset() as i64);
        }
    }
    assert_eq!(tape.last().map(|inst| inst.op), Some(Op::Done));
}

#[test]
fn test_stats_report() {
    let mut b = Builder::new(1);
    let two = b.splat(2.0);
    let four = b.mul(two, two);
    let again = b.splat(4.0);
    assert_eq!(four, again);
    let ix = b.lane_id();
    b.store(0, ix, four);

    let program = b.compile();
    let stats = program.stats();
    assert_eq!(stats.constants_folded, 1);
    assert_eq!(stats.cse_hits, 1);
    assert_eq!(stats.invariant_instructions, 1);
    assert!(stats.to_string().contains("Constants folded: 1"));
}
