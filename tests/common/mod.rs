//! Shared helpers for the integration tests.

#![allow(dead_code)]

use tapevm::Builder;

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two floats are equivalent if they are equal or both NaN.
pub fn equiv(x: f32, y: f32) -> bool {
    (x <= y && y <= x) || (x.is_nan() && y.is_nan())
}

/// Compile `b`, run it over `n` lanes and check slot 0 against `want`.
pub fn check(b: Builder, n: usize, slots: &mut [&mut [f32]], want: &[f32]) {
    init_logging();
    let program = b.compile();
    log::debug!("\n{}", program);
    program.execute(n, slots);
    for (i, (&got, &want)) in slots[0].iter().zip(want).enumerate() {
        assert!(equiv(got, want), "lane {}: got {}, want {}", i, got, want);
    }
}
