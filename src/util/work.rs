//! Synthetic critical-section workload.

use std::hint::black_box;

/// Spin for `iterations` steps without yielding.
///
/// Every step goes through `black_box` so the loop cannot be folded away; the
/// cost scales with the count rather than with wall-clock time.
pub fn busy_work(iterations: u32) {
    let mut n = 0u32;
    while black_box(n) < iterations {
        n = black_box(n + 1);
    }
}
