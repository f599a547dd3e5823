//! Randomized exponential backoff for the tunnel client's reconnect loop.

use std::time::Duration;

const BASE_MS: u64 = 1_000;
const CEILING_MS: u64 = 30_000;
const JITTER_MS: u64 = 1_000;

/// Delay before reconnect attempt `n` (`n >= 1`): `min(base*2^n, ceiling)`
/// plus a uniform random jitter in `[0, 1000)` ms.
///
/// Matches spec.md §4.3 / §8: `calculateBackoff(n)` falls in
/// `[min(1000*2^n, 30000), min(1000*2^n, 30000) + 1000]`.
pub fn calculate_backoff(attempt: u32) -> Duration {
    let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let exp = BASE_MS.saturating_mul(multiplier);
    let bounded = exp.min(CEILING_MS);
    let jitter = rand::random::<u64>() % JITTER_MS;
    Duration::from_millis(bounded + jitter)
}
