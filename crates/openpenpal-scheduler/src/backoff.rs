//! Exponential backoff with jitter for retry scheduling.
//! Base 100 ms, factor 2, jitter ±20%.

use std::time::Duration;

use rand::Rng;

const BASE_MS: u64 = 100;
const FACTOR: u32 = 2;
const JITTER_FRACTION: f64 = 0.2;

pub fn next_delay(retry_count: u32) -> Duration {
    let raw_ms = BASE_MS as f64 * (FACTOR as f64).powi(retry_count as i32);
    let jitter = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let jittered_ms = (raw_ms * (1.0 + jitter)).max(0.0);
    Duration::from_millis(jittered_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_retry_count_within_jitter_bounds() {
        for retry in 0..5 {
            let delay = next_delay(retry);
            let expected = BASE_MS as f64 * (FACTOR as f64).powi(retry as i32);
            let lower = expected * (1.0 - JITTER_FRACTION) as f64 * 0.99;
            let upper = expected * (1.0 + JITTER_FRACTION) as f64 * 1.01;
            let actual = delay.as_millis() as f64;
            assert!(actual >= lower && actual <= upper, "retry {retry}: {actual} not in [{lower}, {upper}]");
        }
    }
}
