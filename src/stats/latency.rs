//! Order statistics over latency samples in whole milliseconds. Every function
//! taking a slice expects it sorted ascending and returns 0 for an empty one.

pub fn sort_latencies(mut samples: Vec<u64>) -> Vec<u64> {
    samples.sort_unstable();
    samples
}

pub fn shortest(sorted: &[u64]) -> u64 {
    sorted.first().copied().unwrap_or(0)
}

pub fn longest(sorted: &[u64]) -> u64 {
    sorted.last().copied().unwrap_or(0)
}

/// Middle element for an odd count, mean of the two middle elements otherwise.
pub fn median(sorted: &[u64]) -> f64 {
    let len = sorted.len();
    if len == 0 {
        return 0.0;
    }
    let mid = len / 2;
    if len % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    }
}

pub fn mean(samples: &[u64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: u128 = samples.iter().map(|&s| s as u128).sum();
    total as f64 / samples.len() as f64
}

/// Nearest-rank percentile, `p` in (0, 100].
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
