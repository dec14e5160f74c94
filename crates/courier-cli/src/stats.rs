//! Latency statistics (ms) for the smoke run.

use serde_json::{Value, json};

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[u64], p: u32) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (u64::from(p) * sorted.len() as u64).div_ceil(100) as usize;
    Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: usize,
    pub min: u64,
    pub max: u64,
    pub avg: u64,
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
}

impl LatencyStats {
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let sum: u64 = sorted.iter().sum();
        let avg = (sum as f64 / sorted.len() as f64).round() as u64;

        Some(Self {
            count: sorted.len(),
            min,
            max,
            avg,
            p50: percentile(&sorted, 50)?,
            p90: percentile(&sorted, 90)?,
            p95: percentile(&sorted, 95)?,
            p99: percentile(&sorted, 99)?,
        })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "count": self.count,
            "min": self.min,
            "avg": self.avg,
            "p50": self.p50,
            "p90": self.p90,
            "p95": self.p95,
            "p99": self.p99,
            "max": self.max,
        })
    }
}
