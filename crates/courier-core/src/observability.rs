//! Observability - tracing の初期化とキューの集計ビュー

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Snapshot of a queue's message population.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    /// Visible and waiting for a consumer.
    pub available: usize,
    /// Leased or delayed, not yet visible again.
    pub in_flight: usize,
    pub sent: u64,
    pub acknowledged: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber. Filter comes from `RUST_LOG`, default `info`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_target(false)
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_repeat_safe() {
        init_tracing(LogFormat::Json);
        init_tracing(LogFormat::Pretty);
    }

    #[test]
    fn counts_serialize_camel_case() {
        let counts = QueueCounts {
            available: 1,
            in_flight: 2,
            sent: 3,
            acknowledged: 1,
            dead_lettered: 1,
        };
        let v = serde_json::to_value(&counts).unwrap();
        assert_eq!(v["inFlight"], 2);
        assert_eq!(v["deadLettered"], 1);
    }
}
