//! Poll results

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Metric name → value mapping fetched from a device.
pub type PollData = BTreeMap<String, serde_json::Value>;

/// The published state of a device poller.
///
/// `data` always holds the last successfully fetched metrics so
/// consumers keep a usable value across transient failures; `success`
/// reflects only the most recent attempt.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollResult {
    /// Last successfully fetched metrics (empty until the first success)
    pub data: PollData,

    /// Whether the latest poll attempt succeeded
    pub success: bool,

    /// Time of the last successful fetch
    pub fetched_at: Option<DateTime<Utc>>,
}

impl PollResult {
    /// A fresh successful result.
    pub fn ok(data: PollData) -> Self {
        Self {
            data,
            success: true,
            fetched_at: Some(Utc::now()),
        }
    }

    /// Mark the latest attempt failed, keeping the cached data.
    pub fn failed(&self) -> Self {
        Self {
            data: self.data.clone(),
            success: false,
            fetched_at: self.fetched_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_keeps_cached_data() {
        let mut data = PollData::new();
        data.insert("temperature".to_string(), serde_json::json!(21.5));

        let good = PollResult::ok(data.clone());
        let degraded = good.failed();

        assert!(!degraded.success);
        assert_eq!(degraded.data, data);
        assert_eq!(degraded.fetched_at, good.fetched_at);
    }

    #[test]
    fn test_default_is_empty_and_unsuccessful() {
        let result = PollResult::default();
        assert!(result.data.is_empty());
        assert!(!result.success);
        assert!(result.fetched_at.is_none());
    }
}
