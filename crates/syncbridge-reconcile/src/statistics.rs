//! Run statistics.

use serde::{Deserialize, Serialize};

/// Counters describing one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Records extracted from the source collection.
    #[serde(default)]
    pub source_records: usize,
    /// Records extracted from the destination collection.
    #[serde(default)]
    pub destination_records: usize,
    /// Source records paired with a destination record.
    #[serde(default)]
    pub matched: usize,
    /// Source records without a partner, null keys included.
    #[serde(default)]
    pub unmatched: usize,
    /// Records on either side whose key was absent or blank.
    #[serde(default)]
    pub null_keys: usize,
    /// Destination records shadowed by an earlier record with the same key.
    #[serde(default)]
    pub duplicate_destination_keys: usize,
    /// Wall time of the run in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl RunStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of source records that found a partner, in percent.
    #[must_use]
    pub fn match_rate(&self) -> f64 {
        if self.source_records == 0 {
            0.0
        } else {
            (self.matched as f64 / self.source_records as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_rate() {
        let stats = RunStatistics {
            source_records: 4,
            matched: 3,
            unmatched: 1,
            ..RunStatistics::new()
        };
        assert!((stats.match_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(RunStatistics::new().match_rate(), 0.0);
    }
}
