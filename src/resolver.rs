//! Match resolution: best candidate selection and the threshold decision.

use crate::error::ConfigError;
use crate::models::ScoredCandidate;

/// Distance cut-offs. Below `low` is accepted without asking, above `high`
/// rejected without asking, anything in between goes to a human.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    low: f64,
    high: f64,
}

impl Thresholds {
    pub fn new(low: f64, high: f64) -> Result<Self, ConfigError> {
        // NaN bounds are invalid
        if !(low >= 0.0 && low <= high) {
            return Err(ConfigError::InvalidThresholds { low, high });
        }
        Ok(Self { low, high })
    }

    /// Distance assigned to a candidate that could not be scored. Always rejected.
    pub fn unscorable_distance(&self) -> f64 {
        f64::INFINITY
    }

    pub fn decide(&self, distance: f64) -> Decision {
        if distance < self.low {
            Decision::AutoAccept
        } else if distance <= self.high {
            Decision::Confirm
        } else {
            // > high, and NaN
            Decision::AutoReject
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: crate::config::DEFAULT_LOW_THRESHOLD,
            high: crate::config::DEFAULT_HIGH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AutoAccept,
    Confirm,
    AutoReject,
}

/// Pick the minimum-distance candidate; ties go to the lowest `raw_rank`.
/// Returns `None` for an empty list.
pub fn select_best(scored: Vec<ScoredCandidate>) -> Option<ScoredCandidate> {
    scored.into_iter().min_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.candidate.raw_rank.cmp(&b.candidate.raw_rank))
    })
}
