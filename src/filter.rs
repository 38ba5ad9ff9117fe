//! Accept/reject policy for incoming fixes.
//!
//! The filter is a pure predicate over (candidate, last accepted point). It has
//! no side effects and returns the same answer for the same inputs.
//!
//! Rules, in order:
//! 1. Reject if accuracy is worse than the threshold.
//! 2. Accept if there is no previous point (cold start).
//! 3. Reject if the timestamp does not advance.
//! 4. Reject if the implied speed exceeds the walking ceiling *and* the gap
//!    is shorter than the staleness threshold (a GPS jump).
//! 5. Otherwise accept.

use crate::config::TrackerConfig;
use crate::geo_utils::DistanceFormula;
use crate::{Fix, TrackPoint};

/// Why a fix was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    Accept,
    /// First point of a session
    AcceptColdStart,
    RejectAccuracy { accuracy: f64 },
    RejectNonMonotonic { delta_ms: i64 },
    RejectJump { speed_mps: f64, delta_ms: i64 },
}

impl FilterDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, FilterDecision::Accept | FilterDecision::AcceptColdStart)
    }
}

/// Stateless fix filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointFilter {
    accuracy_threshold_m: f64,
    max_speed_mps: f64,
    staleness_threshold_ms: i64,
    formula: DistanceFormula,
}

impl Default for PointFilter {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

impl PointFilter {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            accuracy_threshold_m: config.accuracy_threshold_m,
            max_speed_mps: config.max_walking_speed_mps,
            staleness_threshold_ms: config.staleness_threshold_ms,
            formula: config.distance_formula,
        }
    }

    /// Use a specific distance formula for the speed check.
    pub fn with_formula(mut self, formula: DistanceFormula) -> Self {
        self.formula = formula;
        self
    }

    /// Decide whether `candidate` should follow `last`.
    pub fn should_accept(&self, candidate: &Fix, last: Option<&TrackPoint>) -> bool {
        self.evaluate(candidate, last).is_accept()
    }

    /// Like [`should_accept`](Self::should_accept), but reports the reason.
    pub fn evaluate(&self, candidate: &Fix, last: Option<&TrackPoint>) -> FilterDecision {
        if candidate.accuracy > self.accuracy_threshold_m {
            return FilterDecision::RejectAccuracy {
                accuracy: candidate.accuracy,
            };
        }

        let Some(last) = last else {
            return FilterDecision::AcceptColdStart;
        };

        // Saturates so extreme timestamps reject (or read as stale) instead of overflowing
        let delta_ms = candidate.timestamp.saturating_sub(last.timestamp);
        if delta_ms <= 0 {
            return FilterDecision::RejectNonMonotonic { delta_ms };
        }

        let distance = self.formula.distance(&last.position(), &candidate.position());
        let speed_mps = distance / (delta_ms as f64 / 1000.0);

        // Same displacement is plausible once enough real time has passed
        if speed_mps > self.max_speed_mps && delta_ms < self.staleness_threshold_ms {
            return FilterDecision::RejectJump {
                speed_mps,
                delta_ms,
            };
        }

        FilterDecision::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_at(lat: f64, lng: f64, timestamp: i64) -> TrackPoint {
        TrackPoint::from_fix("s", &Fix::new(lat, lng, timestamp, 3.0))
    }

    #[test]
    fn test_rejects_poor_accuracy_regardless_of_history() {
        let filter = PointFilter::default();
        let fix = Fix::new(51.5, -0.12, 1_000, 25.1);
        assert!(!filter.should_accept(&fix, None));
        assert!(!filter.should_accept(&fix, Some(&last_at(51.5, -0.12, 0))));

        let fix = Fix::new(51.5, -0.12, 1_000, 100.0);
        assert!(matches!(
            filter.evaluate(&fix, None),
            FilterDecision::RejectAccuracy { .. }
        ));
    }

    #[test]
    fn test_accepts_first_fix() {
        let filter = PointFilter::default();
        assert!(filter.should_accept(&Fix::new(51.5, -0.12, 0, 25.0), None));
        assert_eq!(
            filter.evaluate(&Fix::new(51.5, -0.12, 0, 5.0), None),
            FilterDecision::AcceptColdStart
        );
    }

    #[test]
    fn test_rejects_non_monotonic() {
        let filter = PointFilter::default();
        let last = last_at(51.5, -0.12, 5_000);
        assert!(!filter.should_accept(&Fix::new(51.5, -0.12, 5_000, 3.0), Some(&last)));
        assert!(!filter.should_accept(&Fix::new(51.5, -0.12, 4_000, 3.0), Some(&last)));
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let filter = PointFilter::default();
        let last = last_at(51.5, -0.12, 1_000);
        assert_eq!(
            filter.evaluate(&Fix::new(51.5, -0.12, i64::MIN, 3.0), Some(&last)),
            FilterDecision::RejectNonMonotonic { delta_ms: i64::MIN }
        );

        let early = last_at(51.5, -0.12, -1_000);
        assert_eq!(
            filter.evaluate(&Fix::new(51.5, -0.12, i64::MAX, 3.0), Some(&early)),
            FilterDecision::Accept
        );
    }

    #[test]
    fn test_jump_rejected_then_tolerated_when_stale() {
        let filter = PointFilter::default();
        let last = last_at(51.5007, -0.1246, 0);
        // ~27.8m in 500ms = ~55 m/s
        let jump = Fix::new(51.5007, -0.1250, 500, 3.0);
        assert!(!filter.should_accept(&jump, Some(&last)));

        // Same displacement after 15s is ~1.9 m/s
        let later = Fix::new(51.5007, -0.1250, 15_000, 3.0);
        assert!(filter.should_accept(&later, Some(&last)));
    }

    #[test]
    fn test_fast_but_stale_is_tolerated() {
        let filter = PointFilter::default();
        let last = last_at(51.5000, -0.1246, 0);
        // ~1.1km in 11s is far above walking speed, but the gap is stale
        let fix = Fix::new(51.5100, -0.1246, 11_000, 3.0);
        assert_eq!(filter.evaluate(&fix, Some(&last)), FilterDecision::Accept);
    }

    #[test]
    fn test_walking_pace_accepted() {
        let filter = PointFilter::default();
        let last = last_at(51.5007, -0.1246, 0);
        // ~27.8m in 20s
        let fix = Fix::new(51.5007, -0.1250, 20_000, 3.0);
        assert!(filter.should_accept(&fix, Some(&last)));
    }

    #[test]
    fn test_idempotent() {
        let filter = PointFilter::default();
        let last = last_at(51.5007, -0.1246, 0);
        let fix = Fix::new(51.5007, -0.1250, 500, 3.0);
        let first = filter.evaluate(&fix, Some(&last));
        for _ in 0..5 {
            assert_eq!(filter.evaluate(&fix, Some(&last)), first);
        }
    }

    #[test]
    fn test_custom_thresholds() {
        let config = TrackerConfig {
            accuracy_threshold_m: 10.0,
            ..TrackerConfig::default()
        };
        let filter = PointFilter::from_config(&config).with_formula(DistanceFormula::Geodesic);
        assert!(!filter.should_accept(&Fix::new(0.0, 0.0, 0, 12.0), None));
        assert!(filter.should_accept(&Fix::new(0.0, 0.0, 0, 10.0), None));
    }
}
