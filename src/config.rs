//! Caller-supplied tracking configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::geo_utils::DistanceFormula;

/// Configuration for the tracking pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct TrackerConfig {
    /// Fixes with a reported accuracy worse than this are dropped.
    /// Default: 25.0 meters
    pub accuracy_threshold_m: f64,

    /// Implied speed above this over a short interval is treated as a GPS jump.
    /// Default: 6.0 m/s (~21 km/h)
    pub max_walking_speed_mps: f64,

    /// A jump is tolerated once at least this much time has passed since the
    /// last accepted point. Default: 10000 ms
    pub staleness_threshold_ms: i64,

    /// Number of points averaged by the smoother, including the new one.
    /// Default: 3
    pub smoothing_window: u32,

    /// Interval requested from the fix source. Default: 1000 ms
    pub sampling_interval_ms: u64,

    /// Formula used for distance accumulation in new sessions.
    /// Default: haversine
    pub distance_formula: DistanceFormula,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_m: 25.0,
            max_walking_speed_mps: 6.0,
            staleness_threshold_ms: 10_000,
            smoothing_window: 3,
            sampling_interval_ms: 1_000,
            distance_formula: DistanceFormula::Haversine,
        }
    }
}

impl TrackerConfig {
    /// Parse a (possibly partial) JSON document. Missing keys take defaults.
    ///
    /// # Example
    /// ```
    /// use stride_core::TrackerConfig;
    ///
    /// let config = TrackerConfig::from_json(r#"{"smoothing_window": 5}"#).unwrap();
    /// assert_eq!(config.smoothing_window, 5);
    /// assert_eq!(config.accuracy_threshold_m, 25.0);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.accuracy_threshold_m.is_finite() || self.accuracy_threshold_m < 0.0 {
            return Err(TrackerError::config(format!(
                "accuracy_threshold_m must be a non-negative number, got {}",
                self.accuracy_threshold_m
            )));
        }
        if !self.max_walking_speed_mps.is_finite() || self.max_walking_speed_mps <= 0.0 {
            return Err(TrackerError::config(format!(
                "max_walking_speed_mps must be positive, got {}",
                self.max_walking_speed_mps
            )));
        }
        if self.staleness_threshold_ms < 0 {
            return Err(TrackerError::config(format!(
                "staleness_threshold_ms must be non-negative, got {}",
                self.staleness_threshold_ms
            )));
        }
        if self.smoothing_window == 0 {
            return Err(TrackerError::config("smoothing_window must be at least 1"));
        }
        if self.sampling_interval_ms == 0 {
            return Err(TrackerError::config("sampling_interval_ms must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.accuracy_threshold_m, 25.0);
        assert_eq!(config.max_walking_speed_mps, 6.0);
        assert_eq!(config.staleness_threshold_ms, 10_000);
        assert_eq!(config.smoothing_window, 3);
        assert_eq!(config.sampling_interval_ms, 1_000);
        assert_eq!(config.distance_formula, DistanceFormula::Haversine);
    }

    #[test]
    fn test_partial_json() {
        let config =
            TrackerConfig::from_json(r#"{"max_walking_speed_mps": 4.5, "distance_formula": "geodesic"}"#)
                .unwrap();
        assert_eq!(config.max_walking_speed_mps, 4.5);
        assert_eq!(config.distance_formula, DistanceFormula::Geodesic);
        assert_eq!(config.smoothing_window, 3);
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let result = TrackerConfig::from_json(r#"{"accuracy_threshold_m": -1.0}"#);
        assert!(matches!(result, Err(TrackerError::ConfigError { .. })));
    }

    #[test]
    fn test_rejects_zero_window_and_interval() {
        let config = TrackerConfig {
            smoothing_window: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            sampling_interval_ms: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            TrackerConfig::from_json("{not json"),
            Err(TrackerError::ConfigError { .. })
        ));
    }
}
