//! # Stride Core
//!
//! Real-time track processing for a walking tracker.
//!
//! This library turns a live, noisy stream of positioning fixes into:
//! - A clean path of smoothed track points
//! - An accumulated walking distance
//! - A 0-100 confidence score derived from reported accuracy
//! - A persisted session record that survives pause/resume and restarts
//!
//! ## Pipeline
//!
//! raw fix -> [`PointFilter`] -> [`PointSmoother`] -> distance ->
//! confidence -> [`TrackingEngine`] (persist point, update aggregates)
//!
//! ## Features
//!
//! - **`persistence`** (default) - SQLite session and point stores
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use stride_core::{Fix, MemoryStore, TrackerConfig, TrackerContext, TrackingEngine};
//!
//! let store = MemoryStore::shared();
//! let ctx = TrackerContext::new(TrackerConfig::default(), store.clone(), store);
//! let mut engine = TrackingEngine::new(ctx).unwrap();
//!
//! engine.start().unwrap();
//! engine.process_fix(Fix::new(51.5007, -0.1246, 1_000, 3.0)).unwrap();
//! engine.process_fix(Fix::new(51.5007, -0.1250, 12_000, 3.0)).unwrap();
//!
//! let snapshot = engine.snapshot();
//! assert!(snapshot.total_distance_m > 10.0);
//! assert_eq!(snapshot.confidence, 100);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackerError};

// Geographic utilities (distance, bearing, turn angle)
pub mod geo_utils;
pub use geo_utils::DistanceFormula;

// Caller-supplied configuration
pub mod config;
pub use config::TrackerConfig;

// Fixed-capacity window of recent points
pub mod ring_buffer;
pub use ring_buffer::RingBuffer;

// Accept/reject policy for incoming fixes
pub mod filter;
pub use filter::{FilterDecision, PointFilter};

// Moving-average correction of accepted fixes
pub mod smoother;
pub use smoother::PointSmoother;

// Accuracy-derived quality score
pub mod confidence;
pub use confidence::{point_confidence, session_confidence};

// Session record and lifecycle states
pub mod session;
pub use session::{Session, TrackerState, TrackingMode};

// Storage contracts and the in-memory implementation
pub mod store;
pub use store::{MemoryStore, PointStore, SessionStore};

// SQLite-backed stores
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteStore;

// Session state machine and dependency context
pub mod engine;
pub use engine::{
    Clock, ManualClock, SystemClock, TrackerContext, TrackerSnapshot, TrackingEngine,
};

// Fix sources (GPS-only today)
pub mod source;
pub use source::{FixSink, FixSource, ReplaySource};

// Single-writer worker thread
pub mod worker;
pub use worker::TrackerHandle;

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("StrideCore"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use stride_core::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }
}

/// A single raw positioning reading from a fix source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    /// Monotonic milliseconds
    pub timestamp: i64,
    /// Horizontal accuracy in meters (lower is better)
    pub accuracy: f64,
    /// Instantaneous speed in m/s, if the provider reports one
    pub speed: Option<f64>,
}

impl Fix {
    /// Create a fix without a speed reading.
    pub fn new(latitude: f64, longitude: f64, timestamp: i64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy,
            speed: None,
        }
    }

    /// Attach an instantaneous speed reading.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    /// Check the fix against the ingestion contract.
    ///
    /// Out-of-range coordinates or impossible accuracy/speed values indicate
    /// an upstream integration bug and are rejected rather than clamped.
    pub fn validate(&self) -> Result<()> {
        if !self.position().is_valid() {
            return Err(TrackerError::InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(TrackerError::InvalidFix {
                message: format!("accuracy must be a non-negative number, got {}", self.accuracy),
            });
        }
        if let Some(speed) = self.speed {
            if !speed.is_finite() || speed < 0.0 {
                return Err(TrackerError::InvalidFix {
                    message: format!("speed must be a non-negative number, got {}", speed),
                });
            }
        }
        Ok(())
    }
}

/// A fix that passed filtering and smoothing, attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackPoint {
    pub session_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Monotonic milliseconds
    pub timestamp: i64,
    /// Horizontal accuracy in meters
    pub accuracy: f64,
    /// Instantaneous speed in m/s
    pub speed: Option<f64>,
}

impl TrackPoint {
    /// Attach a fix to a session.
    pub fn from_fix(session_id: &str, fix: &Fix) -> Self {
        Self {
            session_id: session_id.to_string(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            timestamp: fix.timestamp,
            accuracy: fix.accuracy,
            speed: fix.speed,
        }
    }

    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

// ============================================================================
// Tests
// ============================================================================
