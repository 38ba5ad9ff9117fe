//! Session record and lifecycle states.

use serde::{Deserialize, Serialize};

use crate::geo_utils::DistanceFormula;

/// Fix source a session was recorded with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TrackingMode {
    GpsOnly,
    /// Tag written by a source this build does not know about
    Other { tag: String },
}

impl TrackingMode {
    /// Tag used when the mode is persisted.
    pub fn as_tag(&self) -> &str {
        match self {
            TrackingMode::GpsOnly => "GPS_ONLY",
            TrackingMode::Other { tag } => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "GPS_ONLY" => TrackingMode::GpsOnly,
            other => TrackingMode::Other {
                tag: other.to_string(),
            },
        }
    }
}

/// Lifecycle state of the tracking engine.
///
/// `Stopped` is terminal for a session; the next start creates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TrackerState {
    Idle,
    Active,
    Paused,
    Stopped,
}

impl TrackerState {
    /// True while a session is open (Active or Paused).
    pub fn is_tracking(&self) -> bool {
        matches!(self, TrackerState::Active | TrackerState::Paused)
    }
}

/// One tracked activity from start to stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Session {
    pub session_id: String,
    /// Wall-clock start, Unix milliseconds
    pub start_time: i64,
    /// Wall-clock end, Unix milliseconds. `None` while the session is open.
    pub end_time: Option<i64>,
    /// Accumulated distance in meters (never decreases)
    pub total_distance: f64,
    pub mode: TrackingMode,
    /// 0-100
    pub confidence_score: u8,
    pub is_paused: bool,
    /// Active time excluding pauses
    pub elapsed_time_seconds: u64,
    /// Wall-clock time of the most recent pause, Unix milliseconds
    pub last_pause_time: Option<i64>,
    /// Formula used for every distance computed in this session
    pub distance_formula: DistanceFormula,
}

impl Session {
    /// A fresh open session with zeroed aggregates.
    pub fn new(
        session_id: String,
        start_time: i64,
        mode: TrackingMode,
        distance_formula: DistanceFormula,
    ) -> Self {
        Self {
            session_id,
            start_time,
            end_time: None,
            total_distance: 0.0,
            mode,
            confidence_score: 0,
            is_paused: false,
            elapsed_time_seconds: 0,
            last_pause_time: None,
            distance_formula,
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// State a recovered session resumes in.
    pub fn resume_state(&self) -> TrackerState {
        match (self.end_time, self.is_paused) {
            (Some(_), _) => TrackerState::Stopped,
            (None, true) => TrackerState::Paused,
            (None, false) => TrackerState::Active,
        }
    }
}
