//! FFI bindings for mobile platforms (iOS/Android).
//!
//! The host creates one [`TrackerService`] at startup and keeps it for the
//! life of the process. The service owns the SQLite store and the tracking
//! worker; there is no global state behind it. Platform location providers
//! push fixes through [`TrackerService::submit_fix`].

use std::sync::Arc;

use log::info;

use crate::error::TrackerError;
use crate::geo_utils::{compute_bounds, polyline_length, DistanceFormula};
use crate::store::{delete_session_data, PointStore, SessionStore};
use crate::{
    init_logging, point_confidence, Bounds, Fix, GpsPoint, Session, SqliteStore, TrackPoint,
    TrackerConfig, TrackerContext, TrackerHandle, TrackerSnapshot,
};

/// Tracking service exposed to Kotlin and Swift.
#[derive(uniffi::Object)]
pub struct TrackerService {
    tracker: TrackerHandle,
    store: Arc<SqliteStore>,
}

#[uniffi::export]
impl TrackerService {
    /// Open the database, recover any open session, and start the worker.
    ///
    /// `config_json` may be empty to use the defaults.
    #[uniffi::constructor]
    pub fn new(db_path: String, config_json: String) -> Result<Arc<Self>, TrackerError> {
        init_logging();
        let config = if config_json.trim().is_empty() {
            TrackerConfig::default()
        } else {
            TrackerConfig::from_json(&config_json)?
        };

        let store = SqliteStore::shared(&db_path)?;
        let ctx = TrackerContext::new(config, store.clone(), store.clone());
        let tracker = TrackerHandle::spawn(ctx)?;
        info!("[StrideCore] TrackerService ready on {}", db_path);

        Ok(Arc::new(Self { tracker, store }))
    }

    pub fn start(&self) -> Result<TrackerSnapshot, TrackerError> {
        self.tracker.start()
    }

    pub fn pause(&self) -> Result<TrackerSnapshot, TrackerError> {
        self.tracker.pause()
    }

    pub fn resume(&self) -> Result<TrackerSnapshot, TrackerError> {
        self.tracker.resume()
    }

    pub fn stop(&self) -> Result<TrackerSnapshot, TrackerError> {
        self.tracker.stop()
    }

    pub fn snapshot(&self) -> Result<TrackerSnapshot, TrackerError> {
        self.tracker.snapshot()
    }

    pub fn snapshot_json(&self) -> String {
        self.tracker
            .snapshot()
            .map(|s| s.to_json())
            .unwrap_or_else(|_| "{}".to_string())
    }

    pub fn submit_fix(&self, fix: Fix) -> Result<(), TrackerError> {
        self.tracker.submit_fix(fix)
    }

    pub fn set_update_interval(&self, interval_ms: u64) -> Result<(), TrackerError> {
        self.tracker.set_update_interval(interval_ms)
    }

    /// Retry writes held after a storage failure.
    pub fn flush(&self) -> Result<(), TrackerError> {
        self.tracker.flush()
    }

    /// All sessions, newest first.
    pub fn sessions(&self) -> Result<Vec<Session>, TrackerError> {
        self.store.all()
    }

    pub fn session_path(&self, session_id: String) -> Result<Vec<TrackPoint>, TrackerError> {
        self.store.stream_for_session(&session_id)
    }

    pub fn session_point_count(&self, session_id: String) -> Result<u64, TrackerError> {
        Ok(self.store.count_for_session(&session_id)? as u64)
    }

    pub fn delete_session(&self, session_id: String) -> Result<(), TrackerError> {
        delete_session_data(self.store.as_ref(), self.store.as_ref(), &session_id)
    }
}

/// Distance along a path in meters.
#[uniffi::export]
pub fn ffi_path_length(points: Vec<GpsPoint>, formula: DistanceFormula) -> f64 {
    polyline_length(&points, formula)
}

/// Bounding box of a path for map framing, or `None` when empty.
#[uniffi::export]
pub fn ffi_compute_bounds(points: Vec<GpsPoint>) -> Option<Bounds> {
    compute_bounds(&points)
}

/// Confidence (0-100) for a single accuracy reading.
#[uniffi::export]
pub fn ffi_point_confidence(accuracy: f64) -> u8 {
    point_confidence(accuracy)
}

/// Default configuration as JSON, for hosts that edit and pass it back.
#[uniffi::export]
pub fn ffi_default_config_json() -> String {
    serde_json::to_string(&TrackerConfig::default()).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackerState;
    use tempfile::TempDir;

    #[test]
    fn test_service_lifecycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stride.db").to_string_lossy().to_string();

        let service = TrackerService::new(path, String::new()).unwrap();
        let id = service.start().unwrap().session_id.unwrap();
        service.submit_fix(Fix::new(51.5, -0.12, 0, 3.0)).unwrap();
        assert_eq!(service.stop().unwrap().state, TrackerState::Stopped);

        assert_eq!(service.session_point_count(id.clone()).unwrap(), 1);
        assert_eq!(service.sessions().unwrap().len(), 1);
        service.delete_session(id).unwrap();
        assert!(service.sessions().unwrap().is_empty());
    }

    #[test]
    fn test_bad_config_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stride.db").to_string_lossy().to_string();
        assert!(TrackerService::new(path, "{\"smoothing_window\": 0}".to_string()).is_err());
    }

    #[test]
    fn test_bounds_frame_session_path() {
        assert_eq!(ffi_compute_bounds(Vec::new()), None);

        let path = vec![
            GpsPoint::new(51.5007, -0.1246),
            GpsPoint::new(51.5010, -0.1250),
            GpsPoint::new(51.5004, -0.1240),
        ];
        let bounds = ffi_compute_bounds(path).unwrap();
        assert_eq!(bounds.min_lat, 51.5004);
        assert_eq!(bounds.max_lat, 51.5010);
        assert_eq!(bounds.min_lng, -0.1250);
        assert_eq!(bounds.max_lng, -0.1240);
    }

    #[test]
    fn test_default_config_json_round_trips() {
        let config = TrackerConfig::from_json(&ffi_default_config_json()).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }
}
