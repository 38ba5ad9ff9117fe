//! # Tracking Engine
//!
//! Session state machine and fix-processing pipeline.
//!
//! ## States
//!
//! ```text
//! Idle --start--> Active --pause--> Paused --resume--> Active
//! Active|Paused --stop--> Stopped (terminal; next start creates a new session)
//! ```
//!
//! Every accepted fix runs filter -> smoother -> distance -> confidence and
//! is persisted together with the updated session aggregates. Fixes that
//! arrive while paused are discarded without being filtered or stored.
//!
//! ## Elapsed time
//!
//! The engine is the authority for `elapsed_time_seconds`. It reads the
//! injected [`Clock`] and accumulates only the stretches spent Active. The
//! value is persisted on pause, stop and with every aggregate update.
//!
//! ## Persistence failures
//!
//! Writes that fail are held in memory (unwritten points in order, session
//! marked dirty) and retried before anything newer is written. `start()`
//! fails and stays Idle if the new session cannot be persisted; `stop()`
//! stays in its current state if the final flush fails so it can be retried.
//!
//! ## Recovery
//!
//! [`TrackingEngine::recover`] rebuilds an open session from storage after a
//! restart: aggregates from the session record, the smoothing window and the
//! filter's reference point from the stored path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::confidence::session_confidence;
use crate::error::Result;
use crate::filter::{FilterDecision, PointFilter};
use crate::geo_utils::polyline_length;
use crate::session::{Session, TrackerState, TrackingMode};
use crate::smoother::PointSmoother;
use crate::store::{PointStore, SessionStore};
use crate::{Fix, GpsPoint, TrackPoint};

/// Recovered distance below the stored path length by more than this means
/// the last aggregate write was lost.
const RECOVERY_DISTANCE_TOLERANCE_M: f64 = 0.5;

// ============================================================================
// Clock
// ============================================================================

/// Source of "now" in Unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for tests and log replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Context
// ============================================================================

/// Everything the engine depends on, constructed once at startup.
#[derive(Clone)]
pub struct TrackerContext {
    pub config: TrackerConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub points: Arc<dyn PointStore>,
    pub clock: Arc<dyn Clock>,
    /// Mode tag recorded on new sessions
    pub mode: TrackingMode,
}

impl TrackerContext {
    /// Context with the system clock and GPS-only mode.
    pub fn new(
        config: TrackerConfig,
        sessions: Arc<dyn SessionStore>,
        points: Arc<dyn PointStore>,
    ) -> Self {
        Self {
            config,
            sessions,
            points,
            clock: Arc::new(SystemClock),
            mode: TrackingMode::GpsOnly,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_mode(mut self, mode: TrackingMode) -> Self {
        self.mode = mode;
        self
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time view of the engine for UI and notification collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackerSnapshot {
    pub state: TrackerState,
    pub session_id: Option<String>,
    pub total_distance_m: f64,
    pub confidence: u8,
    pub elapsed_seconds: u64,
    /// Accepted points in the current session
    pub point_count: u64,
    pub last_point: Option<TrackPoint>,
    /// Points accepted in memory but not yet written
    pub pending_writes: u32,
}

impl TrackerSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Single-owner session state machine.
///
/// All methods take `&mut self`; callers that need concurrent access go
/// through [`TrackerHandle`](crate::TrackerHandle), which owns the engine on
/// one worker thread.
pub struct TrackingEngine {
    ctx: TrackerContext,
    state: TrackerState,
    session: Option<Session>,
    filter: PointFilter,
    smoother: PointSmoother,

    /// Active time accumulated before the current stretch
    elapsed_ms: u64,
    /// Clock reading when the current Active stretch began
    active_since: Option<i64>,
    point_count: u64,

    // Write-behind state
    pending_points: VecDeque<TrackPoint>,
    session_dirty: bool,
}

impl TrackingEngine {
    /// Create an idle engine. Fails if the configuration is invalid.
    pub fn new(ctx: TrackerContext) -> Result<Self> {
        ctx.config.validate()?;
        let filter = PointFilter::from_config(&ctx.config);
        let smoother = PointSmoother::new(ctx.config.smoothing_window as usize);

        Ok(Self {
            ctx,
            state: TrackerState::Idle,
            session: None,
            filter,
            smoother,
            elapsed_ms: 0,
            active_since: None,
            point_count: 0,
            pending_points: VecDeque::new(),
            session_dirty: false,
        })
    }

    /// Create an engine and resume any open session found in storage.
    pub fn open(ctx: TrackerContext) -> Result<Self> {
        let mut engine = Self::new(ctx)?;
        engine.recover()?;
        Ok(engine)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.ctx.config
    }

    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.smoother.last()
    }

    /// Mode tag for sessions started from now on. An open session keeps its own.
    pub fn set_mode(&mut self, mode: TrackingMode) {
        self.ctx.mode = mode;
    }

    /// Stored path of the current session, for rendering.
    pub fn path(&self) -> Result<Vec<TrackPoint>> {
        match &self.session {
            Some(session) => self.ctx.points.stream_for_session(&session.session_id),
            None => Ok(Vec::new()),
        }
    }

    /// Active time so far, including the running stretch.
    pub fn elapsed_seconds(&self) -> u64 {
        self.current_elapsed_ms() / 1000
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            state: self.state,
            session_id: self.session.as_ref().map(|s| s.session_id.clone()),
            total_distance_m: self.session.as_ref().map_or(0.0, |s| s.total_distance),
            confidence: self.session.as_ref().map_or(100, |s| s.confidence_score),
            elapsed_seconds: self.elapsed_seconds(),
            point_count: self.point_count,
            last_point: self.smoother.last().cloned(),
            pending_writes: self.pending_points.len() as u32,
        }
    }

    fn now(&self) -> i64 {
        self.ctx.clock.now_millis()
    }

    fn current_elapsed_ms(&self) -> u64 {
        let running = self
            .active_since
            .map(|since| (self.now() - since).max(0) as u64)
            .unwrap_or(0);
        self.elapsed_ms + running
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Begin a new session. No-op while a session is already open.
    pub fn start(&mut self) -> Result<TrackerSnapshot> {
        if self.state.is_tracking() {
            debug!("[Tracker] start ignored: already {:?}", self.state);
            return Ok(self.snapshot());
        }

        // Never open a second session while an unrecovered one exists
        if self.ctx.sessions.get_active()?.is_some() {
            info!("[Tracker] start found an open session in storage, recovering it");
            self.recover()?;
            return Ok(self.snapshot());
        }

        let now = self.now();
        let session = Session::new(
            uuid::Uuid::new_v4().to_string(),
            now,
            self.ctx.mode.clone(),
            self.ctx.config.distance_formula,
        );
        self.ctx.sessions.upsert(&session)?;

        info!(
            "[Tracker] Started session {} ({}, {})",
            session.session_id,
            session.mode.as_tag(),
            session.distance_formula.as_str()
        );

        self.filter = PointFilter::from_config(&self.ctx.config).with_formula(session.distance_formula);
        self.smoother.clear();
        self.elapsed_ms = 0;
        self.active_since = Some(now);
        self.point_count = 0;
        self.pending_points.clear();
        self.session_dirty = false;
        self.session = Some(session);
        self.state = TrackerState::Active;

        Ok(self.snapshot())
    }

    /// Freeze elapsed time and stop accepting fixes. No-op unless Active.
    ///
    /// The transition holds even if the write fails; the error is returned
    /// and the write retried on the next flush.
    pub fn pause(&mut self) -> Result<TrackerSnapshot> {
        if self.state != TrackerState::Active {
            debug!("[Tracker] pause ignored in {:?}", self.state);
            return Ok(self.snapshot());
        }

        self.elapsed_ms = self.current_elapsed_ms();
        self.active_since = None;
        let now = self.now();
        let elapsed_seconds = self.elapsed_ms / 1000;

        if let Some(session) = self.session.as_mut() {
            session.is_paused = true;
            session.last_pause_time = Some(now);
            session.elapsed_time_seconds = elapsed_seconds;
            info!(
                "[Tracker] Paused session {} at {}s",
                session.session_id, elapsed_seconds
            );
        }
        self.state = TrackerState::Paused;
        self.session_dirty = true;

        self.flush()?;
        Ok(self.snapshot())
    }

    /// Continue counting from the frozen elapsed time. No-op unless Paused.
    pub fn resume(&mut self) -> Result<TrackerSnapshot> {
        if self.state != TrackerState::Paused {
            debug!("[Tracker] resume ignored in {:?}", self.state);
            return Ok(self.snapshot());
        }

        self.active_since = Some(self.now());
        if let Some(session) = self.session.as_mut() {
            session.is_paused = false;
            session.last_pause_time = None;
            info!(
                "[Tracker] Resumed session {} from {}s",
                session.session_id, session.elapsed_time_seconds
            );
        }
        self.state = TrackerState::Active;
        self.session_dirty = true;

        self.flush()?;
        Ok(self.snapshot())
    }

    /// Finalize the session. No-op unless Active or Paused.
    ///
    /// Unwritten points and the final aggregate are flushed before the
    /// engine reports Stopped. On failure the engine keeps its current state.
    pub fn stop(&mut self) -> Result<TrackerSnapshot> {
        if !self.state.is_tracking() {
            debug!("[Tracker] stop ignored in {:?}", self.state);
            return Ok(self.snapshot());
        }

        let elapsed_ms = self.current_elapsed_ms();
        let Some(mut finished) = self.session.clone() else {
            self.state = TrackerState::Idle;
            return Ok(self.snapshot());
        };
        finished.end_time = Some(self.now());
        finished.elapsed_time_seconds = elapsed_ms / 1000;
        finished.is_paused = false;
        finished.last_pause_time = None;

        self.flush_points()?;
        self.ctx.sessions.upsert(&finished)?;

        info!(
            "[Tracker] Stopped session {}: {:.1}m in {}s, confidence {}",
            finished.session_id,
            finished.total_distance,
            finished.elapsed_time_seconds,
            finished.confidence_score
        );

        self.elapsed_ms = elapsed_ms;
        self.active_since = None;
        self.session_dirty = false;
        self.session = Some(finished);
        self.smoother.clear();
        self.state = TrackerState::Stopped;

        Ok(self.snapshot())
    }

    // ========================================================================
    // Fix processing
    // ========================================================================

    /// Run one fix through the pipeline.
    ///
    /// Returns `Ok(true)` if the fix became a track point. Filter rejections
    /// and fixes arriving outside Active return `Ok(false)`. Only contract
    /// violations (invalid coordinates, accuracy or speed) are errors, and
    /// they leave all aggregates untouched.
    pub fn process_fix(&mut self, fix: Fix) -> Result<bool> {
        fix.validate()?;

        match self.state {
            TrackerState::Active => {}
            TrackerState::Paused => {
                debug!("[Tracker] Discarding fix at {} while paused", fix.timestamp);
                return Ok(false);
            }
            TrackerState::Idle | TrackerState::Stopped => {
                debug!("[Tracker] Ignoring fix at {} with no open session", fix.timestamp);
                return Ok(false);
            }
        }

        let decision = self.filter.evaluate(&fix, self.smoother.last());
        if !decision.is_accept() {
            log_rejection(&fix, &decision);
            return Ok(false);
        }

        let elapsed_seconds = self.elapsed_seconds();
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };

        let smoothed = self.smoother.smooth(&fix);
        let point = TrackPoint::from_fix(&session.session_id, &smoothed);

        if let Some(last) = self.smoother.last() {
            let segment = session
                .distance_formula
                .distance(&last.position(), &point.position());
            session.total_distance += segment;
        }

        self.smoother.push(point.clone());
        session.confidence_score = session_confidence(self.smoother.window().map(|p| p.accuracy));
        session.elapsed_time_seconds = elapsed_seconds;

        debug!(
            "[Tracker] Accepted fix at {}: total {:.1}m, confidence {}",
            point.timestamp, session.total_distance, session.confidence_score
        );

        self.point_count += 1;
        self.pending_points.push_back(point);
        self.session_dirty = true;

        if let Err(e) = self.flush() {
            warn!(
                "[Tracker] Holding {} unwritten points after persistence failure: {}",
                self.pending_points.len(),
                e
            );
        }

        Ok(true)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write held points (in order), then the session if it changed.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_points()?;
        if self.session_dirty {
            if let Some(session) = &self.session {
                self.ctx.sessions.upsert(session)?;
            }
            self.session_dirty = false;
        }
        Ok(())
    }

    fn flush_points(&mut self) -> Result<()> {
        while let Some(point) = self.pending_points.front() {
            self.ctx.points.append_one(point)?;
            self.pending_points.pop_front();
        }
        Ok(())
    }

    /// True if some state has not reached storage yet.
    pub fn has_pending_writes(&self) -> bool {
        self.session_dirty || !self.pending_points.is_empty()
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Rebuild in-memory state from an open session in storage.
    ///
    /// Resumes in Active or Paused according to the stored paused flag. An
    /// open session with no points is a valid cold start. Returns Idle when
    /// nothing is open. No-op if a session is already open in memory.
    pub fn recover(&mut self) -> Result<TrackerState> {
        if self.state.is_tracking() {
            return Ok(self.state);
        }

        let Some(mut session) = self.ctx.sessions.get_active()? else {
            debug!("[Tracker] No open session to recover");
            return Ok(self.state);
        };

        let points = self.ctx.points.stream_for_session(&session.session_id)?;
        let path: Vec<GpsPoint> = points.iter().map(|p| p.position()).collect();
        let path_length = polyline_length(&path, session.distance_formula);

        self.smoother.restore(&points);
        self.filter = PointFilter::from_config(&self.ctx.config).with_formula(session.distance_formula);
        self.point_count = points.len() as u64;
        self.pending_points.clear();
        self.session_dirty = false;

        // Point written but the aggregate update after it was lost
        if path_length > session.total_distance + RECOVERY_DISTANCE_TOLERANCE_M {
            warn!(
                "[Tracker] Session {} stored distance {:.1}m is behind its path {:.1}m, using path",
                session.session_id, session.total_distance, path_length
            );
            session.total_distance = path_length;
            session.confidence_score =
                session_confidence(self.smoother.window().map(|p| p.accuracy));
            self.session_dirty = true;
        }

        self.elapsed_ms = session.elapsed_time_seconds * 1000;
        self.state = session.resume_state();
        self.active_since = match self.state {
            TrackerState::Active => Some(self.now()),
            _ => None,
        };

        info!(
            "[Tracker] Recovered session {} as {:?}: {} points, {:.1}m, {}s",
            session.session_id,
            self.state,
            points.len(),
            session.total_distance,
            session.elapsed_time_seconds
        );

        self.session = Some(session);
        if self.session_dirty {
            self.flush()?;
        }
        Ok(self.state)
    }
}

fn log_rejection(fix: &Fix, decision: &FilterDecision) {
    match decision {
        FilterDecision::RejectAccuracy { accuracy } => {
            debug!("[Tracker] Rejected fix at {}: accuracy {:.1}m", fix.timestamp, accuracy)
        }
        FilterDecision::RejectNonMonotonic { delta_ms } => {
            debug!("[Tracker] Rejected fix at {}: time delta {}ms", fix.timestamp, delta_ms)
        }
        FilterDecision::RejectJump { speed_mps, delta_ms } => debug!(
            "[Tracker] Rejected fix at {}: jump of {:.1} m/s over {}ms",
            fix.timestamp, speed_mps, delta_ms
        ),
        FilterDecision::Accept | FilterDecision::AcceptColdStart => {}
    }
}

// ============================================================================
// Tests
// ============================================================================
