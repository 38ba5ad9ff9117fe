//! Fix sources.
//!
//! The pipeline does not care where fixes come from. A [`FixSource`] pushes
//! fixes into a [`FixSink`] until stopped; platform GPS providers implement
//! it on the host side, and [`ReplaySource`] feeds a recorded track.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};

use crate::error::{Result, TrackerError};
use crate::session::TrackingMode;
use crate::Fix;

/// Destination for fixes. Returns `false` once the receiver is gone.
#[derive(Clone)]
pub struct FixSink {
    send: Arc<dyn Fn(Fix) -> bool + Send + Sync>,
}

impl FixSink {
    pub fn new<F>(send: F) -> Self
    where
        F: Fn(Fix) -> bool + Send + Sync + 'static,
    {
        Self {
            send: Arc::new(send),
        }
    }

    pub fn send(&self, fix: Fix) -> bool {
        (self.send)(fix)
    }
}

impl fmt::Debug for FixSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixSink").finish_non_exhaustive()
    }
}

/// A stream of positioning fixes.
pub trait FixSource: Send {
    /// Mode tag recorded on sessions fed by this source.
    fn mode(&self) -> TrackingMode;

    /// Begin delivering fixes to `sink`. Restarting an already running
    /// source replaces its sink.
    fn start(&mut self, sink: FixSink) -> Result<()>;

    fn stop(&mut self);

    /// Requested delivery interval. Sources may treat it as a hint.
    fn set_update_interval(&mut self, interval_ms: u64);
}

/// Replays a recorded list of fixes on a background thread.
pub struct ReplaySource {
    fixes: Arc<Vec<Fix>>,
    mode: TrackingMode,
    interval_ms: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
    thread: Option<JoinHandle<usize>>,
}

impl ReplaySource {
    pub fn new(fixes: Vec<Fix>, interval_ms: u64) -> Self {
        Self {
            fixes: Arc::new(fixes),
            mode: TrackingMode::GpsOnly,
            interval_ms: Arc::new(AtomicU64::new(interval_ms)),
            stopped: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Tag sessions fed by this replay with `mode` instead of GPS-only.
    pub fn with_mode(mut self, mode: TrackingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Block until the replay finishes or is stopped. Returns the number of
    /// fixes delivered, or 0 if the source was never started.
    pub fn wait(&mut self) -> usize {
        self.thread
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(0)
    }

    fn halt(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl FixSource for ReplaySource {
    fn mode(&self) -> TrackingMode {
        self.mode.clone()
    }

    fn start(&mut self, sink: FixSink) -> Result<()> {
        self.halt();
        self.stopped = Arc::new(AtomicBool::new(false));

        let fixes = Arc::clone(&self.fixes);
        let interval_ms = Arc::clone(&self.interval_ms);
        let stopped = Arc::clone(&self.stopped);

        info!("[Replay] Replaying {} fixes", fixes.len());
        let handle = thread::Builder::new()
            .name("stride-replay".to_string())
            .spawn(move || {
                let mut delivered = 0;
                for fix in fixes.iter() {
                    if stopped.load(Ordering::SeqCst) || !sink.send(*fix) {
                        break;
                    }
                    delivered += 1;
                    let wait = interval_ms.load(Ordering::SeqCst);
                    if wait > 0 {
                        thread::sleep(Duration::from_millis(wait));
                    }
                }
                debug!("[Replay] Delivered {} fixes", delivered);
                delivered
            })
            .map_err(|e| TrackerError::Internal {
                message: format!("failed to spawn replay thread: {}", e),
            })?;

        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.halt();
    }

    fn set_update_interval(&mut self, interval_ms: u64) {
        self.interval_ms.store(interval_ms, Ordering::SeqCst);
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.halt();
    }
}
