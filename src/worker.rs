//! Single-writer worker.
//!
//! One thread owns the [`TrackingEngine`]. Fixes and lifecycle commands share
//! one FIFO queue, so every fix submitted before `stop()` is fully processed
//! and persisted before the stop reply is sent, and fixes submitted after it
//! find the session stopped and are dropped.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::engine::{TrackerContext, TrackerSnapshot, TrackingEngine};
use crate::error::{OptionExt, Result, TrackerError};
use crate::session::TrackingMode;
use crate::source::{FixSink, FixSource};
use crate::Fix;

enum Command {
    Fix(Fix),
    SetMode(TrackingMode),
    Start(Sender<Result<TrackerSnapshot>>),
    Pause(Sender<Result<TrackerSnapshot>>),
    Resume(Sender<Result<TrackerSnapshot>>),
    Stop(Sender<Result<TrackerSnapshot>>),
    Flush(Sender<Result<()>>),
    Snapshot(Sender<TrackerSnapshot>),
    Shutdown,
}

/// Thread-safe handle to a tracking engine running on its own thread.
pub struct TrackerHandle {
    tx: Sender<Command>,
    thread: Option<JoinHandle<()>>,
    source: Mutex<Option<Box<dyn FixSource>>>,
    sampling_interval_ms: u64,
}

impl TrackerHandle {
    /// Build the engine, recover any open session, and start the worker.
    ///
    /// Configuration and recovery errors are returned here rather than on
    /// the worker thread.
    pub fn spawn(ctx: TrackerContext) -> Result<Self> {
        let sampling_interval_ms = ctx.config.sampling_interval_ms;
        let engine = TrackingEngine::open(ctx)?;
        let (tx, rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("stride-tracker".to_string())
            .spawn(move || run(engine, rx))
            .map_err(|e| TrackerError::Internal {
                message: format!("failed to spawn tracker thread: {}", e),
            })?;

        Ok(Self {
            tx,
            thread: Some(thread),
            source: Mutex::new(None),
            sampling_interval_ms,
        })
    }

    /// A sink that feeds the worker queue, for hosts that push fixes.
    pub fn sink(&self) -> FixSink {
        let tx = self.tx.clone();
        FixSink::new(move |fix| tx.send(Command::Fix(fix)).is_ok())
    }

    /// Queue one fix for processing.
    pub fn submit_fix(&self, fix: Fix) -> Result<()> {
        self.tx
            .send(Command::Fix(fix))
            .map_err(|_| TrackerError::WorkerGone)
    }

    /// Install the fix source driven by start/stop. Sessions started from now
    /// on carry the source's mode tag. Starts it right away if a recovered
    /// session is already open.
    pub fn attach_source(&self, mut source: Box<dyn FixSource>) -> Result<()> {
        self.tx
            .send(Command::SetMode(source.mode()))
            .map_err(|_| TrackerError::WorkerGone)?;
        source.set_update_interval(self.sampling_interval_ms);
        if self.snapshot()?.state.is_tracking() {
            source.start(self.sink())?;
        }
        let mut slot = self.source_slot()?;
        if let Some(mut previous) = slot.replace(source) {
            previous.stop();
        }
        Ok(())
    }

    pub fn set_update_interval(&self, interval_ms: u64) -> Result<()> {
        if let Some(source) = self.source_slot()?.as_mut() {
            source.set_update_interval(interval_ms);
        }
        Ok(())
    }

    pub fn start(&self) -> Result<TrackerSnapshot> {
        let snapshot = self.request(Command::Start)??;
        let sink = self.sink();
        if let Some(source) = self.source_slot()?.as_mut() {
            source.start(sink)?;
        }
        Ok(snapshot)
    }

    pub fn pause(&self) -> Result<TrackerSnapshot> {
        self.request(Command::Pause)?
    }

    pub fn resume(&self) -> Result<TrackerSnapshot> {
        self.request(Command::Resume)?
    }

    /// Stop the source, drain queued fixes, and finalize the session.
    pub fn stop(&self) -> Result<TrackerSnapshot> {
        if let Some(source) = self.source_slot()?.as_mut() {
            source.stop();
        }
        self.request(Command::Stop)?
    }

    /// Retry any writes held after a persistence failure.
    pub fn flush(&self) -> Result<()> {
        self.request(Command::Flush)?
    }

    /// Current state after all previously queued fixes are processed.
    pub fn snapshot(&self) -> Result<TrackerSnapshot> {
        self.request(Command::Snapshot)
    }

    /// Stop the source and the worker, waiting for queued work to finish.
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        if let Ok(mut slot) = self.source.lock() {
            if let Some(source) = slot.as_mut() {
                source.stop();
            }
        }
        let handle = self.thread.take().ok_or_internal("tracker worker already shut down")?;
        // The worker may already have exited if its queue was dropped
        let _ = self.tx.send(Command::Shutdown);
        handle.join().map_err(|_| TrackerError::Internal {
            message: "tracker worker panicked".to_string(),
        })
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(make(reply_tx))
            .map_err(|_| TrackerError::WorkerGone)?;
        reply_rx.recv().map_err(|_| TrackerError::WorkerGone)
    }

    fn source_slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Box<dyn FixSource>>>> {
        self.source.lock().map_err(|_| TrackerError::Internal {
            message: "fix source lock poisoned".to_string(),
        })
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.close() {
                warn!("[Tracker] Worker shutdown failed: {}", e);
            }
        }
    }
}

fn run(mut engine: TrackingEngine, rx: Receiver<Command>) {
    debug!("[Tracker] Worker started in {:?}", engine.state());

    for command in rx {
        match command {
            Command::Fix(fix) => {
                if let Err(e) = engine.process_fix(fix) {
                    warn!("[Tracker] Dropping invalid fix: {}", e);
                }
            }
            Command::SetMode(mode) => {
                debug!("[Tracker] Mode for new sessions: {}", mode.as_tag());
                engine.set_mode(mode);
            }
            Command::Start(reply) => {
                let _ = reply.send(engine.start());
            }
            Command::Pause(reply) => {
                let _ = reply.send(engine.pause());
            }
            Command::Resume(reply) => {
                let _ = reply.send(engine.resume());
            }
            Command::Stop(reply) => {
                let _ = reply.send(engine.stop());
            }
            Command::Flush(reply) => {
                let _ = reply.send(engine.flush());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(engine.snapshot());
            }
            Command::Shutdown => break,
        }
    }

    if engine.has_pending_writes() {
        if let Err(e) = engine.flush() {
            warn!("[Tracker] Exiting with unwritten state: {}", e);
        }
    }
    info!("[Tracker] Worker stopped in {:?}", engine.state());
}
