//! Storage contracts for sessions and track points.
//!
//! The engine only talks to storage through these two traits. Persistence
//! mechanics (SQLite, platform databases, remote sync) are collaborator
//! concerns; [`MemoryStore`] is the in-process implementation used in tests
//! and by hosts that persist elsewhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, TrackerError};
use crate::session::Session;
use crate::TrackPoint;

/// Session records keyed by session identifier.
pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &str) -> Result<Option<Session>>;

    /// The session with no end time, if any. At most one exists.
    fn get_active(&self) -> Result<Option<Session>>;

    /// Insert or replace. Safe to call repeatedly with improving aggregates.
    fn upsert(&self, session: &Session) -> Result<()>;

    /// All sessions, newest start first.
    fn all(&self) -> Result<Vec<Session>>;

    fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// Append-only track point storage.
pub trait PointStore: Send + Sync {
    fn append_one(&self, point: &TrackPoint) -> Result<()>;

    fn append_many(&self, points: &[TrackPoint]) -> Result<()> {
        for point in points {
            self.append_one(point)?;
        }
        Ok(())
    }

    /// A session's points, timestamp ascending, insertion order kept for ties.
    fn stream_for_session(&self, session_id: &str) -> Result<Vec<TrackPoint>>;

    fn count_for_session(&self, session_id: &str) -> Result<usize>;

    fn delete_for_session(&self, session_id: &str) -> Result<()>;
}

/// Remove a session and all of its points.
pub fn delete_session_data(
    sessions: &dyn SessionStore,
    points: &dyn PointStore,
    session_id: &str,
) -> Result<()> {
    sessions.delete_session(session_id)?;
    points.delete_for_session(session_id)?;
    log::info!("[Store] Deleted session {} and its points", session_id);
    Ok(())
}

// ============================================================================
// In-memory store
// ============================================================================

/// Thread-safe in-memory implementation of both store traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, Session>>,
    points: Mutex<HashMap<String, Vec<TrackPoint>>>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| TrackerError::Internal {
        message: format!("{} lock poisoned", what),
    })
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for handing the same store to both context slots.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(lock(&self.sessions, "sessions")?.get(session_id).cloned())
    }

    fn get_active(&self) -> Result<Option<Session>> {
        let sessions = lock(&self.sessions, "sessions")?;
        let mut open: Vec<&Session> = sessions.values().filter(|s| s.is_active()).collect();
        if open.len() > 1 {
            log::warn!(
                "[Store] {} open sessions found, using the most recent",
                open.len()
            );
        }
        open.sort_by_key(|s| std::cmp::Reverse(s.start_time));
        Ok(open.first().map(|s| (*s).clone()))
    }

    fn upsert(&self, session: &Session) -> Result<()> {
        lock(&self.sessions, "sessions")?.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn all(&self) -> Result<Vec<Session>> {
        let mut all: Vec<Session> = lock(&self.sessions, "sessions")?.values().cloned().collect();
        all.sort_by_key(|s| std::cmp::Reverse(s.start_time));
        Ok(all)
    }

    fn delete_session(&self, session_id: &str) -> Result<()> {
        lock(&self.sessions, "sessions")?.remove(session_id);
        Ok(())
    }
}

impl PointStore for MemoryStore {
    fn append_one(&self, point: &TrackPoint) -> Result<()> {
        lock(&self.points, "points")?
            .entry(point.session_id.clone())
            .or_default()
            .push(point.clone());
        Ok(())
    }

    fn stream_for_session(&self, session_id: &str) -> Result<Vec<TrackPoint>> {
        let mut points = lock(&self.points, "points")?
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        // Stable sort keeps insertion order among equal timestamps
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    fn count_for_session(&self, session_id: &str) -> Result<usize> {
        Ok(lock(&self.points, "points")?
            .get(session_id)
            .map(|v| v.len())
            .unwrap_or(0))
    }

    fn delete_for_session(&self, session_id: &str) -> Result<()> {
        lock(&self.points, "points")?.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::DistanceFormula;
    use crate::session::TrackingMode;
    use crate::Fix;

    fn session(id: &str, start: i64) -> Session {
        Session::new(
            id.to_string(),
            start,
            TrackingMode::GpsOnly,
            DistanceFormula::Haversine,
        )
    }

    #[test]
    fn test_upsert_and_get() {
        let store = MemoryStore::new();
        let mut s = session("a", 1);
        store.upsert(&s).unwrap();

        s.total_distance = 42.0;
        store.upsert(&s).unwrap();

        assert_eq!(store.get("a").unwrap().unwrap().total_distance, 42.0);
        assert!(store.get("missing").unwrap().is_none());
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_get_active_ignores_finished() {
        let store = MemoryStore::new();
        let mut done = session("done", 1);
        done.end_time = Some(5);
        store.upsert(&done).unwrap();
        assert!(store.get_active().unwrap().is_none());

        store.upsert(&session("open", 10)).unwrap();
        assert_eq!(store.get_active().unwrap().unwrap().session_id, "open");
    }

    #[test]
    fn test_all_newest_first() {
        let store = MemoryStore::new();
        store.upsert(&session("old", 1)).unwrap();
        store.upsert(&session("new", 100)).unwrap();
        let ids: Vec<String> = store.all().unwrap().into_iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_points_ordered_and_scoped() {
        let store = MemoryStore::new();
        store
            .append_many(&[
                TrackPoint::from_fix("a", &Fix::new(1.0, 1.0, 20, 3.0)),
                TrackPoint::from_fix("a", &Fix::new(2.0, 2.0, 10, 3.0)),
                TrackPoint::from_fix("b", &Fix::new(3.0, 3.0, 5, 3.0)),
            ])
            .unwrap();

        let a = store.stream_for_session("a").unwrap();
        assert_eq!(a.iter().map(|p| p.timestamp).collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(store.count_for_session("b").unwrap(), 1);
        assert!(store.stream_for_session("none").unwrap().is_empty());
    }

    #[test]
    fn test_delete_session_data() {
        let store = MemoryStore::new();
        store.upsert(&session("a", 1)).unwrap();
        store
            .append_one(&TrackPoint::from_fix("a", &Fix::new(1.0, 1.0, 1, 3.0)))
            .unwrap();

        delete_session_data(&store, &store, "a").unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert_eq!(store.count_for_session("a").unwrap(), 0);
    }
}
