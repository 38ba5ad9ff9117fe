//! # SQLite Stores
//!
//! Durable implementation of [`SessionStore`] and [`PointStore`] backed by a
//! single SQLite database. One connection is shared behind a mutex; the
//! tracking worker is the only writer, so writes land in the order they are
//! issued.
//!
//! ## Tables
//!
//! - `sessions`: one row per session, replaced wholesale on every upsert
//! - `track_points`: append-only, `id` preserves insertion order

use std::sync::{Arc, Mutex, MutexGuard};

use log::info;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};

use crate::error::{Result, TrackerError};
use crate::geo_utils::DistanceFormula;
use crate::session::{Session, TrackingMode};
use crate::store::{PointStore, SessionStore};
use crate::TrackPoint;

const SESSION_COLUMNS: &str = "session_id, start_time, end_time, total_distance, mode,
     confidence_score, is_paused, elapsed_time_seconds, last_pause_time, distance_formula";

/// SQLite-backed session and point store.
pub struct SqliteStore {
    db: Mutex<Connection>,
    db_path: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Self::migrate_add_distance_formula(&db)?;
        info!("[SqliteStore] Opened {}", db_path);

        Ok(Self {
            db: Mutex::new(db),
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Convenience for handing the same store to both context slots.
    pub fn shared(db_path: &str) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::open(db_path)?))
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                total_distance REAL NOT NULL DEFAULT 0,
                mode TEXT NOT NULL,
                confidence_score INTEGER NOT NULL DEFAULT 0,
                is_paused INTEGER NOT NULL DEFAULT 0,
                elapsed_time_seconds INTEGER NOT NULL DEFAULT 0,
                last_pause_time INTEGER
            );

            CREATE TABLE IF NOT EXISTS track_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                timestamp INTEGER NOT NULL,
                accuracy REAL NOT NULL,
                speed REAL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_open ON sessions(end_time);
            CREATE INDEX IF NOT EXISTS idx_points_session ON track_points(session_id, timestamp);
        "#,
        )
    }

    /// Databases created before sessions recorded their distance formula
    /// get the column, defaulting old rows to haversine.
    fn migrate_add_distance_formula(conn: &Connection) -> SqlResult<()> {
        let column_exists: i64 = conn
            .prepare(
                "SELECT COUNT(*) FROM pragma_table_info('sessions') WHERE name = 'distance_formula'",
            )?
            .query_row([], |row| row.get(0))?;

        if column_exists > 0 {
            return Ok(());
        }

        info!("[SqliteStore] Running migration: add_distance_formula");
        conn.execute(
            "ALTER TABLE sessions ADD COLUMN distance_formula TEXT NOT NULL DEFAULT 'haversine'",
            [],
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| TrackerError::persistence("database lock poisoned"))
    }

    fn session_from_row(row: &Row) -> SqlResult<Session> {
        let mode: String = row.get(4)?;
        let formula: String = row.get(9)?;
        let confidence: i64 = row.get(5)?;
        let elapsed: i64 = row.get(7)?;
        Ok(Session {
            session_id: row.get(0)?,
            start_time: row.get(1)?,
            end_time: row.get(2)?,
            total_distance: row.get(3)?,
            mode: TrackingMode::from_tag(&mode),
            confidence_score: confidence.clamp(0, 100) as u8,
            is_paused: row.get(6)?,
            elapsed_time_seconds: elapsed.max(0) as u64,
            last_pause_time: row.get(8)?,
            distance_formula: DistanceFormula::from_tag(&formula),
        })
    }

    fn point_from_row(row: &Row) -> SqlResult<TrackPoint> {
        Ok(TrackPoint {
            session_id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            timestamp: row.get(3)?,
            accuracy: row.get(4)?,
            speed: row.get(5)?,
        })
    }

    fn insert_point(conn: &Connection, point: &TrackPoint) -> SqlResult<()> {
        conn.execute(
            "INSERT INTO track_points (session_id, latitude, longitude, timestamp, accuracy, speed)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                point.session_id,
                point.latitude,
                point.longitude,
                point.timestamp,
                point.accuracy,
                point.speed,
            ],
        )?;
        Ok(())
    }
}

impl SessionStore for SqliteStore {
    fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE session_id = ?", SESSION_COLUMNS),
                params![session_id],
                Self::session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn get_active(&self) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                &format!(
                    "SELECT {} FROM sessions WHERE end_time IS NULL
                     ORDER BY start_time DESC LIMIT 1",
                    SESSION_COLUMNS
                ),
                [],
                Self::session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    fn upsert(&self, session: &Session) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO sessions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                SESSION_COLUMNS
            ),
            params![
                session.session_id,
                session.start_time,
                session.end_time,
                session.total_distance,
                session.mode.as_tag(),
                session.confidence_score as i64,
                session.is_paused,
                session.elapsed_time_seconds as i64,
                session.last_pause_time,
                session.distance_formula.as_str(),
            ],
        )?;
        Ok(())
    }

    fn all(&self) -> Result<Vec<Session>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY start_time DESC",
            SESSION_COLUMNS
        ))?;
        let sessions = stmt
            .query_map([], Self::session_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(sessions)
    }

    fn delete_session(&self, session_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sessions WHERE session_id = ?", params![session_id])?;
        Ok(())
    }
}

impl PointStore for SqliteStore {
    fn append_one(&self, point: &TrackPoint) -> Result<()> {
        let conn = self.conn()?;
        Self::insert_point(&conn, point)?;
        Ok(())
    }

    fn append_many(&self, points: &[TrackPoint]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for point in points {
            Self::insert_point(&tx, point)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn stream_for_session(&self, session_id: &str) -> Result<Vec<TrackPoint>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, latitude, longitude, timestamp, accuracy, speed
             FROM track_points WHERE session_id = ?
             ORDER BY timestamp ASC, id ASC",
        )?;
        let points = stmt
            .query_map(params![session_id], Self::point_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(points)
    }

    fn count_for_session(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM track_points WHERE session_id = ?",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn delete_for_session(&self, session_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM track_points WHERE session_id = ?",
            params![session_id],
        )?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fix;

    fn session(id: &str, start: i64) -> Session {
        Session::new(
            id.to_string(),
            start,
            TrackingMode::GpsOnly,
            DistanceFormula::Geodesic,
        )
    }

    #[test]
    fn test_session_roundtrip_fields() {
        let store = SqliteStore::in_memory().unwrap();
        let mut s = session("s-1", 1_700_000_000_000);
        s.total_distance = 1234.5;
        s.confidence_score = 87;
        s.is_paused = true;
        s.elapsed_time_seconds = 321;
        s.last_pause_time = Some(1_700_000_321_000);
        store.upsert(&s).unwrap();

        let loaded = store.get("s-1").unwrap().unwrap();
        assert_eq!(loaded, s);
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_get_active() {
        let store = SqliteStore::in_memory().unwrap();
        let mut finished = session("old", 1);
        finished.end_time = Some(2);
        store.upsert(&finished).unwrap();
        assert!(store.get_active().unwrap().is_none());

        store.upsert(&session("open", 3)).unwrap();
        assert_eq!(store.get_active().unwrap().unwrap().session_id, "open");
        assert_eq!(store.all().unwrap().len(), 2);
    }

    #[test]
    fn test_points_keep_insertion_order_for_ties() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .append_many(&[
                TrackPoint::from_fix("s", &Fix::new(1.0, 1.0, 100, 3.0)),
                TrackPoint::from_fix("s", &Fix::new(2.0, 2.0, 100, 3.0)),
                TrackPoint::from_fix("s", &Fix::new(0.5, 0.5, 50, 3.0).with_speed(1.2)),
            ])
            .unwrap();

        let points = store.stream_for_session("s").unwrap();
        let lats: Vec<f64> = points.iter().map(|p| p.latitude).collect();
        assert_eq!(lats, vec![0.5, 1.0, 2.0]);
        assert_eq!(points[0].speed, Some(1.2));
        assert_eq!(points[1].speed, None);
        assert_eq!(store.count_for_session("s").unwrap(), 3);
    }

    #[test]
    fn test_delete() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert(&session("s", 1)).unwrap();
        store
            .append_one(&TrackPoint::from_fix("s", &Fix::new(1.0, 1.0, 1, 3.0)))
            .unwrap();
        crate::store::delete_session_data(&store, &store, "s").unwrap();
        assert!(store.get("s").unwrap().is_none());
        assert_eq!(store.count_for_session("s").unwrap(), 0);
    }

    #[test]
    fn test_reopen_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteStore::open(path).unwrap();
            store.upsert(&session("s", 1)).unwrap();
        }

        let store = SqliteStore::open(path).unwrap();
        assert_eq!(store.get_active().unwrap().unwrap().session_id, "s");
        assert_eq!(store.path(), path);
    }
}
