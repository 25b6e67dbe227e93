use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Event, EventType, HeatmapClick, SessionSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, min, 0).unwrap()
    }

    fn event(
        session_id: &str,
        event_type: EventType,
        page_url: &str,
        timestamp: DateTime<Utc>,
    ) -> Event {
        let coords = if event_type.requires_coordinates() {
            (Some(150.0), Some(200.0))
        } else {
            (None, None)
        };
        Event {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            event_type,
            page_url: page_url.to_string(),
            timestamp,
            click_x: coords.0,
            click_y: coords.1,
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let store = EventStore::open_in_memory().unwrap();
        let mut stored = event("s1", EventType::PageView, "https://example.com/", ts(12, 0));
        stored.metadata = json!({ "referrer": "https://google.com" })
            .as_object()
            .unwrap()
            .clone();
        store.insert(&stored).unwrap();

        let events = store.session_events("s1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, stored.id);
        assert_eq!(events[0].event_type, EventType::PageView);
        assert_eq!(events[0].metadata["referrer"], "https://google.com");
    }

    #[test]
    fn test_session_summaries_aggregate() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert(&event("s1", EventType::PageView, "https://a.com/x", ts(12, 0)))
            .unwrap();
        store
            .insert(&event("s1", EventType::Click, "https://a.com/x", ts(12, 5)))
            .unwrap();
        store
            .insert(&event("s1", EventType::PageView, "https://a.com/y", ts(12, 10)))
            .unwrap();

        let sessions = store.session_summaries().unwrap();
        assert_eq!(sessions.len(), 1);
        let s = &sessions[0];
        assert_eq!(s.session_id, "s1");
        assert_eq!(s.total_events, 3);
        assert_eq!(s.first_seen, ts(12, 0));
        assert_eq!(s.last_seen, ts(12, 10));
        assert_eq!(s.unique_pages, 2);
    }

    #[test]
    fn test_sessions_ordered_by_last_seen_desc() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert(&event("old", EventType::PageView, "https://a.com/", ts(9, 0)))
            .unwrap();
        store
            .insert(&event("recent", EventType::PageView, "https://a.com/", ts(15, 0)))
            .unwrap();

        let sessions = store.session_summaries().unwrap();
        assert_eq!(sessions[0].session_id, "recent");
        assert_eq!(sessions[1].session_id, "old");
    }

    #[test]
    fn test_session_events_in_replay_order() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert(&event("s1", EventType::Click, "https://a.com/", ts(12, 30)))
            .unwrap();
        store
            .insert(&event("s1", EventType::PageView, "https://a.com/", ts(12, 0)))
            .unwrap();
        store
            .insert(&event("s2", EventType::PageView, "https://a.com/", ts(12, 15)))
            .unwrap();

        let events = store.session_events("s1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::PageView);
        assert_eq!(events[1].event_type, EventType::Click);
    }

    #[test]
    fn test_unknown_session_is_empty() {
        let store = EventStore::open_in_memory().unwrap();
        assert!(store.session_events("nope").unwrap().is_empty());
    }

    #[test]
    fn test_heatmap_filters_plain_clicks_for_page() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert(&event("s1", EventType::Click, "https://a.com/x", ts(12, 0)))
            .unwrap();
        store
            .insert(&event("s1", EventType::Click, "https://a.com/y", ts(12, 1)))
            .unwrap();
        // Button clicks carry coordinates but are not part of the heatmap
        store
            .insert(&event("s1", EventType::ButtonClick, "https://a.com/x", ts(12, 2)))
            .unwrap();
        store
            .insert(&event("s1", EventType::Click, "https://a.com/x", ts(12, 3)))
            .unwrap();

        let clicks = store.clicks_for_page("https://a.com/x").unwrap();
        assert_eq!(clicks.len(), 2);
        // Newest first
        assert_eq!(clicks[0].timestamp, ts(12, 3));
        assert_eq!(clicks[1].timestamp, ts(12, 0));
        assert_eq!(clicks[0].click_x, 150.0);
    }

    #[test]
    fn test_pages_distinct_and_sorted() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .insert(&event("s1", EventType::PageView, "https://a.com/b", ts(12, 0)))
            .unwrap();
        store
            .insert(&event("s2", EventType::PageView, "https://a.com/a", ts(12, 1)))
            .unwrap();
        store
            .insert(&event("s3", EventType::Scroll, "https://a.com/b", ts(12, 2)))
            .unwrap();

        let pages = store.pages().unwrap();
        assert_eq!(pages, vec!["https://a.com/a", "https://a.com/b"]);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/analytics.db");
        let store = EventStore::open(&path).unwrap();
        store
            .insert(&event("s1", EventType::PageView, "https://a.com/", ts(12, 0)))
            .unwrap();
        assert!(path.exists());
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("malformed row: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Embedded document store for events.
///
/// One row per event; `metadata` is a JSON text column so the payload
/// stays an open key-value map. Events are append-only: nothing in this
/// type updates or deletes a row.
pub struct EventStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id          TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL,
    event_type  TEXT NOT NULL,
    page_url    TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    click_x     REAL,
    click_y     REAL,
    metadata    TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_events_session_ts ON events(session_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_events_page_type  ON events(page_url, event_type);
"#;

impl EventStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // Idempotent, safe to re-run on every startup
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("event store mutex poisoned")
    }

    pub fn insert(&self, event: &Event) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&event.metadata)?;
        self.lock().execute(
            "INSERT INTO events (id, session_id, event_type, page_url, timestamp, click_x, click_y, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id.to_string(),
                event.session_id,
                event.event_type.as_str(),
                event.page_url,
                event.timestamp,
                event.click_x,
                event.click_y,
                metadata,
            ],
        )?;
        Ok(())
    }

    /// Group events by session: count, first/last timestamp, distinct
    /// page count. Most recently active sessions first.
    pub fn session_summaries(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, COUNT(*), MIN(timestamp), MAX(timestamp), COUNT(DISTINCT page_url)
             FROM events
             GROUP BY session_id
             ORDER BY MAX(timestamp) DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionSummary {
                session_id: row.get(0)?,
                total_events: row.get(1)?,
                first_seen: row.get(2)?,
                last_seen: row.get(3)?,
                unique_pages: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// All events of one session in replay (timestamp ascending) order.
    pub fn session_events(&self, session_id: &str) -> Result<Vec<Event>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, event_type, page_url, timestamp, click_x, click_y, metadata
             FROM events
             WHERE session_id = ?1
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map([session_id], row_to_raw)?;
        rows.map(|raw| raw.map_err(StoreError::from).and_then(RawEvent::decode))
            .collect()
    }

    /// Plain `click` events on one page, newest first.
    pub fn clicks_for_page(&self, page_url: &str) -> Result<Vec<HeatmapClick>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT click_x, click_y, timestamp, session_id
             FROM events
             WHERE event_type = 'click' AND page_url = ?1
             ORDER BY timestamp DESC",
        )?;
        let rows = stmt.query_map([page_url], |row| {
            Ok(HeatmapClick {
                click_x: row.get(0)?,
                click_y: row.get(1)?,
                timestamp: row.get(2)?,
                session_id: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Every distinct page URL seen so far, sorted.
    pub fn pages(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT page_url FROM events ORDER BY page_url ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

/// Row image before the text columns are decoded into domain types.
struct RawEvent {
    id: String,
    session_id: String,
    event_type: String,
    page_url: String,
    timestamp: DateTime<Utc>,
    click_x: Option<f64>,
    click_y: Option<f64>,
    metadata: String,
}

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        id: row.get(0)?,
        session_id: row.get(1)?,
        event_type: row.get(2)?,
        page_url: row.get(3)?,
        timestamp: row.get(4)?,
        click_x: row.get(5)?,
        click_y: row.get(6)?,
        metadata: row.get(7)?,
    })
}

impl RawEvent {
    fn decode(self) -> Result<Event, StoreError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::Corrupt(format!("bad event id {}: {e}", self.id)))?;
        let event_type = EventType::parse(&self.event_type)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown event_type {}", self.event_type)))?;
        Ok(Event {
            id,
            session_id: self.session_id,
            event_type,
            page_url: self.page_url,
            timestamp: self.timestamp,
            click_x: self.click_x,
            click_y: self.click_y,
            metadata: serde_json::from_str(&self.metadata)?,
        })
    }
}
