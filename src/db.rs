//! SQLite-backed [`ConcertStore`].
//!
//! One connection, one writer. The UNIQUE constraint on `identity_hash` is
//! what makes the upsert safe against concurrent processes; the in-process
//! mutex keeps the insert-then-read pair atomic here.

use crate::domain::{CountryCode, EventIdentity, EventRecord, ResolvedArtist};
use crate::error::{AggregatorError, Result};
use crate::storage::{ConcertStore, StoredEvent};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open_at<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let db_path = data_dir.as_ref().join("concerts.db");
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS events (
                id             TEXT PRIMARY KEY,
                identity_hash  TEXT NOT NULL UNIQUE,
                artist         TEXT NOT NULL,
                venue          TEXT NOT NULL,
                city           TEXT NOT NULL,
                country        TEXT,
                date           TEXT NOT NULL,
                time           TEXT,
                url            TEXT,
                source         TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS artists (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                name_slug   TEXT NOT NULL,
                catalog_id  TEXT UNIQUE,
                country     TEXT,
                url         TEXT,
                created_at  TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn event_from_row(row: &rusqlite::Row<'_>) -> Result<StoredEvent> {
        let id_str: String = row.get(0)?;
        let identity_hash: String = row.get(1)?;
        let artist: String = row.get(2)?;
        let venue: String = row.get(3)?;
        let city: String = row.get(4)?;
        let country: Option<String> = row.get(5)?;
        let date_str: String = row.get(6)?;
        let time_str: Option<String> = row.get(7)?;
        let url: Option<String> = row.get(8)?;
        let source: String = row.get(9)?;

        let id = Uuid::parse_str(&id_str).map_err(|e| AggregatorError::Api {
            message: format!("Invalid stored event id: {e}"),
        })?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
            AggregatorError::Api {
                message: format!("Invalid stored event date: {e}"),
            }
        })?;
        let time = time_str
            .map(|t| NaiveTime::parse_from_str(&t, "%H:%M:%S"))
            .transpose()
            .map_err(|e| AggregatorError::Api {
                message: format!("Invalid stored event time: {e}"),
            })?;

        let record = EventRecord {
            artist,
            venue,
            city,
            country: country.and_then(|c| CountryCode::parse(&c).ok()),
            date,
            time,
            url,
            source,
        };
        Ok(StoredEvent {
            id,
            identity: EventIdentity(identity_hash),
            record,
        })
    }

    fn read_event_locked(
        conn: &Connection,
        identity: &EventIdentity,
    ) -> Result<Option<StoredEvent>> {
        let mut stmt = conn.prepare(
            "SELECT id, identity_hash, artist, venue, city, country, date, time, url, source
             FROM events WHERE identity_hash = ?1",
        )?;
        let mut rows = stmt.query(params![identity.as_str()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::event_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    fn artist_from_row(row: &rusqlite::Row<'_>) -> Result<ResolvedArtist> {
        let id_str: String = row.get(0)?;
        let name: String = row.get(1)?;
        let name_slug: String = row.get(2)?;
        let catalog_id: Option<String> = row.get(3)?;
        let country: Option<String> = row.get(4)?;
        let url: Option<String> = row.get(5)?;
        let created_str: String = row.get(6)?;

        let id = Uuid::parse_str(&id_str).map_err(|e| AggregatorError::Api {
            message: format!("Invalid stored artist id: {e}"),
        })?;
        let created_at = DateTime::parse_from_rfc3339(&created_str)
            .map_err(|e| AggregatorError::Api {
                message: format!("Invalid stored artist timestamp: {e}"),
            })?
            .with_timezone(&Utc);

        Ok(ResolvedArtist {
            id: Some(id),
            name,
            name_slug,
            catalog_id,
            country: country.and_then(|c| CountryCode::parse(&c).ok()),
            url,
            created_at,
        })
    }
}

#[async_trait]
impl ConcertStore for SqliteStore {
    async fn upsert_event(
        &self,
        identity: &EventIdentity,
        record: &EventRecord,
    ) -> Result<(StoredEvent, bool)> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT INTO events (id, identity_hash, artist, venue, city, country, date, time, url, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(identity_hash) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                identity.as_str(),
                record.artist,
                record.venue,
                record.city,
                record.country.as_ref().map(|c| c.as_str().to_string()),
                record.date.format("%Y-%m-%d").to_string(),
                record.time.map(|t| t.format("%H:%M:%S").to_string()),
                record.url,
                record.source,
            ],
        )?;
        let is_new = inserted > 0;

        let stored = Self::read_event_locked(&conn, identity)?.ok_or_else(|| {
            AggregatorError::Api {
                message: "Event vanished between upsert and read-back".to_string(),
            }
        })?;
        if is_new {
            debug!("Inserted event {} with id {}", identity, stored.id);
        }
        Ok((stored, is_new))
    }

    async fn get_event_by_identity(
        &self,
        identity: &EventIdentity,
    ) -> Result<Option<StoredEvent>> {
        let conn = self.conn.lock().unwrap();
        Self::read_event_locked(&conn, identity)
    }

    async fn list_events(&self) -> Result<Vec<StoredEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, identity_hash, artist, venue, city, country, date, time, url, source
             FROM events ORDER BY date, artist, source",
        )?;
        let mut rows = stmt.query([])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(Self::event_from_row(row)?);
        }
        Ok(events)
    }

    async fn create_artist(&self, artist: &mut ResolvedArtist) -> Result<()> {
        let id = Uuid::new_v4();
        artist.id = Some(id);

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO artists (id, name, name_slug, catalog_id, country, url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                artist.name,
                artist.name_slug,
                artist.catalog_id,
                artist.country.as_ref().map(|c| c.as_str().to_string()),
                artist.url,
                artist.created_at.to_rfc3339(),
            ],
        )?;
        debug!("Created artist: {} with id {}", artist.name, id);
        Ok(())
    }

    async fn find_artist_by_catalog_id(&self, catalog_id: &str) -> Result<Option<ResolvedArtist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, name_slug, catalog_id, country, url, created_at
             FROM artists WHERE catalog_id = ?1",
        )?;
        let mut rows = stmt.query(params![catalog_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::artist_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    async fn find_artist_by_name(&self, name: &str) -> Result<Option<ResolvedArtist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, name_slug, catalog_id, country, url, created_at
             FROM artists WHERE lower(name) = lower(?1)",
        )?;
        let mut rows = stmt.query(params![name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::artist_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    async fn list_artists(&self) -> Result<Vec<ResolvedArtist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, name_slug, catalog_id, country, url, created_at
             FROM artists ORDER BY name_slug",
        )?;
        let mut rows = stmt.query([])?;
        let mut artists = Vec::new();
        while let Some(row) = rows.next()? {
            artists.push(Self::artist_from_row(row)?);
        }
        Ok(artists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::compute_event_identity;

    fn sample_record() -> EventRecord {
        EventRecord::new(
            "Low",
            "Barbican",
            "London",
            NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            "ticketmaster",
        )
        .with_url("https://example.com/low")
    }

    #[tokio::test]
    async fn upsert_is_first_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_at(dir.path()).unwrap();

        let record = sample_record();
        let identity = compute_event_identity(&record);

        let (first, is_new) = store.upsert_event(&identity, &record).await.unwrap();
        assert!(is_new);

        let mut changed = record.clone();
        changed.url = Some("https://example.com/other".to_string());
        let (second, is_new) = store.upsert_event(&identity, &changed).await.unwrap();
        assert!(!is_new);
        assert_eq!(first.id, second.id);
        assert_eq!(second.record.url.as_deref(), Some("https://example.com/low"));
    }

    #[tokio::test]
    async fn events_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample_record();
        let identity = compute_event_identity(&record);

        {
            let store = SqliteStore::open_at(dir.path()).unwrap();
            store.upsert_event(&identity, &record).await.unwrap();
        }

        let store = SqliteStore::open_at(dir.path()).unwrap();
        let found = store.get_event_by_identity(&identity).await.unwrap();
        assert_eq!(found.map(|s| s.record.artist), Some("Low".to_string()));
    }

    #[tokio::test]
    async fn artist_roundtrip_by_catalog_id_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_at(dir.path()).unwrap();

        let mut artist = ResolvedArtist::new("Sigur Rós");
        artist.catalog_id = Some("mb-sr".to_string());
        artist.country = CountryCode::parse("IS").ok();
        store.create_artist(&mut artist).await.unwrap();

        let by_id = store.find_artist_by_catalog_id("mb-sr").await.unwrap().unwrap();
        assert_eq!(by_id.name, "Sigur Rós");
        assert_eq!(by_id.name_slug, "sigur-ros");
        assert_eq!(by_id.country.as_ref().map(|c| c.as_str()), Some("IS"));

        let by_name = store.find_artist_by_name("sigur rós").await.unwrap();
        assert!(by_name.is_some());
    }
}
