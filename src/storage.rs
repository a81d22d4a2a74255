use crate::domain::{EventIdentity, EventRecord, ResolvedArtist};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// A persisted event row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub id: Uuid,
    pub identity: EventIdentity,
    pub record: EventRecord,
}

/// Storage trait for events and resolved artists
#[async_trait]
pub trait ConcertStore: Send + Sync {
    // Event operations
    /// Atomic lookup-or-insert keyed by identity. Returns the stored row and
    /// whether this call created it; an existing row is never modified.
    async fn upsert_event(
        &self,
        identity: &EventIdentity,
        record: &EventRecord,
    ) -> Result<(StoredEvent, bool)>;
    async fn get_event_by_identity(&self, identity: &EventIdentity)
        -> Result<Option<StoredEvent>>;
    async fn list_events(&self) -> Result<Vec<StoredEvent>>;

    // Artist operations
    async fn create_artist(&self, artist: &mut ResolvedArtist) -> Result<()>;
    async fn find_artist_by_catalog_id(&self, catalog_id: &str) -> Result<Option<ResolvedArtist>>;
    async fn find_artist_by_name(&self, name: &str) -> Result<Option<ResolvedArtist>>;
    async fn list_artists(&self) -> Result<Vec<ResolvedArtist>>;
}

/// In-memory storage implementation for development/testing
pub struct InMemoryStore {
    events: Arc<Mutex<HashMap<String, StoredEvent>>>,
    artists: Arc<Mutex<HashMap<Uuid, ResolvedArtist>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(HashMap::new())),
            artists: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConcertStore for InMemoryStore {
    async fn upsert_event(
        &self,
        identity: &EventIdentity,
        record: &EventRecord,
    ) -> Result<(StoredEvent, bool)> {
        // One lock across lookup and insert keeps the upsert atomic.
        let mut events = self.events.lock().unwrap();
        if let Some(existing) = events.get(identity.as_str()) {
            return Ok((existing.clone(), false));
        }

        let stored = StoredEvent {
            id: Uuid::new_v4(),
            identity: identity.clone(),
            record: record.clone(),
        };
        events.insert(identity.as_str().to_string(), stored.clone());

        debug!("Created event: {} with id {}", record.artist, stored.id);
        Ok((stored, true))
    }

    async fn get_event_by_identity(
        &self,
        identity: &EventIdentity,
    ) -> Result<Option<StoredEvent>> {
        let events = self.events.lock().unwrap();
        Ok(events.get(identity.as_str()).cloned())
    }

    async fn list_events(&self) -> Result<Vec<StoredEvent>> {
        let events = self.events.lock().unwrap();
        let mut all: Vec<StoredEvent> = events.values().cloned().collect();
        // Sort chronologically for stable listings
        all.sort_by(|a, b| {
            (a.record.date, &a.record.artist, &a.record.source)
                .cmp(&(b.record.date, &b.record.artist, &b.record.source))
        });
        Ok(all)
    }

    async fn create_artist(&self, artist: &mut ResolvedArtist) -> Result<()> {
        let id = Uuid::new_v4();
        artist.id = Some(id);

        let mut artists = self.artists.lock().unwrap();
        artists.insert(id, artist.clone());

        debug!("Created artist: {} with id {}", artist.name, id);
        Ok(())
    }

    async fn find_artist_by_catalog_id(&self, catalog_id: &str) -> Result<Option<ResolvedArtist>> {
        let artists = self.artists.lock().unwrap();
        let artist = artists
            .values()
            .find(|a| a.catalog_id.as_deref() == Some(catalog_id))
            .cloned();
        Ok(artist)
    }

    async fn find_artist_by_name(&self, name: &str) -> Result<Option<ResolvedArtist>> {
        let artists = self.artists.lock().unwrap();
        let artist = artists
            .values()
            .find(|a| a.name.to_lowercase() == name.to_lowercase())
            .cloned();
        Ok(artist)
    }

    async fn list_artists(&self) -> Result<Vec<ResolvedArtist>> {
        let artists = self.artists.lock().unwrap();
        let mut all: Vec<ResolvedArtist> = artists.values().cloned().collect();
        all.sort_by(|a, b| a.name_slug.cmp(&b.name_slug));
        Ok(all)
    }
}
