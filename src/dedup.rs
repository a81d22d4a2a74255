//! Deterministic event identity and the upsert wrapper built on it.
//!
//! Identity is a SHA-256 over the fields exactly as the provider sent them.
//! City and country stay out of the hash: geo backfill may fill them in
//! later, and re-ingesting the same provider row must land on the same
//! identity either way. The flip side is that providers with inconsistent
//! casing produce distinct identities; that is accepted, not normalized away.

use crate::domain::{EventIdentity, EventRecord};
use crate::error::Result;
use crate::observability::metrics;
use crate::storage::{ConcertStore, StoredEvent};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

pub fn compute_event_identity(record: &EventRecord) -> EventIdentity {
    // Canonical string over identity fields, order fixed forever.
    let mut s = String::new();
    s.push_str(&record.artist);
    s.push('|');
    s.push_str(&record.venue);
    s.push('|');
    s.push_str(&record.date.format("%Y-%m-%d").to_string());
    s.push('|');
    s.push_str(&record.source);

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let out = hasher.finalize();
    EventIdentity(hex::encode(out))
}

/// Outcome of pushing one record through the deduper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting; the record was stored.
    Inserted,
    /// Identity already present; the stored row was left untouched.
    Duplicate,
}

/// First-write-wins event ingestion over a [`ConcertStore`].
pub struct Deduper {
    store: Arc<dyn ConcertStore>,
}

impl Deduper {
    pub fn new(store: Arc<dyn ConcertStore>) -> Self {
        Self { store }
    }

    /// Insert the record unless its identity is already stored. Atomicity is
    /// the store's job (unique constraint on the identity hash); this layer
    /// reports the outcome and flags suspicious duplicates.
    pub async fn upsert(&self, record: &EventRecord) -> Result<(StoredEvent, UpsertOutcome)> {
        let identity = compute_event_identity(record);
        let (stored, is_new) = self.store.upsert_event(&identity, record).await?;

        if is_new {
            debug!(
                "Stored new event {} / {} on {} from {}",
                record.artist, record.venue, record.date, record.source
            );
            metrics::dedup::event_new(&record.source);
            Ok((stored, UpsertOutcome::Inserted))
        } else {
            // Same identity with materially different payload points at a
            // provider feeding inconsistent rows; log it, keep the first.
            if stored.record.city != record.city || stored.record.url != record.url {
                warn!(
                    identity = %identity,
                    "Identity collision with differing payload: stored city '{}' url {:?}, incoming city '{}' url {:?}",
                    stored.record.city, stored.record.url, record.city, record.url
                );
                metrics::dedup::identity_collision();
            }
            metrics::dedup::event_duplicate(&record.source);
            Ok((stored, UpsertOutcome::Duplicate))
        }
    }
}
