//! One artist, all providers: fetch concurrently, filter, store.
//!
//! Provider calls run as separate tasks and every batch is collected before
//! dedup or filtering starts. A failing provider contributes an empty batch
//! and an error status; it never sinks the run.

use crate::apis::EventProvider;
use crate::dedup::{Deduper, UpsertOutcome};
use crate::domain::{EventRecord, ResolvedArtist, UserGeoPreference};
use crate::error::Result;
use crate::geo::GeoResolver;
use crate::observability::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Per-provider slice of an aggregation run.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderOutcome {
    pub source: String,
    pub fetched: usize,
    pub kept: usize,
    pub new_events: usize,
    pub duplicates: usize,
    pub status: String,
}

/// What one `sync_artist` call did.
#[derive(Debug, Serialize)]
pub struct AggregateSummary {
    pub artist: String,
    pub fetched: usize,
    pub kept: usize,
    pub new_events: usize,
    pub duplicates: usize,
    pub outcomes: Vec<ProviderOutcome>,
}

pub struct Aggregator {
    providers: Vec<Arc<dyn EventProvider>>,
    deduper: Deduper,
    geo: Arc<GeoResolver>,
}

impl Aggregator {
    pub fn new(
        providers: Vec<Arc<dyn EventProvider>>,
        deduper: Deduper,
        geo: Arc<GeoResolver>,
    ) -> Self {
        Self {
            providers,
            deduper,
            geo,
        }
    }

    #[instrument(skip(self, artist, preference), fields(artist = %artist.name))]
    pub async fn sync_artist(
        &self,
        artist: &ResolvedArtist,
        preference: Option<&UserGeoPreference>,
    ) -> Result<AggregateSummary> {
        metrics::aggregate::run_started();
        let run_started = Instant::now();
        info!("🚀 Aggregating events for {}", artist.name);
        println!("🚀 Aggregating events for {}", artist.name);

        self.geo.ensure_fresh().await?;

        info!("📡 Fetching from {} providers...", self.providers.len());
        println!("📡 Fetching from {} providers...", self.providers.len());
        let batches = self.fetch_all(&artist.name).await;

        let fetched: usize = batches.iter().map(|b| b.records.len()).sum();
        info!("✅ Fetched {} events", fetched);
        println!("✅ Fetched {} events", fetched);

        // Every batch is in hand; filter the combined list in one pass.
        let mut all_events = Vec::with_capacity(fetched);
        for batch in &batches {
            all_events.extend(batch.records.iter().cloned());
        }
        let kept_events = self.geo.filter_by_country(all_events, preference);
        info!("🌍 {} events kept after country filtering", kept_events.len());
        println!("🌍 {} events kept after country filtering", kept_events.len());

        let mut stored: HashMap<String, (usize, usize)> = HashMap::new();
        for record in &kept_events {
            let (_, outcome) = self.deduper.upsert(record).await?;
            let counts = stored.entry(record.source.clone()).or_default();
            match outcome {
                UpsertOutcome::Inserted => counts.0 += 1,
                UpsertOutcome::Duplicate => counts.1 += 1,
            }
        }

        let mut kept_by_source: HashMap<&str, usize> = HashMap::new();
        for record in &kept_events {
            *kept_by_source.entry(record.source.as_str()).or_default() += 1;
        }

        let mut outcomes = Vec::with_capacity(batches.len());
        for batch in batches {
            let (new_events, duplicates) =
                stored.get(batch.source).copied().unwrap_or((0, 0));
            outcomes.push(ProviderOutcome {
                source: batch.source.to_string(),
                fetched: batch.records.len(),
                kept: kept_by_source.get(batch.source).copied().unwrap_or(0),
                new_events,
                duplicates,
                status: batch.status,
            });
        }

        let summary = AggregateSummary {
            artist: artist.name.clone(),
            fetched,
            kept: kept_events.len(),
            new_events: outcomes.iter().map(|o| o.new_events).sum(),
            duplicates: outcomes.iter().map(|o| o.duplicates).sum(),
            outcomes,
        };
        metrics::aggregate::run_duration(run_started.elapsed().as_secs_f64());
        info!(
            "💾 Stored {} new events for {} ({} duplicates)",
            summary.new_events, artist.name, summary.duplicates
        );
        println!(
            "💾 Stored {} new events for {} ({} duplicates)",
            summary.new_events, artist.name, summary.duplicates
        );
        Ok(summary)
    }

    async fn fetch_all(&self, artist: &str) -> Vec<ProviderBatch> {
        let mut handles = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let provider = provider.clone();
            let artist = artist.to_string();
            let source = provider.source_id();
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let result = provider.fetch_events(&artist).await;
                (result, started.elapsed().as_secs_f64())
            });
            handles.push((source, handle));
        }

        let mut batches = Vec::with_capacity(handles.len());
        for (source, handle) in handles {
            let batch = match handle.await {
                Ok((Ok(records), secs)) => {
                    metrics::providers::fetch_success(source);
                    metrics::providers::fetch_duration(source, secs);
                    metrics::providers::events_fetched(source, records.len());
                    ProviderBatch {
                        source,
                        status: format!("{}: fetched {} events", source, records.len()),
                        records,
                    }
                }
                Ok((Err(e), secs)) => {
                    metrics::providers::fetch_error(source);
                    metrics::providers::fetch_duration(source, secs);
                    warn!("Provider {} failed: {}", source, e);
                    ProviderBatch {
                        source,
                        status: format!("{}: error ({})", source, e),
                        records: Vec::new(),
                    }
                }
                Err(e) => {
                    metrics::providers::fetch_error(source);
                    warn!("Provider {} task aborted: {}", source, e);
                    ProviderBatch {
                        source,
                        status: format!("{}: task aborted", source),
                        records: Vec::new(),
                    }
                }
            };
            batches.push(batch);
        }
        batches
    }
}

struct ProviderBatch {
    source: &'static str,
    records: Vec<EventRecord>,
    status: String,
}
