//! External service clients, one file per source.
//!
//! Traits sit at every seam so the resolver, geo cache and aggregator can be
//! exercised against stubs; the real clients all speak JSON over `reqwest`
//! with per-request timeouts from config.

pub mod bandsintown;
pub mod countriesnow;
pub mod musicbrainz;
pub mod ticketmaster;

use crate::config::Config;
use crate::constants;
use crate::domain::{CityEntry, CountryCode, CountryEntry, EventRecord};
use crate::error::Result;

/// How a catalog search query is built, from strictest to broadest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Exact phrase, quoted.
    QuotedPhrase,
    /// Terms scoped to the artist name field.
    ArtistField,
    /// Raw terms, broadest recall.
    Basic,
}

/// One artist hit from the catalog, before scoring.
#[derive(Debug, Clone)]
pub struct CatalogHit {
    pub id: Option<String>,
    pub name: String,
    pub kind: Option<String>,
    pub country: Option<String>,
    pub disambiguation: Option<String>,
    pub begin_year: Option<i32>,
    pub end_year: Option<i32>,
    /// The catalog's native 0-100 score.
    pub score: i64,
}

/// Artist search against the canonical music catalog.
#[async_trait::async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn search_artists(
        &self,
        query: &str,
        scope: SearchScope,
        limit: usize,
    ) -> Result<Vec<CatalogHit>>;
}

/// Core trait every concert source implements.
#[async_trait::async_trait]
pub trait EventProvider: Send + Sync {
    /// Stable tag identifying this source. Stored event identities include
    /// it, so it must never change.
    fn source_id(&self) -> &'static str;

    /// Fetch upcoming events for one artist.
    async fn fetch_events(&self, artist: &str) -> Result<Vec<EventRecord>>;

    /// Whether this source reliably populates the country field. Records from
    /// such sources survive geo filtering even when their city is unknown to
    /// the reference data.
    fn country_reliable(&self) -> bool {
        false
    }
}

/// Reference service for countries and their cities.
#[async_trait::async_trait]
pub trait GeoReference: Send + Sync {
    async fn list_countries(&self) -> Result<Vec<CountryEntry>>;
    async fn list_cities(&self, country: &CountryCode) -> Result<Vec<CityEntry>>;
}

/// Build an event provider from its source tag.
pub fn create_provider(source: &str, config: &Config) -> Option<Box<dyn EventProvider>> {
    match source {
        constants::BANDSINTOWN_SOURCE => Some(Box::new(
            bandsintown::BandsintownProvider::new(&config.bandsintown),
        )),
        constants::TICKETMASTER_SOURCE => Some(Box::new(
            ticketmaster::TicketmasterProvider::new(&config.ticketmaster),
        )),
        _ => None,
    }
}
