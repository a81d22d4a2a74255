//! Domain data shapes shared across resolution, aggregation and storage.
//!
//! Every boundary in the crate passes one of these named structs; raw
//! provider payloads stop at the `apis` layer.

use crate::error::{AggregatorError, Result};
use crate::normalize;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Kind of catalog entity a candidate refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Person,
    Group,
    Other,
}

impl EntityKind {
    /// Map a catalog `type` string ("Person", "Group", "Choir", ...) onto the
    /// kinds scoring cares about.
    pub fn from_catalog_type(raw: Option<&str>) -> Self {
        match raw {
            Some(t) if t.eq_ignore_ascii_case("person") => EntityKind::Person,
            Some(t) if t.eq_ignore_ascii_case("group") => EntityKind::Group,
            _ => EntityKind::Other,
        }
    }
}

/// One artist search hit, carrying both the catalog's native score and the
/// relevance computed against the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub catalog_id: Option<String>,
    pub name: String,
    pub kind: EntityKind,
    pub country: Option<String>,
    pub disambiguation: Option<String>,
    pub begin_year: Option<i32>,
    pub end_year: Option<i32>,
    /// Score exactly as the catalog reported it.
    pub catalog_score: i64,
    /// Catalog score plus the search-strategy boost.
    pub provider_score: i64,
    /// Query-relative relevance, filled in by the resolver.
    pub relevance: f64,
    /// Ranking score combining relevance and provider score.
    pub combined_score: f64,
}

/// Durable artist entity a user can follow. Unique by catalog id when one is
/// present, by name otherwise; never deleted by the aggregation flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedArtist {
    pub id: Option<Uuid>,
    pub name: String,
    pub name_slug: String,
    pub catalog_id: Option<String>,
    pub country: Option<CountryCode>,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ResolvedArtist {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            name_slug: normalize::normalize_for_slug(name),
            catalog_id: None,
            country: None,
            url: None,
            created_at: Utc::now(),
        }
    }

    /// Promote an accepted search candidate into a followable artist.
    pub fn from_candidate(candidate: &Candidate) -> Self {
        let mut artist = Self::new(&candidate.name);
        artist.catalog_id = candidate.catalog_id.clone();
        // Candidate country strings come from the catalog verbatim; keep the
        // artist clean when the catalog uses a non-ISO value.
        artist.country = candidate
            .country
            .as_deref()
            .and_then(|c| CountryCode::parse(c).ok());
        artist
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }
}

/// One concert occurrence as reported by a single provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub artist: String,
    pub venue: String,
    pub city: String,
    pub country: Option<CountryCode>,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub url: Option<String>,
    /// Source tag of the provider that reported the event. Part of the
    /// event identity; the same concert from two providers is two records.
    pub source: String,
}

impl EventRecord {
    pub fn new(artist: &str, venue: &str, city: &str, date: NaiveDate, source: &str) -> Self {
        Self {
            artist: artist.to_string(),
            venue: venue.to_string(),
            city: city.to_string(),
            country: None,
            date,
            time: None,
            url: None,
            source: source.to_string(),
        }
    }

    pub fn with_country(mut self, country: CountryCode) -> Self {
        self.country = Some(country);
        self
    }

    pub fn with_time(mut self, time: NaiveTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }
}

/// Hex-encoded SHA-256 identity of an event record. Derived from the artist,
/// venue, date and source exactly as the provider sent them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventIdentity(pub String);

impl EventIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 3166-1 alpha-2 country code, always stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(AggregatorError::Api {
                message: format!("Invalid country code: '{raw}'"),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = AggregatorError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

/// Country row from the reference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryEntry {
    pub code: CountryCode,
    pub name: String,
    pub phone_code: Option<String>,
    pub currency: Option<String>,
}

/// City row from the reference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityEntry {
    pub name: String,
    pub country: CountryCode,
    pub state: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Non-empty set of countries a user wants concerts filtered to.
/// `BTreeSet` keeps iteration order deterministic for tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGeoPreference {
    countries: BTreeSet<CountryCode>,
}

impl UserGeoPreference {
    pub fn new<I: IntoIterator<Item = CountryCode>>(countries: I) -> Result<Self> {
        let countries: BTreeSet<CountryCode> = countries.into_iter().collect();
        if countries.is_empty() {
            return Err(AggregatorError::Api {
                message: "Geo preference must contain at least one country".to_string(),
            });
        }
        Ok(Self { countries })
    }

    pub fn single(country: CountryCode) -> Self {
        let mut countries = BTreeSet::new();
        countries.insert(country);
        Self { countries }
    }

    pub fn add(&mut self, country: CountryCode) {
        self.countries.insert(country);
    }

    /// Removing the last remaining country is rejected; a preference can
    /// never become empty.
    pub fn remove(&mut self, country: &CountryCode) -> Result<()> {
        if self.countries.len() == 1 && self.countries.contains(country) {
            return Err(AggregatorError::Api {
                message: "Cannot remove the last country from a geo preference".to_string(),
            });
        }
        self.countries.remove(country);
        Ok(())
    }

    pub fn contains(&self, country: &CountryCode) -> bool {
        self.countries.contains(country)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CountryCode> {
        self.countries.iter()
    }

    pub fn countries(&self) -> &BTreeSet<CountryCode> {
        &self.countries
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}
