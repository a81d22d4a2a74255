//! City-to-country resolution and geographic event filtering.
//!
//! Reference data comes from a remote countries/cities service, cached in
//! SQLite with a TTL. Lookups never touch the network; they run against an
//! in-memory index rebuilt from the cache. A refresh failure is logged and
//! the stale index keeps serving.

pub mod cache;
pub mod variants;

use crate::apis::GeoReference;
use crate::domain::{CountryCode, EventRecord, UserGeoPreference};
use crate::error::Result;
use crate::normalize::normalize_for_search;
use crate::observability::metrics;
use cache::GeoCache;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument, warn};

/// A stored name may extend the queried prefix by at most this many chars.
const MAX_PREFIX_EXTENSION: usize = 5;

/// Inputs shorter than this never enter the variant tier.
const MIN_VARIANT_INPUT: usize = 4;

/// Inputs shorter than this never enter the prefix tier.
const MIN_PREFIX_INPUT: usize = 6;

/// Suffixes accepted outright in the guarded prefix tier.
const SUFFIX_ALLOW_LIST: &[&str] = &[
    "ville", "burg", "ton", "town", "stadt", "berg", "field", "port",
];

#[derive(Default)]
struct CityIndex {
    /// Search-normalized city name to the sorted countries that have it.
    by_city: HashMap<String, Vec<CountryCode>>,
    /// Sorted normalized names, for prefix range scans.
    names: Vec<String>,
}

pub struct GeoResolver {
    cache: GeoCache,
    reference: Arc<dyn GeoReference>,
    ttl_days: i64,
    /// Sources whose records pass the filter even with an unresolvable city.
    trusted_sources: Vec<String>,
    index: RwLock<CityIndex>,
}

impl GeoResolver {
    pub fn new(
        cache: GeoCache,
        reference: Arc<dyn GeoReference>,
        ttl_days: i64,
        trusted_sources: Vec<String>,
    ) -> Result<Self> {
        let resolver = Self {
            cache,
            reference,
            ttl_days,
            trusted_sources,
            index: RwLock::new(CityIndex::default()),
        };
        resolver.rebuild_index()?;
        Ok(resolver)
    }

    fn rebuild_index(&self) -> Result<()> {
        let pairs = self.cache.city_names()?;
        let mut by_city: HashMap<String, Vec<CountryCode>> = HashMap::new();
        for (country, name) in &pairs {
            let key = normalize_for_search(name);
            if key.is_empty() {
                continue;
            }
            let countries = by_city.entry(key).or_default();
            if !countries.contains(country) {
                countries.push(country.clone());
            }
        }
        for countries in by_city.values_mut() {
            countries.sort();
        }
        let mut names: Vec<String> = by_city.keys().cloned().collect();
        names.sort();

        debug!("Rebuilt city index with {} distinct names", names.len());
        *self.index.write().unwrap() = CityIndex { by_city, names };
        Ok(())
    }

    /// Refreshes the cache when it has aged past the TTL. A failed refresh
    /// logs and keeps serving whatever is cached; only local storage faults
    /// surface as errors.
    #[instrument(skip(self))]
    pub async fn ensure_fresh(&self) -> Result<()> {
        if !self.cache.is_stale(self.ttl_days)? {
            return Ok(());
        }
        match self.refresh().await {
            Ok((countries, cities)) => {
                metrics::geo::refresh_success();
                info!("Geo cache refreshed: {} countries, {} cities", countries, cities);
            }
            Err(e) => {
                metrics::geo::refresh_error();
                metrics::geo::served_stale();
                warn!("Geo refresh failed, serving cached data: {}", e);
            }
        }
        Ok(())
    }

    /// Unconditional refresh. Unlike [`ensure_fresh`](Self::ensure_fresh)
    /// this propagates the failure, for callers that asked for it explicitly.
    pub async fn refresh_now(&self) -> Result<(usize, usize)> {
        let counts = self.refresh().await?;
        metrics::geo::refresh_success();
        Ok(counts)
    }

    async fn refresh(&self) -> Result<(usize, usize)> {
        let countries = self.reference.list_countries().await?;
        self.cache.replace_countries(&countries)?;

        // One country at a time; a single failed city list is not fatal.
        let mut city_count = 0;
        for country in &countries {
            match self.reference.list_cities(&country.code).await {
                Ok(cities) => {
                    city_count += cities.len();
                    self.cache.replace_cities(&country.code, &cities)?;
                }
                Err(e) => {
                    warn!("City refresh failed for {}: {}", country.code, e);
                }
            }
        }
        self.rebuild_index()?;
        Ok((countries.len(), city_count))
    }

    /// Resolves a city name to its country. Tiers, first hit wins: exact
    /// normalized match, alternate spellings, guarded prefix. Ties go to a
    /// preferred country when one applies, else to the sorted-first country.
    pub fn country_of(
        &self,
        city: &str,
        preferred: &BTreeSet<CountryCode>,
    ) -> Option<CountryCode> {
        let key = normalize_for_search(city);
        if key.is_empty() {
            return None;
        }
        let index = self.index.read().unwrap();

        if let Some(found) = exact_lookup(&index, &key, preferred) {
            metrics::geo::lookup_exact();
            return Some(found);
        }

        if key.chars().count() >= MIN_VARIANT_INPUT {
            for variant in variants::spelling_variants(&key) {
                if let Some(found) = exact_lookup(&index, &variant, preferred) {
                    metrics::geo::lookup_variant();
                    return Some(found);
                }
            }
        }

        if key.chars().count() >= MIN_PREFIX_INPUT {
            if let Some(found) = prefix_lookup(&index, &key, preferred) {
                metrics::geo::lookup_prefix();
                return Some(found);
            }
        }

        metrics::geo::lookup_miss();
        None
    }

    /// Applies a user's country preference to a batch of events.
    ///
    /// No preference means no filtering. Records without an explicit country
    /// get one inferred from their city and backfilled when it lands inside
    /// the preference. Unresolvable records drop unless their source is
    /// trusted to carry reliable country data.
    pub fn filter_by_country(
        &self,
        events: Vec<EventRecord>,
        preference: Option<&UserGeoPreference>,
    ) -> Vec<EventRecord> {
        let preference = match preference {
            Some(preference) => preference,
            None => return events,
        };
        let preferred = preference.countries();

        let mut kept = Vec::with_capacity(events.len());
        for mut event in events {
            match &event.country {
                Some(code) => {
                    if preference.contains(code) {
                        kept.push(event);
                    } else {
                        metrics::geo::record_dropped();
                        debug!(
                            "Dropped {} at {} ({}): country {} outside preference",
                            event.artist, event.venue, event.city, code
                        );
                    }
                }
                None => match self.country_of(&event.city, preferred) {
                    Some(code) if preference.contains(&code) => {
                        metrics::geo::record_backfilled();
                        event.country = Some(code);
                        kept.push(event);
                    }
                    Some(code) => {
                        metrics::geo::record_dropped();
                        debug!(
                            "Dropped {} at {} ({}): inferred country {} outside preference",
                            event.artist, event.venue, event.city, code
                        );
                    }
                    None => {
                        if self.trusted_sources.iter().any(|s| s == &event.source) {
                            metrics::geo::trusted_passthrough(&event.source);
                            warn!(
                                "Passing through {} event for {} with unresolvable city {:?}",
                                event.source, event.artist, event.city
                            );
                            kept.push(event);
                        } else {
                            metrics::geo::record_dropped();
                            debug!(
                                "Dropped {} at {} ({}): city unknown to reference data",
                                event.artist, event.venue, event.city
                            );
                        }
                    }
                },
            }
        }
        kept
    }
}

fn exact_lookup(
    index: &CityIndex,
    key: &str,
    preferred: &BTreeSet<CountryCode>,
) -> Option<CountryCode> {
    let countries = index.by_city.get(key)?;
    pick_country(countries, preferred)
}

/// Scans stored names extending `key` by up to [`MAX_PREFIX_EXTENSION`]
/// chars and keeps those whose extension reads like a real city suffix.
fn prefix_lookup(
    index: &CityIndex,
    key: &str,
    preferred: &BTreeSet<CountryCode>,
) -> Option<CountryCode> {
    let start = index.names.partition_point(|name| name.as_str() < key);
    let mut fallback: Option<CountryCode> = None;
    for name in &index.names[start..] {
        if !name.starts_with(key) {
            break;
        }
        let extension = &name[key.len()..];
        if extension.is_empty()
            || extension.chars().count() > MAX_PREFIX_EXTENSION
            || !plausible_suffix(extension)
        {
            continue;
        }
        if let Some(countries) = index.by_city.get(name) {
            if let Some(hit) = countries.iter().find(|c| preferred.contains(*c)) {
                return Some(hit.clone());
            }
            if fallback.is_none() {
                fallback = countries.first().cloned();
            }
        }
    }
    fallback
}

/// An extension passes when it is a known suffix, or short and starting
/// with a vowel, or longer and containing one. "ral" fails all three, so
/// "Rome" can never reach "Romeral".
fn plausible_suffix(extension: &str) -> bool {
    if SUFFIX_ALLOW_LIST.contains(&extension) {
        return true;
    }
    let mut chars = extension.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    let len = 1 + chars.count();
    if len <= 3 {
        return is_vowel(first);
    }
    extension.chars().any(is_vowel)
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

fn pick_country(
    countries: &[CountryCode],
    preferred: &BTreeSet<CountryCode>,
) -> Option<CountryCode> {
    countries
        .iter()
        .find(|c| preferred.contains(*c))
        .or_else(|| countries.first())
        .cloned()
}
