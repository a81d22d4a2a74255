use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use gigwire::apis::GeoReference;
use gigwire::domain::{
    CityEntry, CountryCode, CountryEntry, EventRecord, UserGeoPreference,
};
use gigwire::geo::cache::GeoCache;
use gigwire::geo::GeoResolver;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// Fixed reference dataset standing in for the countries service.
struct FixtureReference {
    countries: Vec<CountryEntry>,
    cities: HashMap<CountryCode, Vec<CityEntry>>,
    calls: AtomicUsize,
}

impl FixtureReference {
    fn new(entries: &[(&str, &str, &[&str])]) -> Self {
        let mut countries = Vec::new();
        let mut cities = HashMap::new();
        for (code, name, city_names) in entries {
            let code = CountryCode::parse(code).unwrap();
            countries.push(CountryEntry {
                code: code.clone(),
                name: name.to_string(),
                phone_code: None,
                currency: None,
            });
            let list: Vec<CityEntry> = city_names
                .iter()
                .map(|city| CityEntry {
                    name: city.to_string(),
                    country: code.clone(),
                    state: None,
                    latitude: None,
                    longitude: None,
                })
                .collect();
            cities.insert(code, list);
        }
        Self {
            countries,
            cities,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GeoReference for FixtureReference {
    async fn list_countries(&self) -> gigwire::error::Result<Vec<CountryEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.countries.clone())
    }

    async fn list_cities(&self, country: &CountryCode) -> gigwire::error::Result<Vec<CityEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.cities.get(country).cloned().unwrap_or_default())
    }
}

async fn resolver_with(
    reference: Arc<FixtureReference>,
    trusted: Vec<String>,
) -> Result<(TempDir, GeoResolver)> {
    let dir = tempdir()?;
    let cache = GeoCache::open_at(dir.path())?;
    let resolver = GeoResolver::new(cache, reference, 7, trusted)?;
    resolver.refresh_now().await?;
    Ok((dir, resolver))
}

fn event(artist: &str, city: &str, source: &str) -> EventRecord {
    EventRecord::new(
        artist,
        "Some Hall",
        city,
        NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        source,
    )
}

fn preference(codes: &[&str]) -> UserGeoPreference {
    UserGeoPreference::new(codes.iter().map(|c| CountryCode::parse(c).unwrap())).unwrap()
}

#[tokio::test]
async fn filtering_applies_explicit_inferred_and_trusted_rules() -> Result<()> {
    let reference = Arc::new(FixtureReference::new(&[
        ("DE", "Germany", &["Berlin", "Hamburg"]),
        ("FR", "France", &["Paris"]),
    ]));
    let (_dir, resolver) =
        resolver_with(reference, vec!["ticketmaster".to_string()]).await?;

    let de = CountryCode::parse("DE")?;
    let events = vec![
        // Explicit match stays, explicit mismatch drops.
        event("A", "Berlin", "bandsintown").with_country(de.clone()),
        event("B", "Paris", "bandsintown").with_country(CountryCode::parse("FR")?),
        // No country: inferred from the city.
        event("C", "Hamburg", "bandsintown"),
        event("D", "Paris", "bandsintown"),
        // Unknown city: trusted source passes, untrusted drops.
        event("E", "Atlantis", "ticketmaster"),
        event("F", "Atlantis", "bandsintown"),
    ];

    let kept = resolver.filter_by_country(events, Some(&preference(&["DE"])));
    let names: Vec<&str> = kept.iter().map(|e| e.artist.as_str()).collect();
    assert_eq!(names, vec!["A", "C", "E"]);

    // The inferred record was backfilled, the trusted one left untouched.
    assert_eq!(kept[1].country.as_ref(), Some(&de));
    assert!(kept[2].country.is_none());
    Ok(())
}

#[tokio::test]
async fn no_preference_is_a_passthrough() -> Result<()> {
    let reference = Arc::new(FixtureReference::new(&[("DE", "Germany", &["Berlin"])]));
    let (_dir, resolver) = resolver_with(reference, Vec::new()).await?;

    let events = vec![
        event("A", "Berlin", "bandsintown"),
        event("B", "Nowhere", "bandsintown"),
    ];
    let kept = resolver.filter_by_country(events.clone(), None);
    assert_eq!(kept, events);
    Ok(())
}

#[tokio::test]
async fn rome_resolves_to_italy_not_to_a_prefix_cousin() -> Result<()> {
    let reference = Arc::new(FixtureReference::new(&[
        ("IT", "Italy", &["Rome"]),
        ("ES", "Spain", &["Romeral"]),
    ]));
    let (_dir, resolver) = resolver_with(reference, Vec::new()).await?;

    // Even a preference for Spain cannot pull the lookup past the exact tier.
    let mut preferred = BTreeSet::new();
    preferred.insert(CountryCode::parse("ES")?);
    assert_eq!(
        resolver.country_of("Rome", &preferred),
        Some(CountryCode::parse("IT")?)
    );
    Ok(())
}

#[tokio::test]
async fn spelling_variants_reach_the_stored_name() -> Result<()> {
    let reference = Arc::new(FixtureReference::new(&[(
        "RU",
        "Russia",
        &["Saint Petersburg"],
    )]));
    let (_dir, resolver) = resolver_with(reference, Vec::new()).await?;

    assert_eq!(
        resolver.country_of("St. Petersburg", &BTreeSet::new()),
        Some(CountryCode::parse("RU")?)
    );
    Ok(())
}

#[tokio::test]
async fn abbreviated_stored_name_matches_the_full_spelling() -> Result<()> {
    // The stored name carries the abbreviation and its period; the query
    // spells the toponym out. Indexing strips the period, the variant tier
    // bridges the abbreviation.
    let reference = Arc::new(FixtureReference::new(&[(
        "RU",
        "Russia",
        &["St. Petersburg"],
    )]));
    let (_dir, resolver) = resolver_with(reference, Vec::new()).await?;

    assert_eq!(
        resolver.country_of("Saint Petersburg", &BTreeSet::new()),
        Some(CountryCode::parse("RU")?)
    );
    Ok(())
}

#[tokio::test]
async fn fresh_cache_answers_without_touching_the_reference() -> Result<()> {
    let reference = Arc::new(FixtureReference::new(&[("DE", "Germany", &["Berlin"])]));
    let (_dir, resolver) = resolver_with(reference.clone(), Vec::new()).await?;

    let after_refresh = reference.calls.load(Ordering::SeqCst);
    resolver.ensure_fresh().await?;
    resolver.country_of("Berlin", &BTreeSet::new());

    assert_eq!(reference.calls.load(Ordering::SeqCst), after_refresh);
    Ok(())
}
