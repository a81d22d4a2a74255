use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use gigwire::aggregator::Aggregator;
use gigwire::apis::countriesnow::CountriesNowClient;
use gigwire::apis::musicbrainz::MusicbrainzCatalog;
use gigwire::apis::{self, CatalogSearch, EventProvider, GeoReference};
use gigwire::config::Config;
use gigwire::constants;
use gigwire::db::SqliteStore;
use gigwire::dedup::Deduper;
use gigwire::domain::{Candidate, CountryCode, ResolvedArtist, UserGeoPreference};
use gigwire::geo::cache::GeoCache;
use gigwire::geo::GeoResolver;
use gigwire::logging;
use gigwire::observability::metrics;
use gigwire::resolver::{ArtistResolver, Resolution};
use gigwire::storage::ConcertStore;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "gigwire")]
#[command(about = "Concert data aggregator across catalog and ticketing services")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a free-text artist name against the music catalog
    Resolve {
        /// Artist name to look up
        name: String,
    },
    /// Fetch, filter and store upcoming events for an artist
    Sync {
        /// Artist name to sync
        name: String,
        /// Specific providers to query (comma-separated). Available: bandsintown, ticketmaster
        #[arg(long)]
        providers: Option<String>,
        /// Only keep events in these countries (comma-separated ISO codes)
        #[arg(long)]
        countries: Option<String>,
    },
    /// Re-download the country and city reference data
    RefreshGeo,
    /// Report which country a city name resolves to
    LookupCity {
        /// City name to look up
        city: String,
        /// Preferred countries for tie-breaking (comma-separated ISO codes)
        #[arg(long)]
        countries: Option<String>,
    },
}

fn build_providers(selection: Option<&str>, config: &Config) -> Vec<Arc<dyn EventProvider>> {
    let names: Vec<String> = match selection {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => constants::supported_providers()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    let mut providers: Vec<Arc<dyn EventProvider>> = Vec::new();
    for name in &names {
        match apis::create_provider(name, config) {
            Some(provider) => providers.push(Arc::from(provider)),
            None => {
                warn!("Unknown provider specified");
                println!("⚠️  Unknown provider: {}", name);
            }
        }
    }
    providers
}

/// Providers that report trustworthy country codes extend the configured
/// trusted-source list, so their events survive an unresolvable city.
fn build_geo(
    config: &Config,
    providers: &[Arc<dyn EventProvider>],
) -> anyhow::Result<Arc<GeoResolver>> {
    let cache = GeoCache::open_at(&config.data_dir)?;
    let reference: Arc<dyn GeoReference> = Arc::new(CountriesNowClient::new(&config.geo));

    let mut trusted = config.geo.trusted_sources.clone();
    for provider in providers {
        if provider.country_reliable() && !trusted.iter().any(|s| s == provider.source_id()) {
            trusted.push(provider.source_id().to_string());
        }
    }

    Ok(Arc::new(GeoResolver::new(
        cache,
        reference,
        config.geo.ttl_days,
        trusted,
    )?))
}

fn parse_preference(raw: Option<&str>) -> anyhow::Result<Option<UserGeoPreference>> {
    let Some(list) = raw else {
        return Ok(None);
    };
    let mut codes = Vec::new();
    for part in list.split(',') {
        codes.push(CountryCode::parse(part)?);
    }
    Ok(Some(UserGeoPreference::new(codes)?))
}

fn describe(candidate: &Candidate) -> String {
    let mut line = candidate.name.clone();
    let mut notes: Vec<String> = Vec::new();
    if let Some(country) = &candidate.country {
        notes.push(country.clone());
    }
    if let Some(begin) = candidate.begin_year {
        match candidate.end_year {
            Some(end) => notes.push(format!("{}-{}", begin, end)),
            None => notes.push(format!("since {}", begin)),
        }
    }
    if let Some(extra) = &candidate.disambiguation {
        notes.push(extra.clone());
    }
    if !notes.is_empty() {
        line.push_str(&format!(" ({})", notes.join(", ")));
    }
    line
}

/// Finds the artist in the store or resolves and creates it. Ambiguous and
/// unmatched names come back as `None` after telling the user why.
async fn ensure_artist(
    store: &dyn ConcertStore,
    resolver: &ArtistResolver,
    name: &str,
) -> anyhow::Result<Option<ResolvedArtist>> {
    if let Some(existing) = store.find_artist_by_name(name).await? {
        info!("Artist '{}' already followed", existing.name);
        return Ok(Some(existing));
    }

    match resolver.resolve(name).await {
        Resolution::AutoAccepted(candidate) => {
            if let Some(id) = &candidate.catalog_id {
                if let Some(existing) = store.find_artist_by_catalog_id(id).await? {
                    info!("Catalog id {} already followed as '{}'", id, existing.name);
                    return Ok(Some(existing));
                }
            }
            let mut artist = ResolvedArtist::from_candidate(&candidate);
            store.create_artist(&mut artist).await?;
            println!("✅ Resolved '{}' to {}", name, describe(&candidate));
            Ok(Some(artist))
        }
        Resolution::NeedsDisambiguation(candidates) => {
            println!("🤔 '{}' is ambiguous. Candidates:", name);
            for candidate in &candidates {
                println!("   - {}", describe(candidate));
            }
            println!("   Re-run with the exact name of the artist you meant.");
            Ok(None)
        }
        Resolution::NotFound => {
            println!("❌ No catalog match for '{}'", name);
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();
    let config = Config::load_or_default();

    match cli.command {
        Commands::Resolve { name } => {
            println!("🔎 Resolving '{}'...", name);

            let catalog: Arc<dyn CatalogSearch> =
                Arc::new(MusicbrainzCatalog::new(&config.catalog));
            let resolver = ArtistResolver::new(catalog);

            match resolver.resolve(&name).await {
                Resolution::AutoAccepted(candidate) => {
                    println!("✅ {}", describe(&candidate));
                    if let Some(id) = &candidate.catalog_id {
                        println!("   Catalog id: {}", id);
                    }
                }
                Resolution::NeedsDisambiguation(candidates) => {
                    println!("🤔 {} candidates:", candidates.len());
                    for candidate in &candidates {
                        println!("   - {}", describe(candidate));
                    }
                }
                Resolution::NotFound => {
                    println!("❌ No catalog match for '{}'", name);
                }
            }
        }
        Commands::Sync {
            name,
            providers,
            countries,
        } => {
            println!("🚀 Syncing events for '{}'...", name);

            let preference = parse_preference(countries.as_deref())?;
            let providers = build_providers(providers.as_deref(), &config);
            if providers.is_empty() {
                println!("❌ No usable providers selected");
                return Ok(());
            }

            let store: Arc<dyn ConcertStore> = Arc::new(SqliteStore::open_at(&config.data_dir)?);
            let catalog: Arc<dyn CatalogSearch> =
                Arc::new(MusicbrainzCatalog::new(&config.catalog));
            let resolver = ArtistResolver::new(catalog);

            let Some(artist) = ensure_artist(store.as_ref(), &resolver, &name).await? else {
                return Ok(());
            };

            let geo = build_geo(&config, &providers)?;
            let aggregator = Aggregator::new(providers, Deduper::new(store), geo);

            match aggregator.sync_artist(&artist, preference.as_ref()).await {
                Ok(summary) => {
                    println!("\n📊 Sync results for {}:", summary.artist);
                    println!("   Fetched: {}", summary.fetched);
                    println!("   Kept after filtering: {}", summary.kept);
                    println!("   New events: {}", summary.new_events);
                    println!("   Duplicates: {}", summary.duplicates);
                    for outcome in &summary.outcomes {
                        println!(
                            "   [{}] fetched {}, kept {}, new {}, duplicates {} ({})",
                            outcome.source,
                            outcome.fetched,
                            outcome.kept,
                            outcome.new_events,
                            outcome.duplicates,
                            outcome.status
                        );
                    }
                }
                Err(e) => {
                    error!("Sync failed: {}", e);
                    println!("❌ Sync failed: {}", e);
                }
            }
        }
        Commands::RefreshGeo => {
            println!("🌍 Refreshing country and city reference data...");

            let geo = build_geo(&config, &[])?;
            match geo.refresh_now().await {
                Ok((countries, cities)) => {
                    println!("✅ Cached {} countries and {} cities", countries, cities);
                }
                Err(e) => {
                    error!("Geo refresh failed: {}", e);
                    println!("❌ Geo refresh failed: {}", e);
                }
            }
        }
        Commands::LookupCity { city, countries } => {
            let preference = parse_preference(countries.as_deref())?;
            let geo = build_geo(&config, &[])?;
            geo.ensure_fresh().await?;

            let preferred = preference
                .as_ref()
                .map(|p| p.countries().clone())
                .unwrap_or_default();
            match geo.country_of(&city, &preferred) {
                Some(country) => println!("📍 {} is in {}", city, country),
                None => println!("❓ No country found for '{}'", city),
            }
        }
    }
    Ok(())
}
