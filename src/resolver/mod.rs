//! Artist resolution against the music catalog.
//!
//! A free-text query runs through a ladder of search strategies, the hits are
//! scored for query relevance, and the resolver either accepts one candidate,
//! returns a ranked shortlist for disambiguation, or reports not-found.
//! Catalog failures never escape: a dead catalog looks like an empty one,
//! with the difference carried by logs and counters.

pub mod scoring;

use crate::apis::{CatalogHit, CatalogSearch, SearchScope};
use crate::domain::{Candidate, EntityKind};
use crate::normalize::normalize_for_search;
use crate::observability::metrics;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of resolving a free-text artist query.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// One candidate was clearly right.
    AutoAccepted(Candidate),
    /// Ranked candidates for the caller to pick from.
    NeedsDisambiguation(Vec<Candidate>),
    /// Nothing usable came back from the catalog.
    NotFound,
}

/// One rung of the search ladder.
struct SearchPlan {
    scope: SearchScope,
    limit: usize,
    /// Added to the provider score of every hit this strategy returns;
    /// stricter strategies earn more trust.
    boost: i64,
    name: &'static str,
}

const SEARCH_LADDER: [SearchPlan; 3] = [
    SearchPlan {
        scope: SearchScope::QuotedPhrase,
        limit: 5,
        boost: 20,
        name: "quoted",
    },
    SearchPlan {
        scope: SearchScope::ArtistField,
        limit: 5,
        boost: 10,
        name: "artist_field",
    },
    SearchPlan {
        scope: SearchScope::Basic,
        limit: 8,
        boost: 0,
        name: "basic",
    },
];

/// Skip the remaining (broader) strategies once this many raw candidates
/// have been gathered.
const ENOUGH_RAW_CANDIDATES: usize = 10;

pub struct ArtistResolver {
    catalog: Arc<dyn CatalogSearch>,
}

impl ArtistResolver {
    pub fn new(catalog: Arc<dyn CatalogSearch>) -> Self {
        Self { catalog }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, query: &str) -> Resolution {
        metrics::resolver::search_started();

        let trimmed = query.trim();
        if trimmed.is_empty() {
            warn!("Refusing to resolve an empty artist query");
            metrics::resolver::not_found();
            return Resolution::NotFound;
        }
        let query_norm = normalize_for_search(trimmed);

        let raw = self.gather_candidates(trimmed).await;
        if raw.is_empty() {
            info!("No candidates for '{}'", trimmed);
            metrics::resolver::not_found();
            return Resolution::NotFound;
        }

        let pool = select_pool(&query_norm, raw);
        decide(pool)
    }

    /// Run the search ladder, deduplicating by catalog id. The first strategy
    /// to return an id wins, so its boost sticks.
    async fn gather_candidates(&self, query: &str) -> Vec<Candidate> {
        let mut raw: Vec<Candidate> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut strategies_run = 0usize;
        let mut strategies_failed = 0usize;

        for plan in &SEARCH_LADDER {
            strategies_run += 1;
            match self
                .catalog
                .search_artists(query, plan.scope, plan.limit)
                .await
            {
                Ok(hits) => {
                    debug!(strategy = plan.name, hits = hits.len(), "Strategy returned");
                    for hit in hits {
                        if let Some(id) = &hit.id {
                            if !seen_ids.insert(id.clone()) {
                                continue;
                            }
                        }
                        raw.push(candidate_from_hit(hit, plan.boost));
                    }
                }
                Err(e) => {
                    warn!(strategy = plan.name, "Search strategy failed: {}", e);
                    metrics::resolver::strategy_error(plan.name);
                    strategies_failed += 1;
                }
            }
            if raw.len() >= ENOUGH_RAW_CANDIDATES {
                debug!("Gathered enough candidates, skipping broader strategies");
                break;
            }
        }

        if raw.is_empty() && strategies_failed == strategies_run {
            // The caller sees an ordinary not-found; the log and counter are
            // what distinguish an outage from an empty catalog.
            error!("All search strategies failed; catalog unreachable");
            metrics::resolver::catalog_unreachable();
        }
        raw
    }
}

fn candidate_from_hit(hit: CatalogHit, boost: i64) -> Candidate {
    Candidate {
        catalog_id: hit.id,
        name: hit.name,
        kind: EntityKind::from_catalog_type(hit.kind.as_deref()),
        country: hit.country,
        disambiguation: hit.disambiguation,
        begin_year: hit.begin_year,
        end_year: hit.end_year,
        catalog_score: hit.score,
        provider_score: hit.score + boost,
        relevance: 0.0,
        combined_score: 0.0,
    }
}

/// Score the raw pool and pick the candidates worth showing: relevance floor
/// first, rescue floor second, catalog's own favorites as the last resort.
fn select_pool(query_norm: &str, raw: Vec<Candidate>) -> Vec<Candidate> {
    let mut scored: Vec<Candidate> = Vec::new();
    for candidate in &raw {
        if let Some(rel) = scoring::relevance(
            query_norm,
            &candidate.name,
            candidate.kind,
            candidate.begin_year,
        ) {
            let mut c = candidate.clone();
            c.relevance = rel;
            c.combined_score = scoring::combined(rel, c.provider_score);
            scored.push(c);
        }
    }

    let threshold = scoring::pool_threshold(scored.len());
    let mut pool: Vec<Candidate> = scored
        .iter()
        .filter(|c| c.relevance >= threshold)
        .cloned()
        .collect();
    if pool.is_empty() {
        debug!("No candidate above {threshold}, retrying at the rescue floor");
        pool = scored
            .iter()
            .filter(|c| c.relevance >= scoring::RESCUE_THRESHOLD)
            .cloned()
            .collect();
    }
    rank(&mut pool);
    pool.truncate(scoring::MAX_RANKED);

    if pool.is_empty() {
        // Relevance filtering ate everything; surface the catalog's own
        // ranking instead of pretending there were no hits. Strategy boosts
        // do not apply here, only the score the catalog itself assigned.
        debug!("Falling back to raw catalog-score order");
        let mut by_catalog = raw;
        by_catalog.sort_by(|a, b| {
            b.catalog_score
                .cmp(&a.catalog_score)
                .then_with(|| a.name.cmp(&b.name))
        });
        by_catalog.truncate(scoring::PROVIDER_FALLBACK_COUNT);
        for c in &mut by_catalog {
            c.combined_score = scoring::combined(c.relevance, c.provider_score);
        }
        pool = by_catalog;
    }

    metrics::resolver::candidates_ranked(pool.len());
    pool
}

fn rank(pool: &mut [Candidate]) {
    pool.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.provider_score.cmp(&a.provider_score))
            .then_with(|| a.name.cmp(&b.name))
    });
}

fn decide(mut pool: Vec<Candidate>) -> Resolution {
    match pool.len() {
        0 => {
            metrics::resolver::not_found();
            Resolution::NotFound
        }
        1 => {
            let only = pool.remove(0);
            info!("Auto-accepting sole candidate '{}'", only.name);
            metrics::resolver::auto_accepted();
            Resolution::AutoAccepted(only)
        }
        _ => {
            let lead = pool[0].combined_score - pool[1].combined_score;
            if pool[0].relevance >= scoring::AUTO_ACCEPT_MIN_RELEVANCE
                && lead >= scoring::AUTO_ACCEPT_MIN_LEAD
            {
                let top = pool.remove(0);
                info!(
                    "Auto-accepting '{}' (relevance {:.0}, lead {:.1})",
                    top.name, top.relevance, lead
                );
                metrics::resolver::auto_accepted();
                Resolution::AutoAccepted(top)
            } else {
                info!("{} candidates need disambiguation", pool.len());
                metrics::resolver::needs_disambiguation();
                Resolution::NeedsDisambiguation(pool)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AggregatorError, Result};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubCatalog {
        quoted: Vec<CatalogHit>,
        artist_field: Vec<CatalogHit>,
        basic: Vec<CatalogHit>,
        fail_quoted: bool,
        fail_artist_field: bool,
        fail_basic: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait::async_trait]
    impl CatalogSearch for StubCatalog {
        async fn search_artists(
            &self,
            _query: &str,
            scope: SearchScope,
            limit: usize,
        ) -> Result<Vec<CatalogHit>> {
            let (hits, fail, tag) = match scope {
                SearchScope::QuotedPhrase => (&self.quoted, self.fail_quoted, "quoted"),
                SearchScope::ArtistField => (&self.artist_field, self.fail_artist_field, "artist_field"),
                SearchScope::Basic => (&self.basic, self.fail_basic, "basic"),
            };
            self.calls.lock().unwrap().push(tag);
            if fail {
                return Err(AggregatorError::Api {
                    message: "catalog down".to_string(),
                });
            }
            Ok(hits.iter().take(limit).cloned().collect())
        }
    }

    fn hit(id: &str, name: &str, score: i64) -> CatalogHit {
        CatalogHit {
            id: Some(id.to_string()),
            name: name.to_string(),
            kind: Some("Group".to_string()),
            country: Some("US".to_string()),
            disambiguation: None,
            begin_year: Some(1990),
            end_year: None,
            score,
        }
    }

    fn resolver(stub: StubCatalog) -> ArtistResolver {
        ArtistResolver::new(Arc::new(stub))
    }

    #[tokio::test]
    async fn sole_exact_candidate_is_auto_accepted() {
        let resolver = resolver(StubCatalog {
            quoted: vec![hit("mb1", "Radiohead", 100)],
            ..Default::default()
        });

        match resolver.resolve("Radiohead").await {
            Resolution::AutoAccepted(candidate) => {
                assert_eq!(candidate.name, "Radiohead");
                assert_eq!(candidate.provider_score, 120); // quoted boost
                assert_eq!(candidate.relevance, 100.0);
            }
            other => panic!("expected auto-accept, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clear_leader_is_auto_accepted() {
        let resolver = resolver(StubCatalog {
            quoted: vec![
                hit("mb1", "Metallica", 98),
                hit("mb2", "Metallica & Friends", 70),
            ],
            ..Default::default()
        });

        match resolver.resolve("Metallica").await {
            Resolution::AutoAccepted(candidate) => {
                assert_eq!(candidate.catalog_id.as_deref(), Some("mb1"));
                assert_eq!(candidate.relevance, 100.0);
            }
            other => panic!("expected auto-accept, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn punctuated_catalog_name_auto_accepts() {
        // "Guns N' Roses" and "guns n roses" are the same name once symbols
        // become spaces; the decoy shares only one word.
        let resolver = resolver(StubCatalog {
            quoted: vec![hit("mb1", "Guns N' Roses", 95), hit("mb2", "Roses", 90)],
            ..Default::default()
        });

        match resolver.resolve("guns n roses").await {
            Resolution::AutoAccepted(candidate) => {
                assert_eq!(candidate.catalog_id.as_deref(), Some("mb1"));
                assert_eq!(candidate.relevance, 100.0);
            }
            other => panic!("expected auto-accept, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn near_tie_needs_disambiguation() {
        // Two exact-name homonyms with close catalog scores.
        let resolver = resolver(StubCatalog {
            quoted: vec![hit("mb1", "Nirvana", 97), hit("mb2", "Nirvana", 95)],
            ..Default::default()
        });

        match resolver.resolve("Nirvana").await {
            Resolution::NeedsDisambiguation(pool) => {
                assert_eq!(pool.len(), 2);
                assert_eq!(pool[0].catalog_id.as_deref(), Some("mb1"));
                assert!(pool[0].combined_score >= pool[1].combined_score);
            }
            other => panic!("expected disambiguation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_hits_resolve_to_not_found() {
        let resolver = resolver(StubCatalog::default());
        assert!(matches!(
            resolver.resolve("does not exist").await,
            Resolution::NotFound
        ));
    }

    #[tokio::test]
    async fn catalog_outage_resolves_to_not_found() {
        let resolver = resolver(StubCatalog {
            fail_quoted: true,
            fail_artist_field: true,
            fail_basic: true,
            ..Default::default()
        });
        assert!(matches!(
            resolver.resolve("Radiohead").await,
            Resolution::NotFound
        ));
    }

    #[tokio::test]
    async fn failing_strategy_falls_through_to_next() {
        let resolver = resolver(StubCatalog {
            fail_quoted: true,
            artist_field: vec![hit("mb1", "Portishead", 100)],
            ..Default::default()
        });

        match resolver.resolve("Portishead").await {
            Resolution::AutoAccepted(candidate) => {
                assert_eq!(candidate.provider_score, 110); // artist-field boost
            }
            other => panic!("expected auto-accept, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_catalog_ids_keep_first_sighting() {
        let resolver = resolver(StubCatalog {
            quoted: vec![hit("mb1", "Foals", 90)],
            artist_field: vec![hit("mb1", "Foals", 90)],
            ..Default::default()
        });

        match resolver.resolve("Foals").await {
            Resolution::AutoAccepted(candidate) => {
                // The quoted-strategy boost sticks; the later hit is dropped.
                assert_eq!(candidate.provider_score, 110);
            }
            other => panic!("expected auto-accept, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enough_candidates_skip_broader_strategies() {
        let quoted: Vec<CatalogHit> = (0..5)
            .map(|i| hit(&format!("q{i}"), &format!("The Fall {i}"), 90 - i as i64))
            .collect();
        let artist_field: Vec<CatalogHit> = (0..5)
            .map(|i| hit(&format!("a{i}"), &format!("The Fall {i} Band"), 80 - i as i64))
            .collect();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let stub = StubCatalog {
            quoted,
            artist_field,
            calls: calls.clone(),
            ..Default::default()
        };
        let resolver = ArtistResolver::new(Arc::new(stub));

        let _ = resolver.resolve("The Fall").await;

        let log = calls.lock().unwrap();
        assert!(log.contains(&"quoted"));
        assert!(log.contains(&"artist_field"));
        assert!(!log.contains(&"basic"), "basic strategy should be skipped");
    }

    #[tokio::test]
    async fn no_relevance_survivors_fall_back_to_catalog_order() {
        let resolver = resolver(StubCatalog {
            quoted: vec![
                hit("mb1", "Depeche Mode", 80),
                hit("mb2", "New Order", 70),
                hit("mb3", "Pet Shop Boys", 60),
                hit("mb4", "Erasure", 50),
            ],
            ..Default::default()
        });

        match resolver.resolve("Kraftwerk").await {
            Resolution::NeedsDisambiguation(pool) => {
                assert_eq!(pool.len(), scoring::PROVIDER_FALLBACK_COUNT);
                assert_eq!(pool[0].catalog_id.as_deref(), Some("mb1"));
                assert_eq!(pool[1].catalog_id.as_deref(), Some("mb2"));
                assert_eq!(pool[2].catalog_id.as_deref(), Some("mb3"));
            }
            other => panic!("expected catalog-order fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallback_order_ignores_strategy_boosts() {
        // The quoted hit's boosted score (70 + 20) would beat the basic
        // hit's 85; the raw catalog scores order them the other way.
        let resolver = resolver(StubCatalog {
            quoted: vec![hit("mb1", "Alpha Beta", 70)],
            basic: vec![hit("mb2", "Gamma Delta", 85)],
            ..Default::default()
        });

        match resolver.resolve("Kraftwerk").await {
            Resolution::NeedsDisambiguation(pool) => {
                assert_eq!(pool.len(), 2);
                assert_eq!(pool[0].catalog_id.as_deref(), Some("mb2"));
                assert_eq!(pool[1].catalog_id.as_deref(), Some("mb1"));
            }
            other => panic!("expected catalog-order fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_query_is_not_found_without_search() {
        let resolver = resolver(StubCatalog {
            fail_quoted: true,
            fail_artist_field: true,
            fail_basic: true,
            ..Default::default()
        });
        assert!(matches!(resolver.resolve("   ").await, Resolution::NotFound));
    }
}
