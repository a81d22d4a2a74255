//! Metrics for the aggregation pipeline.
//!
//! All metric names live in one enum so there are no magic strings at call
//! sites, and each pipeline phase exposes small helper functions wrapping the
//! `metrics` macros.

use std::fmt;
use std::net::SocketAddr;

/// Every metric the crate records, with Prometheus-convention names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Resolver metrics
    ResolverSearches,
    ResolverStrategyErrors,
    ResolverCatalogUnreachable,
    ResolverAutoAccepted,
    ResolverDisambiguations,
    ResolverNotFound,
    ResolverCandidatesRanked,

    // Provider metrics
    ProviderFetchSuccess,
    ProviderFetchError,
    ProviderFetchDuration,
    ProviderEventsFetched,

    // Geo metrics
    GeoRefreshSuccess,
    GeoRefreshError,
    GeoServedStale,
    GeoLookupExact,
    GeoLookupVariant,
    GeoLookupPrefix,
    GeoLookupMiss,
    GeoRecordsBackfilled,
    GeoRecordsDropped,
    GeoTrustedPassthrough,

    // Dedup metrics
    DedupEventsNew,
    DedupEventsDuplicate,
    DedupIdentityCollisions,

    // Aggregation metrics
    AggregateRuns,
    AggregateDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ResolverSearches => "gw_resolver_searches_total",
            MetricName::ResolverStrategyErrors => "gw_resolver_strategy_errors_total",
            MetricName::ResolverCatalogUnreachable => "gw_resolver_catalog_unreachable_total",
            MetricName::ResolverAutoAccepted => "gw_resolver_auto_accepted_total",
            MetricName::ResolverDisambiguations => "gw_resolver_disambiguations_total",
            MetricName::ResolverNotFound => "gw_resolver_not_found_total",
            MetricName::ResolverCandidatesRanked => "gw_resolver_candidates_ranked",

            MetricName::ProviderFetchSuccess => "gw_provider_fetch_success_total",
            MetricName::ProviderFetchError => "gw_provider_fetch_error_total",
            MetricName::ProviderFetchDuration => "gw_provider_fetch_duration_seconds",
            MetricName::ProviderEventsFetched => "gw_provider_events_fetched_total",

            MetricName::GeoRefreshSuccess => "gw_geo_refresh_success_total",
            MetricName::GeoRefreshError => "gw_geo_refresh_error_total",
            MetricName::GeoServedStale => "gw_geo_served_stale_total",
            MetricName::GeoLookupExact => "gw_geo_lookup_exact_total",
            MetricName::GeoLookupVariant => "gw_geo_lookup_variant_total",
            MetricName::GeoLookupPrefix => "gw_geo_lookup_prefix_total",
            MetricName::GeoLookupMiss => "gw_geo_lookup_miss_total",
            MetricName::GeoRecordsBackfilled => "gw_geo_records_backfilled_total",
            MetricName::GeoRecordsDropped => "gw_geo_records_dropped_total",
            MetricName::GeoTrustedPassthrough => "gw_geo_trusted_passthrough_total",

            MetricName::DedupEventsNew => "gw_dedup_events_new_total",
            MetricName::DedupEventsDuplicate => "gw_dedup_events_duplicate_total",
            MetricName::DedupIdentityCollisions => "gw_dedup_identity_collisions_total",

            MetricName::AggregateRuns => "gw_aggregate_runs_total",
            MetricName::AggregateDuration => "gw_aggregate_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus exporter when `GIGWIRE_METRICS_PORT` semantics
/// apply; recording works (as a no-op) without it, so library users and tests
/// never need to call this.
pub fn init_metrics() {
    let port: u16 = std::env::var("GIGWIRE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            println!("[metrics] Prometheus exporter listening on http://{addr}/metrics");
        }
        Err(e) => {
            println!("[metrics] Prometheus exporter install failed (possibly already installed): {e}");
        }
    }
}

pub mod resolver {
    use super::MetricName;

    pub fn search_started() {
        ::metrics::counter!(MetricName::ResolverSearches.as_str()).increment(1);
    }

    /// One search strategy failed; the resolver continues with the rest.
    pub fn strategy_error(strategy: &'static str) {
        ::metrics::counter!(MetricName::ResolverStrategyErrors.as_str(), "strategy" => strategy)
            .increment(1);
    }

    /// Every strategy failed for one query.
    pub fn catalog_unreachable() {
        ::metrics::counter!(MetricName::ResolverCatalogUnreachable.as_str()).increment(1);
    }

    pub fn auto_accepted() {
        ::metrics::counter!(MetricName::ResolverAutoAccepted.as_str()).increment(1);
    }

    pub fn needs_disambiguation() {
        ::metrics::counter!(MetricName::ResolverDisambiguations.as_str()).increment(1);
    }

    pub fn not_found() {
        ::metrics::counter!(MetricName::ResolverNotFound.as_str()).increment(1);
    }

    pub fn candidates_ranked(count: usize) {
        ::metrics::histogram!(MetricName::ResolverCandidatesRanked.as_str()).record(count as f64);
    }
}

pub mod providers {
    use super::MetricName;

    pub fn fetch_success(source: &str) {
        ::metrics::counter!(MetricName::ProviderFetchSuccess.as_str(), "source" => source.to_string())
            .increment(1);
    }

    pub fn fetch_error(source: &str) {
        ::metrics::counter!(MetricName::ProviderFetchError.as_str(), "source" => source.to_string())
            .increment(1);
    }

    pub fn fetch_duration(source: &str, secs: f64) {
        ::metrics::histogram!(MetricName::ProviderFetchDuration.as_str(), "source" => source.to_string())
            .record(secs);
    }

    pub fn events_fetched(source: &str, count: usize) {
        ::metrics::counter!(MetricName::ProviderEventsFetched.as_str(), "source" => source.to_string())
            .increment(count as u64);
    }
}

pub mod geo {
    use super::MetricName;

    pub fn refresh_success() {
        ::metrics::counter!(MetricName::GeoRefreshSuccess.as_str()).increment(1);
    }

    pub fn refresh_error() {
        ::metrics::counter!(MetricName::GeoRefreshError.as_str()).increment(1);
    }

    /// A lookup ran on rows past their TTL because refresh failed.
    pub fn served_stale() {
        ::metrics::counter!(MetricName::GeoServedStale.as_str()).increment(1);
    }

    pub fn lookup_exact() {
        ::metrics::counter!(MetricName::GeoLookupExact.as_str()).increment(1);
    }

    pub fn lookup_variant() {
        ::metrics::counter!(MetricName::GeoLookupVariant.as_str()).increment(1);
    }

    pub fn lookup_prefix() {
        ::metrics::counter!(MetricName::GeoLookupPrefix.as_str()).increment(1);
    }

    pub fn lookup_miss() {
        ::metrics::counter!(MetricName::GeoLookupMiss.as_str()).increment(1);
    }

    pub fn record_backfilled() {
        ::metrics::counter!(MetricName::GeoRecordsBackfilled.as_str()).increment(1);
    }

    pub fn record_dropped() {
        ::metrics::counter!(MetricName::GeoRecordsDropped.as_str()).increment(1);
    }

    pub fn trusted_passthrough(source: &str) {
        ::metrics::counter!(MetricName::GeoTrustedPassthrough.as_str(), "source" => source.to_string())
            .increment(1);
    }
}

pub mod dedup {
    use super::MetricName;

    pub fn event_new(source: &str) {
        ::metrics::counter!(MetricName::DedupEventsNew.as_str(), "source" => source.to_string())
            .increment(1);
    }

    pub fn event_duplicate(source: &str) {
        ::metrics::counter!(MetricName::DedupEventsDuplicate.as_str(), "source" => source.to_string())
            .increment(1);
    }

    pub fn identity_collision() {
        ::metrics::counter!(MetricName::DedupIdentityCollisions.as_str()).increment(1);
    }
}

pub mod aggregate {
    use super::MetricName;

    pub fn run_started() {
        ::metrics::counter!(MetricName::AggregateRuns.as_str()).increment(1);
    }

    pub fn run_duration(secs: f64) {
        ::metrics::histogram!(MetricName::AggregateDuration.as_str()).record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_prometheus_conventions() {
        let counters = [
            MetricName::ResolverSearches,
            MetricName::ProviderFetchSuccess,
            MetricName::DedupEventsNew,
            MetricName::GeoLookupMiss,
        ];
        for metric in counters {
            assert!(metric.as_str().starts_with("gw_"));
            assert!(metric.as_str().ends_with("_total"));
        }
        assert!(MetricName::AggregateDuration.as_str().ends_with("_seconds"));
    }
}
