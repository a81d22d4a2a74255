//! Artist search against a MusicBrainz-style catalog.
//!
//! The catalog speaks Lucene query syntax. Queries are shaped per
//! [`SearchScope`] and special characters are escaped in a single pass over
//! the input. The service requires a meaningful User-Agent.

use crate::apis::{CatalogHit, CatalogSearch, SearchScope};
use crate::config::CatalogConfig;
use crate::error::{AggregatorError, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Characters with meaning in the catalog's query syntax.
const QUERY_SPECIALS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
    '/',
];

pub struct MusicbrainzCatalog {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl MusicbrainzCatalog {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

fn build_query(query: &str, scope: SearchScope) -> String {
    let escaped = escape_query(query);
    match scope {
        SearchScope::QuotedPhrase => format!("\"{escaped}\""),
        SearchScope::ArtistField => format!("artist:({escaped})"),
        SearchScope::Basic => escaped,
    }
}

fn escape_query(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if QUERY_SPECIALS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn year_of(life_span: &Value, field: &str) -> Option<i32> {
    life_span[field]
        .as_str()
        .and_then(|date| date.split('-').next())
        .and_then(|year| year.parse().ok())
}

fn hit_from_value(artist: &Value) -> Result<CatalogHit> {
    let name = artist["name"]
        .as_str()
        .ok_or_else(|| AggregatorError::MissingField("artist name not found".into()))?;
    Ok(CatalogHit {
        id: artist["id"].as_str().map(str::to_string),
        name: name.to_string(),
        kind: artist["type"].as_str().map(str::to_string),
        country: artist["country"].as_str().map(str::to_string),
        disambiguation: artist["disambiguation"].as_str().map(str::to_string),
        begin_year: year_of(&artist["life-span"], "begin"),
        end_year: year_of(&artist["life-span"], "end"),
        score: artist["score"].as_i64().unwrap_or(0),
    })
}

#[async_trait::async_trait]
impl CatalogSearch for MusicbrainzCatalog {
    #[instrument(skip(self))]
    async fn search_artists(
        &self,
        query: &str,
        scope: SearchScope,
        limit: usize,
    ) -> Result<Vec<CatalogHit>> {
        let lucene = build_query(query, scope);
        debug!("Catalog query: {}", lucene);

        let limit_param = limit.to_string();
        let response = self
            .client
            .get(format!("{}/artist", self.base_url))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("query", lucene.as_str()),
                ("fmt", "json"),
                ("limit", limit_param.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let data: Value = response.json().await?;
        let artists = data["artists"]
            .as_array()
            .ok_or_else(|| AggregatorError::MissingField("artists not found".into()))?;

        let mut hits = Vec::with_capacity(artists.len());
        for artist in artists {
            match hit_from_value(artist) {
                Ok(hit) => hits.push(hit),
                Err(e) => warn!("Skipping malformed catalog entry: {}", e),
            }
        }
        debug!("Catalog returned {} hits for {:?} search", hits.len(), scope);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quoted_scope_wraps_the_whole_phrase() {
        assert_eq!(
            build_query("Boards of Canada", SearchScope::QuotedPhrase),
            "\"Boards of Canada\""
        );
    }

    #[test]
    fn artist_scope_wraps_in_field_group() {
        assert_eq!(
            build_query("Sigur Rós", SearchScope::ArtistField),
            "artist:(Sigur Rós)"
        );
    }

    #[test]
    fn specials_are_escaped_once_in_one_pass() {
        assert_eq!(build_query("AC/DC", SearchScope::Basic), "AC\\/DC");
        assert_eq!(build_query("1+1=2?", SearchScope::Basic), "1\\+1=2\\?");
        assert_eq!(
            build_query("The \"Chirping\" Crickets", SearchScope::QuotedPhrase),
            "\"The \\\"Chirping\\\" Crickets\""
        );
    }

    #[test]
    fn hit_parses_life_span_years() {
        let artist = json!({
            "id": "mb-1",
            "name": "Pixies",
            "type": "Group",
            "country": "US",
            "disambiguation": "Boston rock band",
            "score": 98,
            "life-span": { "begin": "1986-01", "end": "2013-06-09" }
        });
        let hit = hit_from_value(&artist).unwrap();
        assert_eq!(hit.id.as_deref(), Some("mb-1"));
        assert_eq!(hit.kind.as_deref(), Some("Group"));
        assert_eq!(hit.begin_year, Some(1986));
        assert_eq!(hit.end_year, Some(2013));
        assert_eq!(hit.score, 98);
    }

    #[test]
    fn hit_tolerates_sparse_entries() {
        let artist = json!({ "name": "Unknown Artist" });
        let hit = hit_from_value(&artist).unwrap();
        assert_eq!(hit.id, None);
        assert_eq!(hit.begin_year, None);
        assert_eq!(hit.score, 0);
    }

    #[test]
    fn hit_without_name_is_an_error() {
        let artist = json!({ "id": "mb-2", "score": 50 });
        assert!(hit_from_value(&artist).is_err());
    }
}
