//! Bandsintown-style artist events provider.
//!
//! Events arrive as a JSON array per artist. The venue country comes back
//! as a full country name rather than an ISO code, so records from here
//! usually rely on city-based inference downstream.

use crate::apis::EventProvider;
use crate::config::BandsintownConfig;
use crate::constants::BANDSINTOWN_SOURCE;
use crate::domain::{CountryCode, EventRecord};
use crate::error::{AggregatorError, Result};
use chrono::NaiveDateTime;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub struct BandsintownProvider {
    client: reqwest::Client,
    base_url: String,
    app_id_env: String,
    timeout: Duration,
}

impl BandsintownProvider {
    pub fn new(config: &BandsintownConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            app_id_env: config.app_id_env.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    fn app_id(&self) -> String {
        std::env::var(&self.app_id_env).unwrap_or_else(|_| {
            debug!("{} not set, using default app id", self.app_id_env);
            "gigwire".to_string()
        })
    }
}

fn build_events_url(base_url: &str, artist: &str, app_id: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| AggregatorError::Config(format!("Invalid events base URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| AggregatorError::Config("Events base URL cannot hold a path".into()))?
        .pop_if_empty()
        .extend(["artists", artist, "events"]);
    url.query_pairs_mut()
        .append_pair("app_id", app_id)
        .append_pair("date", "upcoming");
    Ok(url)
}

fn record_from_value(event: &Value, queried_artist: &str) -> Result<EventRecord> {
    let venue = &event["venue"];
    let venue_name = venue["name"]
        .as_str()
        .ok_or_else(|| AggregatorError::MissingField("venue name not found".into()))?;
    let datetime_str = event["datetime"]
        .as_str()
        .ok_or_else(|| AggregatorError::MissingField("datetime not found".into()))?;
    let datetime = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| AggregatorError::Api {
            message: format!("Failed to parse datetime: {e}"),
        })?;

    let artist = event["lineup"][0]
        .as_str()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(queried_artist);
    let city = venue["city"].as_str().unwrap_or("");

    let mut record = EventRecord::new(
        artist,
        venue_name,
        city,
        datetime.date(),
        BANDSINTOWN_SOURCE,
    )
    .with_time(datetime.time());

    // Full country names fail the code parse and stay None on purpose.
    if let Some(country) = venue["country"].as_str() {
        if let Ok(code) = CountryCode::parse(country) {
            record = record.with_country(code);
        }
    }
    if let Some(url) = event["url"].as_str() {
        record = record.with_url(url);
    }
    Ok(record)
}

#[async_trait::async_trait]
impl EventProvider for BandsintownProvider {
    fn source_id(&self) -> &'static str {
        BANDSINTOWN_SOURCE
    }

    #[instrument(skip(self))]
    async fn fetch_events(&self, artist: &str) -> Result<Vec<EventRecord>> {
        let url = build_events_url(&self.base_url, artist, &self.app_id())?;
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let data: Value = response.json().await?;
        if let Some(message) = data["errorMessage"].as_str() {
            return Err(AggregatorError::Api {
                message: message.to_string(),
            });
        }
        let events = data
            .as_array()
            .ok_or_else(|| AggregatorError::MissingField("event array not found".into()))?;

        let mut records = Vec::with_capacity(events.len());
        for event in events {
            match record_from_value(event, artist) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed event for {}: {}", artist, e),
            }
        }
        debug!("Fetched {} events for {}", records.len(), artist);
        Ok(records)
    }
}
