//! Ticketmaster Discovery-style events provider.
//!
//! Venues here carry proper ISO country codes, so this source declares its
//! country data reliable and its records survive geo filtering even when a
//! city is missing from the reference cache.

use crate::apis::EventProvider;
use crate::config::TicketmasterConfig;
use crate::constants::TICKETMASTER_SOURCE;
use crate::domain::{CountryCode, EventRecord};
use crate::error::{AggregatorError, Result};
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Page size requested per artist.
const PAGE_SIZE: &str = "50";

pub struct TicketmasterProvider {
    client: reqwest::Client,
    base_url: String,
    api_key_env: String,
    timeout: Duration,
}

impl TicketmasterProvider {
    pub fn new(config: &TicketmasterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key_env: config.api_key_env.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

fn record_from_value(event: &Value, queried_artist: &str) -> Result<EventRecord> {
    let venue = &event["_embedded"]["venues"][0];
    let venue_name = venue["name"]
        .as_str()
        .ok_or_else(|| AggregatorError::MissingField("venue name not found".into()))?;
    let date_str = event["dates"]["start"]["localDate"]
        .as_str()
        .ok_or_else(|| AggregatorError::MissingField("localDate not found".into()))?;
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
        AggregatorError::Api {
            message: format!("Failed to parse localDate: {e}"),
        }
    })?;

    let artist = event["_embedded"]["attractions"][0]["name"]
        .as_str()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(queried_artist);
    let city = venue["city"]["name"].as_str().unwrap_or("");

    let mut record = EventRecord::new(artist, venue_name, city, date, TICKETMASTER_SOURCE);

    if let Some(time_str) = event["dates"]["start"]["localTime"].as_str() {
        if let Ok(time) = NaiveTime::parse_from_str(time_str, "%H:%M:%S") {
            record = record.with_time(time);
        }
    }
    if let Some(code) = venue["country"]["countryCode"].as_str() {
        if let Ok(code) = CountryCode::parse(code) {
            record = record.with_country(code);
        }
    }
    if let Some(url) = event["url"].as_str() {
        record = record.with_url(url);
    }
    Ok(record)
}

#[async_trait::async_trait]
impl EventProvider for TicketmasterProvider {
    fn source_id(&self) -> &'static str {
        TICKETMASTER_SOURCE
    }

    fn country_reliable(&self) -> bool {
        true
    }

    #[instrument(skip(self))]
    async fn fetch_events(&self, artist: &str) -> Result<Vec<EventRecord>> {
        let api_key = std::env::var(&self.api_key_env)?;
        let response = self
            .client
            .get(format!("{}/events.json", self.base_url))
            .query(&[
                ("apikey", api_key.as_str()),
                ("keyword", artist),
                ("size", PAGE_SIZE),
                ("sort", "date,asc"),
            ])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let data: Value = response.json().await?;

        // Zero results omit the whole _embedded object.
        let events = match data["_embedded"]["events"].as_array() {
            Some(events) => events,
            None => {
                debug!("No events for {}", artist);
                return Ok(Vec::new());
            }
        };

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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> Value {
        json!({
            "name": "Mogwai in Concert",
            "url": "https://tickets.example.com/e/9",
            "dates": { "start": { "localDate": "2026-10-12", "localTime": "20:00:00" } },
            "_embedded": {
                "venues": [{
                    "name": "Paradiso",
                    "city": { "name": "Amsterdam" },
                    "country": { "name": "Netherlands", "countryCode": "NL" }
                }],
                "attractions": [{ "name": "Mogwai" }]
            }
        })
    }

    #[test]
    fn event_parses_with_country_code() {
        let record = record_from_value(&sample_event(), "mogwai").unwrap();
        assert_eq!(record.artist, "Mogwai");
        assert_eq!(record.venue, "Paradiso");
        assert_eq!(record.city, "Amsterdam");
        assert_eq!(record.country.as_ref().map(|c| c.as_str()), Some("NL"));
        assert_eq!(record.date.to_string(), "2026-10-12");
        assert_eq!(record.source, "ticketmaster");
    }

    #[test]
    fn time_is_optional() {
        let mut event = sample_event();
        event["dates"]["start"]
            .as_object_mut()
            .unwrap()
            .remove("localTime");
        let record = record_from_value(&event, "mogwai").unwrap();
        assert_eq!(record.time, None);
    }

    #[test]
    fn missing_local_date_is_an_error() {
        let mut event = sample_event();
        event["dates"] = json!({});
        assert!(record_from_value(&event, "mogwai").is_err());
    }

    #[test]
    fn attraction_name_wins_over_queried_spelling() {
        let record = record_from_value(&sample_event(), "MOGWAI").unwrap();
        assert_eq!(record.artist, "Mogwai");
    }
}
