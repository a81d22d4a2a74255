//! Countries/cities reference service client.
//!
//! The service keys its city listing by country NAME, not ISO code, so the
//! client keeps a code-to-name map warmed by the country listing. Responses
//! wrap payloads in `{ error, msg, data }`.

use crate::apis::GeoReference;
use crate::config::GeoConfig;
use crate::domain::{CityEntry, CountryCode, CountryEntry};
use crate::error::{AggregatorError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub struct CountriesNowClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    /// ISO code to service-native country name.
    country_names: Mutex<HashMap<String, String>>,
}

impl CountriesNowClient {
    pub fn new(config: &GeoConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            country_names: Mutex::new(HashMap::new()),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        let data: Value = response.json().await?;
        check_service_error(&data)?;
        Ok(data)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        let data: Value = response.json().await?;
        check_service_error(&data)?;
        Ok(data)
    }

    fn remember_names(&self, entries: &[CountryEntry]) {
        let mut names = self.country_names.lock().unwrap();
        for entry in entries {
            names.insert(entry.code.as_str().to_string(), entry.name.clone());
        }
    }

    fn name_of(&self, country: &CountryCode) -> Option<String> {
        self.country_names.lock().unwrap().get(country.as_str()).cloned()
    }
}

fn check_service_error(data: &Value) -> Result<()> {
    if data["error"].as_bool() == Some(true) {
        return Err(AggregatorError::Api {
            message: data["msg"]
                .as_str()
                .unwrap_or("reference service error")
                .to_string(),
        });
    }
    Ok(())
}

fn country_from_row(row: &Value, currencies: &HashMap<String, String>) -> Option<CountryEntry> {
    let name = row["name"].as_str()?;
    let code = row["code"].as_str().and_then(|c| CountryCode::parse(c).ok())?;
    Some(CountryEntry {
        code,
        name: name.to_string(),
        phone_code: row["dial_code"].as_str().map(str::to_string),
        currency: currencies.get(name).cloned(),
    })
}

fn city_entries(data: &Value, country: &CountryCode) -> Result<Vec<CityEntry>> {
    let cities = data["data"]
        .as_array()
        .ok_or_else(|| AggregatorError::MissingField("city data not found".into()))?;
    Ok(cities
        .iter()
        .filter_map(|city| city.as_str())
        .map(|city| CityEntry {
            name: city.to_string(),
            country: country.clone(),
            state: None,
            latitude: None,
            longitude: None,
        })
        .collect())
}

#[async_trait::async_trait]
impl GeoReference for CountriesNowClient {
    #[instrument(skip(self))]
    async fn list_countries(&self) -> Result<Vec<CountryEntry>> {
        let codes = self.get_json("/countries/codes").await?;
        let rows = codes["data"]
            .as_array()
            .ok_or_else(|| AggregatorError::MissingField("country data not found".into()))?;

        // Currencies live behind a second endpoint; losing them is not fatal.
        let mut currencies: HashMap<String, String> = HashMap::new();
        match self.get_json("/countries/currency").await {
            Ok(data) => {
                if let Some(rows) = data["data"].as_array() {
                    for row in rows {
                        if let (Some(name), Some(currency)) =
                            (row["name"].as_str(), row["currency"].as_str())
                        {
                            currencies.insert(name.to_string(), currency.to_string());
                        }
                    }
                }
            }
            Err(e) => warn!("Currency listing unavailable: {}", e),
        }

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match country_from_row(row, &currencies) {
                Some(entry) => entries.push(entry),
                None => debug!("Skipping country row without usable code: {}", row),
            }
        }
        self.remember_names(&entries);
        debug!("Reference service listed {} countries", entries.len());
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn list_cities(&self, country: &CountryCode) -> Result<Vec<CityEntry>> {
        let name = match self.name_of(country) {
            Some(name) => name,
            None => {
                self.list_countries().await?;
                self.name_of(country).ok_or_else(|| AggregatorError::Api {
                    message: format!("Unknown country code {country}"),
                })?
            }
        };

        let body = serde_json::json!({ "country": name });
        let data = self.post_json("/countries/cities", &body).await?;
        let entries = city_entries(&data, country)?;
        debug!("Reference service listed {} cities for {}", entries.len(), country);
        Ok(entries)
    }
}
