//! SQLite cache for the country and city reference data.
//!
//! Lives in its own database file so the geo refresh path never contends
//! with the concert store. `updated_at` on the country row carries the
//! freshness of that country's city list as well; the cache counts as stale
//! once its oldest row falls behind the TTL.

use crate::domain::{CityEntry, CountryCode, CountryEntry};
use crate::error::{AggregatorError, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

pub struct GeoCache {
    conn: Mutex<Connection>,
}

impl GeoCache {
    pub fn open_at<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let db_path = data_dir.as_ref().join("geo_cache.db");
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS countries (
                code        TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                phone_code  TEXT,
                currency    TEXT,
                updated_at  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS cities (
                country_code TEXT NOT NULL,
                name         TEXT NOT NULL,
                state_name   TEXT,
                lat          REAL,
                lon          REAL,
                UNIQUE(country_code, name)
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn replace_countries(&self, entries: &[CountryEntry]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for entry in entries {
            tx.execute(
                "INSERT INTO countries (code, name, phone_code, currency, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(code) DO UPDATE SET
                     name = excluded.name,
                     phone_code = excluded.phone_code,
                     currency = excluded.currency,
                     updated_at = excluded.updated_at",
                params![
                    entry.code.as_str(),
                    entry.name,
                    entry.phone_code,
                    entry.currency,
                    now
                ],
            )?;
        }
        tx.commit()?;
        debug!("Cached {} countries", entries.len());
        Ok(())
    }

    /// Swaps out the city list for one country. Duplicate names within the
    /// country collapse to a single row.
    pub fn replace_cities(&self, country: &CountryCode, cities: &[CityEntry]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM cities WHERE country_code = ?1",
            params![country.as_str()],
        )?;
        for city in cities {
            tx.execute(
                "INSERT INTO cities (country_code, name, state_name, lat, lon)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(country_code, name) DO NOTHING",
                params![
                    country.as_str(),
                    city.name,
                    city.state,
                    city.latitude,
                    city.longitude
                ],
            )?;
        }
        tx.execute(
            "UPDATE countries SET updated_at = ?1 WHERE code = ?2",
            params![now, country.as_str()],
        )?;
        tx.commit()?;
        debug!("Cached {} cities for {}", cities.len(), country);
        Ok(())
    }

    pub fn load_countries(&self) -> Result<Vec<CountryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT code, name, phone_code, currency FROM countries ORDER BY code",
        )?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let code: String = row.get(0)?;
            let code = match CountryCode::parse(&code) {
                Ok(code) => code,
                Err(_) => continue,
            };
            entries.push(CountryEntry {
                code,
                name: row.get(1)?,
                phone_code: row.get(2)?,
                currency: row.get(3)?,
            });
        }
        Ok(entries)
    }

    /// All cached (country, city name) pairs, for building the lookup index.
    pub fn city_names(&self) -> Result<Vec<(CountryCode, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT country_code, name FROM cities")?;
        let mut rows = stmt.query([])?;
        let mut pairs = Vec::new();
        while let Some(row) = rows.next()? {
            let code: String = row.get(0)?;
            let name: String = row.get(1)?;
            if let Ok(code) = CountryCode::parse(&code) {
                pairs.push((code, name));
            }
        }
        Ok(pairs)
    }

    pub fn last_refreshed(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT MIN(updated_at) FROM countries")?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            let raw: Option<String> = row.get(0)?;
            if let Some(ts) = raw {
                let parsed = DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| AggregatorError::Api {
                        message: format!("Invalid cache timestamp: {e}"),
                    })?
                    .with_timezone(&Utc);
                return Ok(Some(parsed));
            }
        }
        Ok(None)
    }

    /// An empty cache is always stale; otherwise the oldest country row
    /// decides.
    pub fn is_stale(&self, ttl_days: i64) -> Result<bool> {
        match self.last_refreshed()? {
            None => Ok(true),
            Some(oldest) => Ok(oldest < Utc::now() - Duration::days(ttl_days)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn country(code: &str, name: &str) -> CountryEntry {
        CountryEntry {
            code: CountryCode::parse(code).unwrap(),
            name: name.to_string(),
            phone_code: None,
            currency: None,
        }
    }

    fn city(name: &str, code: &str) -> CityEntry {
        CityEntry {
            name: name.to_string(),
            country: CountryCode::parse(code).unwrap(),
            state: None,
            latitude: None,
            longitude: None,
        }
    }

    #[test]
    fn empty_cache_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GeoCache::open_at(dir.path()).unwrap();
        assert!(cache.is_stale(7).unwrap());
        assert!(cache.last_refreshed().unwrap().is_none());
    }

    #[test]
    fn fresh_data_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GeoCache::open_at(dir.path()).unwrap();
        cache
            .replace_countries(&[country("DE", "Germany")])
            .unwrap();
        assert!(!cache.is_stale(7).unwrap());
        assert!(cache.is_stale(0).unwrap());
    }

    #[test]
    fn countries_roundtrip_in_code_order() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GeoCache::open_at(dir.path()).unwrap();
        cache
            .replace_countries(&[country("US", "United States"), country("DE", "Germany")])
            .unwrap();

        let loaded = cache.load_countries().unwrap();
        let codes: Vec<&str> = loaded.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["DE", "US"]);
    }

    #[test]
    fn replacing_cities_discards_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GeoCache::open_at(dir.path()).unwrap();
        let de = CountryCode::parse("DE").unwrap();
        cache.replace_countries(&[country("DE", "Germany")]).unwrap();

        cache
            .replace_cities(&de, &[city("Berlin", "DE"), city("Hamburg", "DE")])
            .unwrap();
        cache.replace_cities(&de, &[city("Munich", "DE")]).unwrap();

        let names: Vec<String> = cache
            .city_names()
            .unwrap()
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        assert_eq!(names, vec!["Munich".to_string()]);
    }

    #[test]
    fn duplicate_city_names_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GeoCache::open_at(dir.path()).unwrap();
        let us = CountryCode::parse("US").unwrap();
        cache
            .replace_cities(&us, &[city("Springfield", "US"), city("Springfield", "US")])
            .unwrap();
        assert_eq!(cache.city_names().unwrap().len(), 1);
    }
}
