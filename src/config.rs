use crate::constants;
use crate::error::{AggregatorError, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub bandsintown: BandsintownConfig,
    #[serde(default)]
    pub ticketmaster: TicketmasterConfig,
    #[serde(default)]
    pub geo: GeoConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BandsintownConfig {
    #[serde(default = "default_bandsintown_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Name of the environment variable holding the app id.
    #[serde(default = "default_bandsintown_app_id_env")]
    pub app_id_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketmasterConfig {
    #[serde(default = "default_ticketmaster_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_ticketmaster_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoConfig {
    #[serde(default = "default_geo_url")]
    pub base_url: String,
    #[serde(default = "default_geo_timeout")]
    pub timeout_seconds: u64,
    /// Cached country/city rows older than this are refreshed.
    #[serde(default = "default_geo_ttl_days")]
    pub ttl_days: i64,
    /// Sources whose country fields are trusted; their records pass the geo
    /// filter even when the city cannot be resolved.
    #[serde(default = "default_trusted_sources")]
    pub trusted_sources: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            AggregatorError::Config(format!("Failed to read config file '{config_path}': {e}"))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Load `config.toml` when present, otherwise fall back to defaults so
    /// the binary works out of the box.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog: CatalogConfig::default(),
            bandsintown: BandsintownConfig::default(),
            ticketmaster: TicketmasterConfig::default(),
            geo: GeoConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_url(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for BandsintownConfig {
    fn default() -> Self {
        Self {
            base_url: default_bandsintown_url(),
            timeout_seconds: default_timeout(),
            app_id_env: default_bandsintown_app_id_env(),
        }
    }
}

impl Default for TicketmasterConfig {
    fn default() -> Self {
        Self {
            base_url: default_ticketmaster_url(),
            timeout_seconds: default_timeout(),
            api_key_env: default_ticketmaster_key_env(),
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            base_url: default_geo_url(),
            timeout_seconds: default_geo_timeout(),
            ttl_days: default_geo_ttl_days(),
            trusted_sources: default_trusted_sources(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_catalog_url() -> String {
    constants::MUSICBRAINZ_BASE_URL.to_string()
}

fn default_bandsintown_url() -> String {
    constants::BANDSINTOWN_BASE_URL.to_string()
}

fn default_ticketmaster_url() -> String {
    constants::TICKETMASTER_BASE_URL.to_string()
}

fn default_geo_url() -> String {
    constants::COUNTRIESNOW_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    "gigwire/0.1 (concert metadata aggregator)".to_string()
}

fn default_bandsintown_app_id_env() -> String {
    "BANDSINTOWN_APP_ID".to_string()
}

fn default_ticketmaster_key_env() -> String {
    "TICKETMASTER_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_geo_timeout() -> u64 {
    20
}

fn default_geo_ttl_days() -> i64 {
    7
}

fn default_trusted_sources() -> Vec<String> {
    vec![constants::TICKETMASTER_SOURCE.to_string()]
}
