use crate::services::RecommenderConfig;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // HTTP server config
    pub http_host: String,
    pub http_port: u16,

    // Persistence
    pub data_dir: PathBuf,

    // Problem source
    pub codeforces_api_url: String,
    pub request_timeout_seconds: u64,

    // Recommendation pipeline
    pub cache_ttl_seconds: u64,
    pub max_features: usize,
    pub default_rating: i32,
    pub default_recommendation_count: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .set_default("http_host", "0.0.0.0")?
            .set_default("http_port", 5000)?
            .set_default("data_dir", "./data")?
            .set_default("codeforces_api_url", "https://codeforces.com/api")?
            .set_default("request_timeout_seconds", 30)?
            .set_default("cache_ttl_seconds", 3600)? // 1 hour
            .set_default("max_features", 100)?
            .set_default("default_rating", 1500)?
            .set_default("default_recommendation_count", 10)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }

        if self.codeforces_api_url.is_empty() {
            return Err(anyhow!("Codeforces API URL is required"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow!("Request timeout must be greater than 0"));
        }

        if self.max_features == 0 {
            return Err(anyhow!("max_features must be greater than 0"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn recommender(&self) -> RecommenderConfig {
        RecommenderConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_seconds),
            max_features: self.max_features,
            default_rating: self.default_rating,
        }
    }
}
