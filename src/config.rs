use std::env;
use std::str::FromStr;
use log::debug;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::utils::mask_api_key;

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_GOOGLE_PLACES_API_BASE: &str = "https://maps.googleapis.com/maps/api/place";

/// Runtime settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: String,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub openai_model: String,
    pub google_places_api_base: String,
    pub bind_address: String,
    pub log_level: String,
    pub log_file: String,
    pub summarize_with_llm: bool,
    pub embed_result_page: bool,
    pub max_restaurants: usize,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let google_api_key = env::var("GOOGLE_API_KEY")
            .or_else(|_| env::var("GOOGLE_MAPS_API_KEY"))
            .map_err(|_| AppError::Config("GOOGLE_API_KEY must be set".to_string()))?;
        let openai_api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| AppError::Config("OPENAI_API_KEY must be set".to_string()))?;

        let config = Self {
            google_api_key,
            openai_api_key,
            openai_api_base: var_or("OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE),
            openai_model: var_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            google_places_api_base: var_or("GOOGLE_PLACES_API_BASE", DEFAULT_GOOGLE_PLACES_API_BASE),
            bind_address: var_or("BIND_ADDRESS", "0.0.0.0:9999"),
            log_level: var_or("LOG_LEVEL", "debug"),
            log_file: var_or("LOG_FILE", "logs/dinewise.log"),
            summarize_with_llm: parse_var("SUMMARIZE_WITH_LLM", true)?,
            embed_result_page: parse_var("EMBED_RESULT_PAGE", true)?,
            max_restaurants: parse_var("MAX_RESTAURANTS", 10)?,
            rate_limit_per_second: parse_var("RATE_LIMIT_PER_SECOND", 5)?,
            rate_limit_burst: parse_var("RATE_LIMIT_BURST", 10)?,
        };
        debug!("Loaded configuration for model {}", config.openai_model);
        Ok(config)
    }

    /// Effective settings with every API key masked, for the startup log.
    pub fn masked_summary(&self) -> serde_json::Value {
        json!({
            "GOOGLE_API_KEY": mask_api_key(&self.google_api_key),
            "OPENAI_API_KEY": mask_api_key(&self.openai_api_key),
            "OPENAI_API_BASE": self.openai_api_base,
            "OPENAI_MODEL": self.openai_model,
            "GOOGLE_PLACES_API_BASE": self.google_places_api_base,
            "BIND_ADDRESS": self.bind_address,
            "LOG_LEVEL": self.log_level,
            "LOG_FILE": self.log_file,
            "SUMMARIZE_WITH_LLM": self.summarize_with_llm,
            "EMBED_RESULT_PAGE": self.embed_result_page,
            "MAX_RESTAURANTS": self.max_restaurants,
            "RATE_LIMIT_PER_SECOND": self.rate_limit_per_second,
            "RATE_LIMIT_BURST": self.rate_limit_burst,
        })
    }

    pub fn places_url(&self, endpoint: &str) -> String {
        format!("{}/{}/json", self.google_places_api_base.trim_end_matches('/'), endpoint)
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.openai_api_base.trim_end_matches('/'))
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_config(google_base: &str, openai_base: &str) -> Config {
    Config {
        google_api_key: "google-test-key".to_string(),
        openai_api_key: "openai-test-key".to_string(),
        openai_api_base: openai_base.to_string(),
        openai_model: DEFAULT_OPENAI_MODEL.to_string(),
        google_places_api_base: google_base.to_string(),
        bind_address: "127.0.0.1:0".to_string(),
        log_level: "debug".to_string(),
        log_file: "logs/test.log".to_string(),
        summarize_with_llm: false,
        embed_result_page: false,
        max_restaurants: 10,
        rate_limit_per_second: 5,
        rate_limit_burst: 10,
    }
}
