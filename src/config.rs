//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub engine: EngineSettings,
    pub broker: BrokerConfig,
    pub advisor: AdvisorConfig,
    pub surface: SurfaceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    pub tick_interval_secs: u64,
    pub submit_delay_ms: u64,
    pub price_tolerance: Decimal,
    pub order_qty: Decimal,
    pub order_fetch_limit: u32,
    pub state_file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    pub provider: String,
    pub trading_url: String,
    pub data_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdvisorConfig {
    pub enabled: bool,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SurfaceConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
