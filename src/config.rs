//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the verdict API key) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub verdict: VerdictConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// sqlx connection url, e.g. `sqlite://verdiction.db`.
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Upper bound on a single wager, in credits.
    pub max_wager: i64,
    /// Credits granted to a user on first authenticated contact.
    pub starting_balance: i64,
    /// Seed a handful of demo cases at startup (local development).
    #[serde(default)]
    pub seed_demo_cases: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerdictConfig {
    pub enabled: bool,
    pub model: String,
    pub api_key_env: String,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
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
