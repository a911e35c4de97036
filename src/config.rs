use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

use crate::directory::DEFAULT_CDN_PREFIX;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Read from the environment, with a `.env` file loaded first when present.
// Without DATABASE_URL the binary runs on the in-memory store.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub metrics_port: u16,
    pub image_cdn_prefix: String,
    /// Startup connection attempts before giving up.
    pub db_connect_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?;
        let metrics_port = parse_or(&lookup, "METRICS_PORT", 9090)?;
        let image_cdn_prefix = lookup("IMAGE_CDN_PREFIX").unwrap_or_else(|| DEFAULT_CDN_PREFIX.to_string());
        let db_connect_attempts = parse_or(&lookup, "DB_CONNECT_ATTEMPTS", 5)?;

        tracing::info!(
            database = if database_url.is_some() { "postgres" } else { "memory" },
            metrics_port,
            "Application configuration loaded"
        );

        Ok(Self {
            database_url,
            database_max_connections,
            metrics_port,
            image_cdn_prefix,
            db_connect_attempts: db_connect_attempts.max(1),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {} value: {:?}", name, raw)),
        None => Ok(default),
    }
}
