use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::common::pagination::{clamp_page_size, DEFAULT_PAGE_SIZE};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Absent selects the in-memory store.
    pub database_url: Option<String>,
    pub port: u16,
    pub candidate_page_size: usize,
    pub allowed_origins: Vec<String>,
    pub db_max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            candidate_page_size: clamp_page_size(
                env::var("CANDIDATE_PAGE_SIZE")
                    .ok()
                    .map(|v| v.parse::<usize>())
                    .transpose()
                    .context("CANDIDATE_PAGE_SIZE must be a positive number")?
                    .unwrap_or(DEFAULT_PAGE_SIZE),
            ),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| parse_origins(&v))
                .unwrap_or_default(),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("DB_MAX_CONNECTIONS must be a valid number")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8080,
            candidate_page_size: DEFAULT_PAGE_SIZE,
            allowed_origins: Vec::new(),
            db_max_connections: 10,
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
