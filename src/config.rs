//! Configuration loaded from environment variables

use crate::ingestion::FetchSettings;
use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://indiawris.gov.in";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub base_url: String,
    pub page_size: u32,
    pub pacing_delay: Duration,
    pub request_timeout: Duration,
    pub lookup_timeout: Duration,
    pub max_pages: u32, // 0 = no limit
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: 1000,
            pacing_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            lookup_timeout: Duration::from_secs(15),
            max_pages: 0,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Ok(Config {
            bind_addr: parse_or(&lookup, "BIND_ADDR", defaults.bind_addr)?,
            base_url: lookup("WRIS_BASE_URL").unwrap_or(defaults.base_url),
            page_size: parse_or(&lookup, "PAGE_SIZE", defaults.page_size)?,
            pacing_delay: Duration::from_millis(parse_or(
                &lookup,
                "PACING_DELAY_MS",
                defaults.pacing_delay.as_millis() as u64,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            lookup_timeout: Duration::from_secs(parse_or(
                &lookup,
                "LOOKUP_TIMEOUT_SECS",
                defaults.lookup_timeout.as_secs(),
            )?),
            max_pages: parse_or(&lookup, "MAX_PAGES", defaults.max_pages)?,
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        })
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            page_size: self.page_size,
            max_pages: self.max_pages,
            pacing_delay: self.pacing_delay,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got {:?}", key, raw)),
        None => Ok(default),
    }
}
