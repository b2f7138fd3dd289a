use std::{net::SocketAddr, path::PathBuf, time::Duration};
use thiserror::Error;

use crate::gemini::DEMO_KEY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub gemini_model: String,
    /// In-memory state when unset.
    pub state_path: Option<PathBuf>,
    pub autosave_delay: Duration,
}

impl Config {
    /// Reads configuration from the environment. Call `dotenv` first to pick
    /// up a local `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port: u16 = parse_or(&lookup, "PORT", 8080)?;
        let autosave_ms: u64 = parse_or(&lookup, "AUTOSAVE_DELAY_MS", 1500)?;

        Ok(Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], port)),
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()).unwrap_or_else(|| DEMO_KEY.into()),
            gemini_api_base: lookup("GEMINI_API_BASE")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            gemini_model: lookup("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            state_path: lookup("STATE_PATH").filter(|p| !p.trim().is_empty()).map(PathBuf::from),
            autosave_delay: Duration::from_millis(autosave_ms),
        })
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}
