//! Runtime settings read from the environment (and a `.env` file, if any).

use crate::application::orchestrator::DEFAULT_CONFLICT_RETRIES;
use crate::error::{AtmError, Result};
use std::path::PathBuf;
use std::str::FromStr;

pub const TOKEN_SECRET_VAR: &str = "ATM_TOKEN_SECRET";
pub const TOKEN_TTL_VAR: &str = "ATM_TOKEN_TTL_SECONDS";
pub const CONFLICT_RETRIES_VAR: &str = "ATM_CONFLICT_RETRIES";
pub const DB_PATH_VAR: &str = "ATM_DB_PATH";

pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtmConfig {
    /// HS256 signing secret for session tokens.
    pub token_secret: Option<String>,
    pub token_ttl_seconds: u64,
    pub conflict_retries: u32,
    /// Persistent store location; in-memory when absent.
    pub db_path: Option<PathBuf>,
}

impl Default for AtmConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            db_path: None,
        }
    }
}

impl AtmConfig {
    /// Loads `.env` when present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Unset keys keep their
    /// defaults; malformed numbers are rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            token_secret: lookup(TOKEN_SECRET_VAR).filter(|s| !s.trim().is_empty()),
            token_ttl_seconds: parse_or(&lookup, TOKEN_TTL_VAR, defaults.token_ttl_seconds)?,
            conflict_retries: parse_or(&lookup, CONFLICT_RETRIES_VAR, defaults.conflict_retries)?,
            db_path: lookup(DB_PATH_VAR)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// The signing secret, which has no default.
    pub fn token_secret(&self) -> Result<&str> {
        self.token_secret
            .as_deref()
            .ok_or_else(|| AtmError::Validation(format!("{TOKEN_SECRET_VAR} is not set")))
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| {
                AtmError::Validation(format!(
                    "{key} must be a non-negative integer, got {raw:?}"
                ))
            }),
    }
}
