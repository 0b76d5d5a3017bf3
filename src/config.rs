//! # Configuration
//!
//! Application settings come from an optional TOML file, then `STRATA_*`
//! environment variables override individual fields.
//!
//! ```toml
//! bind_address = "0.0.0.0:8080"
//! worker_threads = 8
//! max_redirects = 8
//! max_body_size = 10485760
//!
//! [session]
//! cookie_name = "sid"
//! max_age_secs = 3600
//! sweep_interval_ms = 60000
//!
//! [multipart]
//! max_part_size = 1048576
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |---|---|
//! | `STRATA_BIND_ADDRESS` | `bind_address` |
//! | `STRATA_WORKER_THREADS` | `worker_threads` |
//! | `STRATA_MAX_REDIRECTS` | `max_redirects` |
//! | `STRATA_MAX_BODY_SIZE` | `max_body_size` |
//! | `STRATA_SESSION_COOKIE` | `session.cookie_name` |
//! | `STRATA_SESSION_MAX_AGE` | `session.max_age_secs` |
//! | `STRATA_SESSION_SWEEP_MS` | `session.sweep_interval_ms` |
//! | `STRATA_MULTIPART_MAX_PART` | `multipart.max_part_size` |
//!
//! Sizes accept decimal or `0x`-prefixed hexadecimal.

use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;

use crate::dispatcher::DEFAULT_MAX_REDIRECTS;
use crate::error::ConfigError;

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Address the server binds to
    pub bind_address: String,
    /// Threads pulling requests off the listener
    pub worker_threads: usize,
    /// Redirect hops allowed per exchange
    pub max_redirects: usize,
    /// Largest non-multipart request body, in bytes; a larger declared
    /// length gets `413`. Multipart bodies stream and are capped per part.
    pub max_body_size: usize,
    pub session: SessionConfig,
    pub multipart: MultipartConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_body_size: 10 * 1024 * 1024,
            session: SessionConfig::default(),
            multipart: MultipartConfig::default(),
        }
    }
}

/// Cookie session settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub max_age_secs: u64,
    /// Interval between sweeps of expired sessions
    pub sweep_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "strata.sid".to_string(),
            max_age_secs: 3600,
            sweep_interval_ms: 60_000,
        }
    }
}

/// Multipart decoding settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultipartConfig {
    /// Parts larger than this are flagged `OutOfSize` and their data dropped
    pub max_part_size: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_part_size: 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Parse TOML text; `origin` names the source in error messages
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` for malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Read a TOML file, then apply environment overrides
    ///
    /// # Errors
    ///
    /// `ConfigError::Io` if the file can't be read, `Parse` if it isn't
    /// valid, `InvalidEnv` if an override can't be parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text, &path.display().to_string())?;
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidEnv` if an override can't be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `STRATA_*` overrides from the process environment
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidEnv` if an override can't be parsed.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidEnv` if a value can't be parsed.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STRATA_BIND_ADDRESS") {
            self.bind_address = v;
        }
        override_num(&lookup, "STRATA_WORKER_THREADS", &mut self.worker_threads)?;
        override_num(&lookup, "STRATA_MAX_REDIRECTS", &mut self.max_redirects)?;
        override_size(&lookup, "STRATA_MAX_BODY_SIZE", &mut self.max_body_size)?;
        if let Some(v) = lookup("STRATA_SESSION_COOKIE") {
            self.session.cookie_name = v;
        }
        override_num(&lookup, "STRATA_SESSION_MAX_AGE", &mut self.session.max_age_secs)?;
        override_num(
            &lookup,
            "STRATA_SESSION_SWEEP_MS",
            &mut self.session.sweep_interval_ms,
        )?;
        override_size(
            &lookup,
            "STRATA_MULTIPART_MAX_PART",
            &mut self.multipart.max_part_size,
        )?;
        if self.worker_threads == 0 {
            return Err(ConfigError::InvalidEnv {
                key: "STRATA_WORKER_THREADS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn override_num<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { key, value })?;
    }
    Ok(())
}

fn override_size<F>(lookup: &F, key: &'static str, slot: &mut usize) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *slot = parse_size(&value).ok_or(ConfigError::InvalidEnv { key, value })?;
    }
    Ok(())
}

/// Parse a decimal or `0x` hexadecimal size
fn parse_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
