//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if a value is present but malformed.

use crate::error::{Error, Result};

/// Default capacity of the lane event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Buffered events per subscriber before slow readers start lagging.
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            otel_endpoint: None,
            log_level: "info".to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let event_capacity = match std::env::var("LANEQ_EVENT_CAPACITY") {
            Ok(raw) => positive_usize("LANEQ_EVENT_CAPACITY", &raw)?,
            Err(_) => DEFAULT_EVENT_CAPACITY,
        };

        Ok(Self {
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_capacity,
        })
    }
}

fn positive_usize(name: &str, raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_usize_rejects_zero_and_garbage() {
        assert_eq!(positive_usize("X", "12").unwrap(), 12);
        assert_eq!(positive_usize("X", " 3 ").unwrap(), 3);
        assert!(positive_usize("X", "0").is_err());
        assert!(positive_usize("X", "-1").is_err());
        assert!(positive_usize("X", "many").is_err());
    }
}
