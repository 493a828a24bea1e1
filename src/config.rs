//! Scheduling configuration.
//!
//! Loaded from a TOML file when the server is given one, otherwise the
//! defaults apply. Every field has a default so partial files are fine.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// New cards introduced per user per day
    #[serde(default = "default_new_cards_per_day")]
    pub new_cards_per_day: usize,

    /// Review cards served between consecutive new cards in a queue
    #[serde(default = "default_reviews_per_new")]
    pub reviews_per_new: usize,

    /// Session size when the client doesn't ask for one
    #[serde(default = "default_session_cap")]
    pub default_session_cap: usize,

    /// Seconds of inactivity before a session is discarded
    #[serde(default = "default_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,
}

fn default_new_cards_per_day() -> usize {
    20
}

fn default_reviews_per_new() -> usize {
    4
}

fn default_session_cap() -> usize {
    100
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            new_cards_per_day: default_new_cards_per_day(),
            reviews_per_new: default_reviews_per_new(),
            default_session_cap: default_session_cap(),
            session_idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl StudyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StudyConfig::default();
        assert_eq!(config.new_cards_per_day, 20);
        assert_eq!(config.reviews_per_new, 4);
        assert_eq!(config.default_session_cap, 100);
        assert_eq!(config.session_idle_timeout_secs, 1800);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: StudyConfig = toml::from_str("new_cards_per_day = 5").unwrap();
        assert_eq!(config.new_cards_per_day, 5);
        assert_eq!(config.reviews_per_new, 4);
    }
}
