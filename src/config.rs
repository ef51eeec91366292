//! Tool configuration -- backend address, database path, poll cadence.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime configuration, loadable from a TOML file with environment
/// overrides (`TESTFORGE_BACKEND_URL`, `TESTFORGE_DB_PATH`,
/// `TESTFORGE_POLL_INTERVAL_SECS`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the test generation/execution backend.
    pub backend_url: String,

    /// Path to the local SQLite archive.
    pub db_path: String,

    /// Seconds between status polls for an in-flight execution.
    pub poll_interval_secs: u64,

    /// Give up tracking an execution after this many seconds without a
    /// terminal status. 0 disables the client-side cap.
    pub poll_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            db_path: "data/testforge.db".to_string(),
            poll_interval_secs: 2,
            poll_timeout_secs: 600,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file if one exists,
    /// then environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new("testforge.toml");
                if default_path.exists() {
                    Self::from_file("testforge.toml")?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config file '{}'", path))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("TESTFORGE_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(path) = std::env::var("TESTFORGE_DB_PATH") {
            self.db_path = path;
        }
        if let Ok(secs) = std::env::var("TESTFORGE_POLL_INTERVAL_SECS") {
            if let Ok(parsed) = secs.parse() {
                self.poll_interval_secs = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_backend_contract() {
        let c = Config::default();
        assert_eq!(c.backend_url, "http://127.0.0.1:5000");
        assert_eq!(c.poll_interval_secs, 2);
    }

    #[test]
    fn test_parse_partial_toml() {
        let c: Config = toml::from_str("backend_url = \"http://10.0.0.2:5000\"").unwrap();
        assert_eq!(c.backend_url, "http://10.0.0.2:5000");
        // unspecified fields fall back to defaults
        assert_eq!(c.poll_interval_secs, 2);
        assert_eq!(c.db_path, "data/testforge.db");
    }
}
