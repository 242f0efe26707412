//! Controller configuration
//!
//! Settings are read from `settings.json` inside the data directory. Every
//! field has a default so a missing or partial file still yields a usable
//! configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const LOG_DIR_NAME: &str = "logs";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_START_TIMEOUT_MS: u64 = 10_000;
/// Upper bound on records returned by a single recent-log query.
pub const MAX_RECENT_RECORDS: u32 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Root directory for rules, certificates, captures and logs
    pub data_dir: PathBuf,
    /// Port the engine listens on unless a start request overrides it
    pub port: u16,
    /// Whether the engine serves its own web UI
    pub web_interface_enabled: bool,
    /// Whether HTTPS traffic is always intercepted
    pub force_proxy_https: bool,
    /// Bind host; `None` means all interfaces
    pub host: Option<String>,
    /// How long a start waits for the engine's ready/error event, in milliseconds
    pub start_timeout_ms: u64,
    /// Default size of the recent-log listing
    pub recent_log_limit: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            port: DEFAULT_PORT,
            web_interface_enabled: false,
            force_proxy_https: true,
            host: None,
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            recent_log_limit: MAX_RECENT_RECORDS,
        }
    }
}

impl ControllerConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load `settings.json` from `data_dir`, falling back to defaults when the
    /// file does not exist. The data directory always wins over whatever the
    /// file says, so a copied settings file cannot point elsewhere.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(SETTINGS_FILE_NAME);
        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading settings from {}", path.display()))?;
            serde_json::from_str::<ControllerConfig>(&raw)
                .with_context(|| format!("parsing settings at {}", path.display()))?
        } else {
            ControllerConfig::default()
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms.max(1))
    }

    pub fn rules_file(&self) -> PathBuf {
        self.data_dir.join("rules.json")
    }

    pub fn custom_rule_dir(&self) -> PathBuf {
        self.data_dir.join("rule_custom")
    }

    pub fn sample_rule_dir(&self) -> PathBuf {
        self.data_dir.join("rule_sample")
    }

    pub fn cert_dir(&self) -> PathBuf {
        self.data_dir.join("certificates")
    }

    pub fn capture_db(&self) -> PathBuf {
        self.data_dir.join("captures.sqlite")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("proxyctl"))
        .unwrap_or_else(|| PathBuf::from("./proxyctl_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ControllerConfig::load(dir.path()).expect("load defaults");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.force_proxy_https);
        assert!(!config.web_interface_enabled);
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.rules_file(), dir.path().join("rules.json"));
    }

    #[test]
    fn partial_settings_keep_remaining_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE_NAME),
            r#"{ "port": 9191, "data_dir": "/somewhere/else" }"#,
        )
        .unwrap();

        let config = ControllerConfig::load(dir.path()).expect("load settings");
        assert_eq!(config.port, 9191);
        assert_eq!(config.start_timeout_ms, DEFAULT_START_TIMEOUT_MS);
        assert_eq!(config.data_dir, dir.path());
    }

    #[test]
    fn malformed_settings_are_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE_NAME), "{ not json").unwrap();
        assert!(ControllerConfig::load(dir.path()).is_err());
    }
}
