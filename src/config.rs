use std::{
    fs::{self, File},
    io::Write,
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_yaml::Deserializer;
use url::Url;

use crate::tracking::{DEFAULT_POLL_INTERVAL, DEFAULT_REFRESH_DEBOUNCE};

const APP_NAME: &str = "newsflow";
const CONFIG_FILE: &str = "config.yaml";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const API_URL_VAR: &str = "NEWSFLOW_API_URL";
pub const AUTH_URL_VAR: &str = "SUPABASE_URL";
pub const AUTH_KEY_VAR: &str = "SUPABASE_ANON_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_base_url: Url,
    pub auth_url: Url,
    pub auth_anon_key: String,
    pub prefs_path: PathBuf,
    pub poll_interval_secs: Option<u64>,
    pub refresh_debounce_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

pub struct EnsureOutcome {
    pub path: PathBuf,
    pub created: bool,
}

impl Config {
    pub fn ensure_user_config() -> Result<EnsureOutcome> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_NAME);

        if let Some(path) = xdg_dirs.find_config_file(CONFIG_FILE) {
            return Ok(EnsureOutcome {
                path,
                created: false,
            });
        }

        let config_path = xdg_dirs
            .place_config_file(CONFIG_FILE)
            .context("Cannot create configuration directory")?;
        let mut config_file = File::create(&config_path)?;

        write!(
            &mut config_file,
            r#"# newsflow config (YAML)
# All keys are required unless marked optional.
# NEWSFLOW_API_URL, SUPABASE_URL and SUPABASE_ANON_KEY override the values below.

api_base_url: "http://localhost:5001"
auth_url: "https://<project>.supabase.co"
auth_anon_key: "<your anon key>"
prefs_path: "/path/to/newsflow.sqlite3"

# Optional (defaults shown)
poll_interval_secs: 180
refresh_debounce_secs: 5
request_timeout_secs: 30
"#
        )?;

        Ok(EnsureOutcome {
            path: config_path,
            created: true,
        })
    }

    pub fn get_user_config() -> Result<Config> {
        let existing = xdg::BaseDirectories::with_prefix(APP_NAME)
            .find_config_file(CONFIG_FILE)
            .ok_or_else(|| anyhow!("Could not find {CONFIG_FILE} for {APP_NAME}"))?;

        let raw = fs::read_to_string(&existing)
            .with_context(|| format!("Failed to read {}", existing.display()))?;
        let mut config = Config::from_yaml(&raw)
            .with_context(|| format!("Invalid config {}", existing.display()))?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Config> {
        serde_path_to_error::deserialize(Deserializer::from_str(raw))
            .map_err(|e| anyhow!("Invalid YAML at `{}`: {}", e.path(), e.inner()))
    }

    /// Environment values win over the file when set and non-empty.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(raw) = var(API_URL_VAR) {
            self.api_base_url =
                Url::parse(raw.trim()).with_context(|| format!("Invalid {API_URL_VAR}"))?;
        }
        if let Some(raw) = var(AUTH_URL_VAR) {
            self.auth_url =
                Url::parse(raw.trim()).with_context(|| format!("Invalid {AUTH_URL_VAR}"))?;
        }
        if let Some(key) = var(AUTH_KEY_VAR) {
            self.auth_anon_key = key.trim().to_string();
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        // The timer cannot tick at a zero period.
        self.poll_interval_secs
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn refresh_debounce(&self) -> Duration {
        self.refresh_debounce_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REFRESH_DEBOUNCE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
api_base_url: "http://localhost:5001"
auth_url: "https://demo.supabase.co"
auth_anon_key: "anon"
prefs_path: "/tmp/newsflow.sqlite3"
"#;

    #[test]
    fn optional_keys_fall_back_to_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.api_base_url.as_str(), "http://localhost:5001/");
        assert_eq!(config.poll_interval(), Duration::from_secs(180));
        assert_eq!(config.refresh_debounce(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn zero_poll_interval_is_raised() {
        let raw = format!("{MINIMAL}poll_interval_secs: 0\n");
        let config = Config::from_yaml(&raw).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn errors_name_the_bad_key() {
        let raw = MINIMAL.replace("\"http://localhost:5001\"", "\"not a url\"");
        let err = Config::from_yaml(&raw).unwrap_err().to_string();
        assert!(err.contains("api_base_url"), "{err}");
    }

    #[test]
    fn environment_overrides_non_empty_values() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (API_URL_VAR, "https://api.newsflow.app"),
            (AUTH_URL_VAR, "  "),
            (AUTH_KEY_VAR, "prod-key"),
        ]);

        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_base_url.as_str(), "https://api.newsflow.app/");
        assert_eq!(config.auth_url.as_str(), "https://demo.supabase.co/");
        assert_eq!(config.auth_anon_key, "prod-key");
    }

    #[test]
    fn invalid_override_is_an_error() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        let res = config.apply_overrides(|name| (name == AUTH_URL_VAR).then(|| "::".to_string()));
        assert!(res.is_err());
    }
}
