use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub vendor: VendorConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Build mode. Development disables the response cache.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    #[default]
    Production,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    /// Base URL of the token-authenticated REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Base URL of the legacy API-key API the proxy forwards to
    #[serde(default = "default_legacy_api_base_url")]
    pub legacy_api_base_url: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            legacy_api_base_url: default_legacy_api_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://apig.selzy.com".to_string()
}

fn default_legacy_api_base_url() -> String {
    "https://api.selzy.com/en/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Campaigns fetched per page (default: 5)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Keep credentials for silent re-login unless overridden on the command line
    #[serde(default)]
    pub remember_credentials: bool,
    /// Number of campaigns shown by the legacy dashboard (default: 5)
    #[serde(default = "default_legacy_recent_count")]
    pub legacy_recent_count: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            remember_credentials: false,
            legacy_recent_count: default_legacy_recent_count(),
        }
    }
}

fn default_page_size() -> u32 {
    5
}

fn default_legacy_recent_count() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_max_age")]
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            max_age_secs: default_cache_max_age(),
        }
    }
}

fn default_cache_max_entries() -> usize {
    32
}

fn default_cache_max_age() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn default() -> Self {
        Self {
            mode: Mode::default(),
            server: ServerConfig::default(),
            vendor: VendorConfig::default(),
            dashboard: DashboardConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Whether vendor GET responses should be cached for offline use
    pub fn cache_enabled(&self) -> bool {
        self.mode == Mode::Production && self.cache.max_entries > 0
    }

    /// Collect configuration problems. An empty list means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (name, url) in [
            ("vendor.api_base_url", &self.vendor.api_base_url),
            ("vendor.legacy_api_base_url", &self.vendor.legacy_api_base_url),
        ] {
            if reqwest::Url::parse(url).is_err() {
                problems.push(format!("{} is not a valid URL: {}", name, url));
            }
        }

        if self.dashboard.page_size == 0 {
            problems.push("dashboard.page_size must be greater than 0".to_string());
        }

        if self.vendor.request_timeout_secs == 0 {
            problems.push("vendor.request_timeout_secs must be greater than 0".to_string());
        }

        problems
    }

    /// Fail with every collected problem when the config is not usable.
    pub fn ensure_valid(&self) -> Result<()> {
        let problems = self.validate();
        if !problems.is_empty() {
            anyhow::bail!("Invalid configuration: {}", problems.join("; "));
        }
        Ok(())
    }

    /// Path of the persisted session store
    pub fn session_file(&self) -> PathBuf {
        self.server.data_dir.join("session.json")
    }

    /// Path of the persisted response cache
    pub fn cache_file(&self) -> PathBuf {
        self.server.data_dir.join("cache.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.dashboard.page_size, 5);
        assert_eq!(config.cache.max_entries, 32);
        assert_eq!(config.cache.max_age_secs, 86400);
        assert_eq!(config.mode, Mode::Production);
        assert!(config.cache_enabled());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_development_mode_disables_cache() {
        let config: Config = toml::from_str("mode = \"development\"").unwrap();
        assert_eq!(config.mode, Mode::Development);
        assert!(!config.cache_enabled());
    }

    #[test]
    fn test_validate_reports_bad_values() {
        let config: Config = toml::from_str(
            r#"
            [vendor]
            api_base_url = "not a url"

            [dashboard]
            page_size = 0
            "#,
        )
        .unwrap();

        let problems = config.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("vendor.api_base_url"));
        assert!(problems[1].contains("page_size"));

        let err = config.ensure_valid().unwrap_err().to_string();
        assert!(err.contains("vendor.api_base_url"));
        assert!(err.contains("page_size"));
        assert!(Config::default().ensure_valid().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/mailpulse.toml")).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.session_file(), PathBuf::from("./data/session.json"));
        assert_eq!(config.cache_file(), PathBuf::from("./data/cache.json"));
    }
}
