use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub prayers: PrayerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Base URL used when building links in outgoing mail
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Mark the session cookie `Secure` (disable only for plain-HTTP development)
    #[serde(default = "default_true")]
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            public_url: default_public_url(),
            secure_cookies: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    #[serde(default = "default_reset_token_ttl_minutes")]
    pub reset_token_ttl_minutes: i64,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    /// Super-admin created on first start when none exists
    pub bootstrap_username: Option<String>,
    pub bootstrap_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            reset_token_ttl_minutes: default_reset_token_ttl_minutes(),
            min_password_length: default_min_password_length(),
            bootstrap_username: None,
            bootstrap_password: None,
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_reset_token_ttl_minutes() -> i64 {
    60
}

fn default_min_password_length() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrayerConfig {
    /// Category display priority, first entry sorts first
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
    #[serde(default = "default_recent_activity_limit")]
    pub recent_activity_limit: i64,
    /// Maximum number of row errors kept in an import log entry
    #[serde(default = "default_import_error_log_cap")]
    pub import_error_log_cap: usize,
}

impl Default for PrayerConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            stale_after_days: default_stale_after_days(),
            recent_activity_limit: default_recent_activity_limit(),
            import_error_log_cap: default_import_error_log_cap(),
        }
    }
}

pub const DEFAULT_CATEGORY: &str = "General";

fn default_categories() -> Vec<String> {
    [
        "Praise Report",
        "Healing",
        "Family",
        "Salvation",
        "Provision",
        "Guidance",
        DEFAULT_CATEGORY,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_stale_after_days() -> i64 {
    30
}

fn default_recent_activity_limit() -> i64 {
    20
}

fn default_import_error_log_cap() -> usize {
    10
}

impl PrayerConfig {
    /// Sort rank of a category; unranked categories sort after every ranked one
    pub fn category_rank(&self, category: &str) -> usize {
        self.categories
            .iter()
            .position(|c| c.eq_ignore_ascii_case(category))
            .unwrap_or(self.categories.len())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_requests_per_window")]
    pub api_requests_per_window: u32,
    #[serde(default = "default_auth_requests_per_window")]
    pub auth_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_rate_limit_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_requests_per_window: default_api_requests_per_window(),
            auth_requests_per_window: default_auth_requests_per_window(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_rate_limit_cleanup_interval(),
        }
    }
}

fn default_api_requests_per_window() -> u32 {
    120
}

fn default_auth_requests_per_window() -> u32 {
    20
}

fn default_window_seconds() -> u64 {
    60
}

fn default_rate_limit_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_true")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: true,
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Prayer Wall".to_string()
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

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between purges of expired sessions and reset tokens
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            prayers: PrayerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            email: EmailConfig::default(),
            logging: LoggingConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/prayerwall.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.session_ttl_hours, 24);
        assert_eq!(config.prayers.stale_after_days, 30);
        assert_eq!(config.prayers.categories.first().unwrap(), "Praise Report");
    }

    #[test]
    fn test_partial_file_keeps_section_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8088

[prayers]
categories = ["Healing", "Praise Report"]
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.prayers.categories.len(), 2);
        assert_eq!(config.prayers.import_error_log_cap, 10);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_category_rank() {
        let prayers = PrayerConfig::default();
        assert_eq!(prayers.category_rank("Praise Report"), 0);
        assert_eq!(prayers.category_rank("healing"), 1);
        assert_eq!(prayers.category_rank("Unlisted"), prayers.categories.len());
    }

    #[test]
    fn test_email_not_configured_by_default() {
        assert!(!EmailConfig::default().is_configured());
    }
}
