use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Absent means the relational backend is unconfigured and every
    /// store call goes straight to the JSON file.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5340
}
fn default_max_payload_bytes() -> usize {
    65536
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_file_path")]
    pub file_path: PathBuf,
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file_path: default_file_path(),
            max_events: default_max_events(),
        }
    }
}

fn default_file_path() -> PathBuf {
    PathBuf::from("data/analytics-events.json")
}
fn default_max_events() -> usize {
    25_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            prune_interval_secs: default_prune_interval(),
        }
    }
}

fn default_prune_interval() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeoConfig {
    #[serde(default = "default_geo_enabled")]
    pub enabled: bool,
    #[serde(default = "default_geo_base_url")]
    pub base_url: String,
    #[serde(default = "default_geo_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_geo_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_geo_cache_capacity")]
    pub cache_capacity: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: default_geo_enabled(),
            base_url: default_geo_base_url(),
            timeout_ms: default_geo_timeout(),
            cache_ttl_secs: default_geo_cache_ttl(),
            cache_capacity: default_geo_cache_capacity(),
        }
    }
}

fn default_geo_enabled() -> bool {
    true
}
fn default_geo_base_url() -> String {
    "https://ipwho.is".to_string()
}
fn default_geo_timeout() -> u64 {
    1200
}
fn default_geo_cache_ttl() -> u64 {
    6 * 60 * 60
}
fn default_geo_cache_capacity() -> u64 {
    10_000
}

/// Heuristic thresholds for the summary. Defaults are the historical values.
#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default = "default_contact_domains")]
    pub contact_domains: Vec<String>,
    #[serde(default = "default_spike_sigma")]
    pub spike_sigma: f64,
    #[serde(default = "default_spike_floor")]
    pub spike_floor: u64,
    #[serde(default = "default_bot_share_alert")]
    pub bot_share_alert_pct: f64,
    #[serde(default = "default_contact_rate_floor")]
    pub contact_rate_floor_pct: f64,
    #[serde(default = "default_contact_min_sessions")]
    pub contact_min_sessions: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            contact_domains: default_contact_domains(),
            spike_sigma: default_spike_sigma(),
            spike_floor: default_spike_floor(),
            bot_share_alert_pct: default_bot_share_alert(),
            contact_rate_floor_pct: default_contact_rate_floor(),
            contact_min_sessions: default_contact_min_sessions(),
        }
    }
}

fn default_contact_domains() -> Vec<String> {
    vec!["cal.com".to_string()]
}
fn default_spike_sigma() -> f64 {
    3.0
}
fn default_spike_floor() -> u64 {
    20
}
fn default_bot_share_alert() -> f64 {
    35.0
}
fn default_contact_rate_floor() -> f64 {
    10.0
}
fn default_contact_min_sessions() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_admin_cookie")]
    pub admin_cookie: String,
    #[serde(default = "default_admin_cookie_value")]
    pub admin_cookie_value: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_cookie: default_admin_cookie(),
            admin_cookie_value: default_admin_cookie_value(),
        }
    }
}

fn default_admin_cookie() -> String {
    "cms_admin".to_string()
}
fn default_admin_cookie_value() -> String {
    "1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_second")]
    pub per_second: u64,
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: default_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

fn default_per_second() -> u64 {
    20
}
fn default_burst_size() -> u32 {
    60
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.max_events == 0 {
            return Err("storage.max_events must be greater than zero".to_string());
        }
        if self.auth.admin_cookie.trim().is_empty() {
            return Err("auth.admin_cookie must name the admin session cookie. \
                 Set it in config.toml or via TALLY__AUTH__ADMIN_COOKIE env var."
                .to_string());
        }
        if self.geo.enabled && url::Url::parse(&self.geo.base_url).is_err() {
            return Err(format!("geo.base_url is not a valid URL: {}", self.geo.base_url));
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // TALLY__DATABASE__PATH=/var/lib/tally/events.db, TALLY__GEO__ENABLED=false, ...
        builder = builder.add_source(
            Environment::with_prefix("TALLY")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
