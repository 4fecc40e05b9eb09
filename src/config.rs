use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::models::MatchSettings;
use crate::services::runtime_config::keys;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub intake: IntakeSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    /// Longest wait for a row lock before an attempt is abandoned
    pub lock_timeout_ms: Option<u64>,
}

/// Which participant store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// Non-persistent, single-process
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
}

/// Seed values for the runtime score rules
///
/// Only written when the runtime configuration has no value yet.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_target_score")]
    pub target_score: i32,
    #[serde(default = "default_fuzzy_min")]
    pub fuzzy_min: i32,
    #[serde(default = "default_fuzzy_max")]
    pub fuzzy_max: i32,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            target_score: default_target_score(),
            fuzzy_min: default_fuzzy_min(),
            fuzzy_max: default_fuzzy_max(),
        }
    }
}

fn default_target_score() -> i32 { MatchSettings::default().target_score }
fn default_fuzzy_min() -> i32 { MatchSettings::default().fuzzy_min }
fn default_fuzzy_max() -> i32 { MatchSettings::default().fuzzy_max }

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeSettings {
    #[serde(default = "default_valid_url_prefix")]
    pub valid_url_prefix: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_max_per_day_origin")]
    pub max_per_day_origin: u32,
    /// Upper bound on the base64 data URL length
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            valid_url_prefix: default_valid_url_prefix(),
            upload_dir: default_upload_dir(),
            max_per_day_origin: default_max_per_day_origin(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

fn default_valid_url_prefix() -> String { "https://u.alipay.cn/".to_string() }
fn default_upload_dir() -> String { "./uploads".to_string() }
fn default_max_per_day_origin() -> u32 { 3 }
fn default_max_image_bytes() -> usize { 3 * 1024 * 1024 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with ZUFEN_)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., ZUFEN__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("ZUFEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings = apply_database_url(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("ZUFEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Runtime configuration values seeded at startup
    pub fn runtime_defaults(&self) -> Vec<(&'static str, String)> {
        vec![
            (keys::TARGET_SCORE, self.matching.target_score.to_string()),
            (keys::FUZZY_MIN, self.matching.fuzzy_min.to_string()),
            (keys::FUZZY_MAX, self.matching.fuzzy_max.to_string()),
            (keys::VALID_URL_PREFIX, self.intake.valid_url_prefix.clone()),
            (keys::UPLOAD_DIR, self.intake.upload_dir.clone()),
            (keys::MAX_PER_DAY_IP, self.intake.max_per_day_origin.to_string()),
        ]
    }
}

/// `DATABASE_URL` takes precedence over the configured database URL
fn apply_database_url(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Config::builder()
            .add_source(settings)
            .set_override("database.url", url)?
            .build(),
        Err(_) => Ok(settings),
    }
}
