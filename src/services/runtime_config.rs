use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::MatchSettings;
use crate::services::store::StoreResult;

/// Runtime configuration keys
pub mod keys {
    pub const TARGET_SCORE: &str = "target_score";
    pub const FUZZY_MIN: &str = "fuzzy_min";
    pub const FUZZY_MAX: &str = "fuzzy_max";
    pub const VALID_URL_PREFIX: &str = "valid_url_prefix";
    pub const UPLOAD_DIR: &str = "upload_dir";
    pub const MAX_PER_DAY_IP: &str = "max_per_day_ip";
}

pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";
pub const DEFAULT_MAX_PER_DAY: i64 = 3;

/// Operator-adjustable key/value settings
///
/// Values are read fresh on every call; implementations must not cache.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn get_value(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_value(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Insert `value` only if `key` has no value yet
    async fn seed_value(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Integer value of `key`, or `default` when missing or unparsable
    async fn get_int(&self, key: &str, default: i64) -> StoreResult<i64> {
        let value = self.get_value(key).await?;
        Ok(value
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(default))
    }
}

impl MatchSettings {
    /// Read the score rules currently in effect
    pub async fn read(config: &dyn ConfigProvider) -> StoreResult<Self> {
        let defaults = MatchSettings::default();
        let target_score = config.get_int(keys::TARGET_SCORE, defaults.target_score as i64).await?;
        let fuzzy_min = config.get_int(keys::FUZZY_MIN, defaults.fuzzy_min as i64).await?;
        let fuzzy_max = config.get_int(keys::FUZZY_MAX, defaults.fuzzy_max as i64).await?;

        Ok(Self {
            target_score: clamp_i32(target_score),
            fuzzy_min: clamp_i32(fuzzy_min),
            fuzzy_max: clamp_i32(fuzzy_max),
        })
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Seed every runtime key that has no value yet
pub async fn seed_defaults(
    config: &dyn ConfigProvider,
    defaults: &[(&str, String)],
) -> StoreResult<()> {
    for (key, value) in defaults {
        config.seed_value(key, value).await?;
    }
    tracing::info!("Seeded {} runtime configuration defaults", defaults.len());
    Ok(())
}

/// In-process configuration provider
#[derive(Debug, Default)]
pub struct InMemoryConfig {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ConfigProvider for InMemoryConfig {
    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_value(&self, key: &str, value: &str) -> StoreResult<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn seed_value(&self, key: &str, value: &str) -> StoreResult<()> {
        self.values
            .write()
            .await
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
        Ok(())
    }
}
