//! Runtime configuration.
//!
//! One flat settings struct loaded from the environment (prefix
//! `COREASON_BUDGET_`), an explicit key map (test seam), or built
//! programmatically. Loading is fatal at startup; nothing here is
//! consulted per-request.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use thiserror::Error;

use crate::ledger::ScopeKind;
use crate::pricing::ModelPrice;

/// Prefix shared by every environment variable this crate reads.
pub const ENV_PREFIX: &str = "COREASON_BUDGET_";

const KEY_REDIS_URL: &str = "REDIS_URL";
const KEY_USER_LIMIT: &str = "DAILY_USER_LIMIT_USD";
const KEY_PROJECT_LIMIT: &str = "DAILY_PROJECT_LIMIT_USD";
const KEY_GLOBAL_LIMIT: &str = "DAILY_GLOBAL_LIMIT_USD";
const KEY_USER_OVERRIDES: &str = "USER_LIMIT_OVERRIDES";
const KEY_PROJECT_OVERRIDES: &str = "PROJECT_LIMIT_OVERRIDES";
const KEY_MODEL_PRICES: &str = "CUSTOM_MODEL_PRICES";
const KEY_STORE_TIMEOUT_MS: &str = "STORE_TIMEOUT_MS";
const KEY_BIND_ADDR: &str = "BIND_ADDR";

const DEFAULT_USER_LIMIT: Decimal = dec!(10.0);
const DEFAULT_PROJECT_LIMIT: Decimal = dec!(500.0);
const DEFAULT_GLOBAL_LIMIT: Decimal = dec!(5000.0);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(2000);
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required key not found
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was not found
        key: String,
    },

    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The key with invalid value
        key: String,
        /// Error message
        message: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for the budget service.
#[derive(Clone)]
pub struct BudgetConfig {
    redis_url: SecretString,
    daily_user_limit: Decimal,
    daily_project_limit: Decimal,
    daily_global_limit: Decimal,
    user_limit_overrides: HashMap<String, Decimal>,
    project_limit_overrides: HashMap<String, Decimal>,
    custom_model_prices: HashMap<String, ModelPrice>,
    store_timeout: Duration,
    bind_addr: String,
}

impl BudgetConfig {
    /// Build a config with the given store URL and all defaults.
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: SecretString::from(redis_url.into()),
            daily_user_limit: DEFAULT_USER_LIMIT,
            daily_project_limit: DEFAULT_PROJECT_LIMIT,
            daily_global_limit: DEFAULT_GLOBAL_LIMIT,
            user_limit_overrides: HashMap::new(),
            project_limit_overrides: HashMap::new(),
            custom_model_prices: HashMap::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }

    /// Load from process environment variables (`COREASON_BUDGET_*`).
    pub fn from_env() -> ConfigResult<Self> {
        Self::load(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Load from an explicit key map, un-prefixed (`REDIS_URL`, ...).
    pub fn from_env_map(vars: &HashMap<String, String>) -> ConfigResult<Self> {
        Self::load(|key| vars.get(key).cloned())
    }

    fn load(get: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let redis_url = get(KEY_REDIS_URL).ok_or_else(|| ConfigError::NotFound {
            key: format!("{ENV_PREFIX}{KEY_REDIS_URL}"),
        })?;

        let mut config = Self::new(redis_url);
        if let Some(raw) = get(KEY_USER_LIMIT) {
            config.daily_user_limit = parse_limit(KEY_USER_LIMIT, &raw)?;
        }
        if let Some(raw) = get(KEY_PROJECT_LIMIT) {
            config.daily_project_limit = parse_limit(KEY_PROJECT_LIMIT, &raw)?;
        }
        if let Some(raw) = get(KEY_GLOBAL_LIMIT) {
            config.daily_global_limit = parse_limit(KEY_GLOBAL_LIMIT, &raw)?;
        }
        if let Some(raw) = get(KEY_USER_OVERRIDES) {
            config.user_limit_overrides = parse_limit_map(KEY_USER_OVERRIDES, &raw)?;
        }
        if let Some(raw) = get(KEY_PROJECT_OVERRIDES) {
            config.project_limit_overrides = parse_limit_map(KEY_PROJECT_OVERRIDES, &raw)?;
        }
        if let Some(raw) = get(KEY_MODEL_PRICES) {
            config.custom_model_prices =
                serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
                    key: format!("{ENV_PREFIX}{KEY_MODEL_PRICES}"),
                    message: e.to_string(),
                })?;
        }
        if let Some(raw) = get(KEY_STORE_TIMEOUT_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}{KEY_STORE_TIMEOUT_MS}"),
                message: format!("expected milliseconds as an integer, got {raw:?}"),
            })?;
            config.store_timeout = Duration::from_millis(millis);
        }
        if let Some(raw) = get(KEY_BIND_ADDR) {
            config.bind_addr = raw;
        }
        Ok(config)
    }

    /// Store address. Held as a secret; connection URLs routinely embed
    /// credentials.
    pub fn redis_url(&self) -> &SecretString {
        &self.redis_url
    }

    /// Default daily limit for a scope kind, before overrides.
    pub fn default_limit(&self, kind: ScopeKind) -> Decimal {
        match kind {
            ScopeKind::User => self.daily_user_limit,
            ScopeKind::Project => self.daily_project_limit,
            ScopeKind::Global => self.daily_global_limit,
        }
    }

    /// Effective daily limit for one user or project identifier.
    pub fn limit_for(&self, kind: ScopeKind, id: &str) -> Decimal {
        let overrides = match kind {
            ScopeKind::User => &self.user_limit_overrides,
            ScopeKind::Project => &self.project_limit_overrides,
            ScopeKind::Global => return self.daily_global_limit,
        };
        overrides
            .get(id)
            .copied()
            .unwrap_or_else(|| self.default_limit(kind))
    }

    pub fn custom_model_prices(&self) -> &HashMap<String, ModelPrice> {
        &self.custom_model_prices
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    pub fn with_user_limit(mut self, limit: Decimal) -> Self {
        self.daily_user_limit = limit;
        self
    }

    pub fn with_project_limit(mut self, limit: Decimal) -> Self {
        self.daily_project_limit = limit;
        self
    }

    pub fn with_global_limit(mut self, limit: Decimal) -> Self {
        self.daily_global_limit = limit;
        self
    }

    pub fn with_user_override(mut self, id: impl Into<String>, limit: Decimal) -> Self {
        self.user_limit_overrides.insert(id.into(), limit);
        self
    }

    pub fn with_project_override(mut self, id: impl Into<String>, limit: Decimal) -> Self {
        self.project_limit_overrides.insert(id.into(), limit);
        self
    }

    pub fn with_model_price(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.custom_model_prices.insert(model.into(), price);
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }
}

impl fmt::Debug for BudgetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BudgetConfig")
            .field("redis_url", &"<redacted>")
            .field("daily_user_limit", &self.daily_user_limit)
            .field("daily_project_limit", &self.daily_project_limit)
            .field("daily_global_limit", &self.daily_global_limit)
            .field("user_limit_overrides", &self.user_limit_overrides)
            .field("project_limit_overrides", &self.project_limit_overrides)
            .field("custom_model_prices", &self.custom_model_prices)
            .field("store_timeout", &self.store_timeout)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

fn parse_limit(key: &str, raw: &str) -> ConfigResult<Decimal> {
    let value: Decimal = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{key}"),
        message: format!("expected a decimal USD amount, got {raw:?}"),
    })?;
    if value < Decimal::ZERO {
        return Err(ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{key}"),
            message: format!("limit must be >= 0, got {value}"),
        });
    }
    Ok(value)
}

fn parse_limit_map(key: &str, raw: &str) -> ConfigResult<HashMap<String, Decimal>> {
    let map: HashMap<String, Decimal> =
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{key}"),
            message: e.to_string(),
        })?;
    if let Some((id, value)) = map.iter().find(|(_, v)| **v < Decimal::ZERO) {
        return Err(ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{key}"),
            message: format!("limit for {id:?} must be >= 0, got {value}"),
        });
    }
    Ok(map)
}
