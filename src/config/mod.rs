//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the `config`
//! and `dotenvy` crates. Variables use the `SUBSCRIPTION_ENGINE` prefix and
//! `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use subscription_engine::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod database;
mod error;
mod logging;
mod payment;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ConfigValidationError};
pub use logging::{LoggingConfig, DEFAULT_LOG_FILTER};
pub use payment::PaymentConfig;

use serde::Deserialize;

const ENV_PREFIX: &str = "SUBSCRIPTION_ENGINE";

/// Root configuration.
///
/// `database` and `payment` are optional so the engine can run on the
/// in-memory adapters and the mock gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub billing: BillingConfig,

    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub payment: Option<PaymentConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// 1. Loads `.env` if present
    /// 2. Reads `SUBSCRIPTION_ENGINE__*` variables
    /// 3. Deserializes into the typed sections
    ///
    /// - `SUBSCRIPTION_ENGINE__BILLING__FOUNDER_DISCOUNT_PERCENT=20` -> `billing.founder_discount_percent`
    /// - `SUBSCRIPTION_ENGINE__DATABASE__URL=...` -> `database.url`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix(ENV_PREFIX)
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Loads and validates in one step.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation of every present section.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.billing.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        if let Some(payment) = &self.payment {
            payment.validate()?;
        }
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::AccountKind;
    use std::env;
    use std::sync::Mutex;

    // Environment variables are process-global.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SUBSCRIPTION_ENGINE__BILLING__BUSINESS_FOUNDER_LIMIT",
        "SUBSCRIPTION_ENGINE__BILLING__FOUNDER_DISCOUNT_PERCENT",
        "SUBSCRIPTION_ENGINE__DATABASE__URL",
        "SUBSCRIPTION_ENGINE__DATABASE__MAX_CONNECTIONS",
        "SUBSCRIPTION_ENGINE__PAYMENT__API_KEY",
        "SUBSCRIPTION_ENGINE__PAYMENT__WEBHOOK_SECRET",
        "SUBSCRIPTION_ENGINE__LOGGING__JSON",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = AppConfig::load().unwrap();

        assert_eq!(config.billing.founder_limit(AccountKind::Professional), 1000);
        assert!(config.database.is_none());
        assert!(config.payment.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nested_variables_are_read() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("SUBSCRIPTION_ENGINE__BILLING__BUSINESS_FOUNDER_LIMIT", "250");
        env::set_var("SUBSCRIPTION_ENGINE__DATABASE__URL", "postgres://localhost/subs");
        env::set_var("SUBSCRIPTION_ENGINE__DATABASE__MAX_CONNECTIONS", "4");
        env::set_var("SUBSCRIPTION_ENGINE__PAYMENT__API_KEY", "sk_test_1");
        env::set_var("SUBSCRIPTION_ENGINE__PAYMENT__WEBHOOK_SECRET", "whsec_1");
        env::set_var("SUBSCRIPTION_ENGINE__LOGGING__JSON", "true");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.billing.founder_limit(AccountKind::Business), 250);
        let database = config.database.as_ref().unwrap();
        assert_eq!(database.url, "postgres://localhost/subs");
        assert_eq!(database.max_connections, 4);
        assert!(config.payment.as_ref().unwrap().is_test_mode());
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("SUBSCRIPTION_ENGINE__BILLING__FOUNDER_DISCOUNT_PERCENT", "150");
        let result = AppConfig::load_validated();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::ValidationFailed(ConfigValidationError::InvalidFounderDiscount(150)))
        ));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }
}
