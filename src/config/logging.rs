//! Logging configuration

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use super::error::ConfigValidationError;

pub const DEFAULT_LOG_FILTER: &str = "subscription_engine=info";

/// Settings for [`crate::telemetry::init_tracing`].
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `subscription_engine=debug,sqlx=warn`
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Emit JSON lines instead of the compact human format
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        EnvFilter::try_new(&self.filter)
            .map(|_| ())
            .map_err(|e| ConfigValidationError::InvalidLogFilter(e.to_string()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
