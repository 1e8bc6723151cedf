//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ConfigValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Founder discount must be between 0 and 100 percent, got {0}")]
    InvalidFounderDiscount(u8),

    #[error("Founder limit exceeds maximum allowed ({max})")]
    FounderLimitTooLarge { max: u32 },

    #[error("Rollover batch size must be at least 1")]
    InvalidBatchSize,

    #[error("Invalid payment gateway URL")]
    InvalidGatewayUrl,

    #[error("Payment gateway must use HTTPS outside localhost")]
    GatewayMustBeHttps,

    #[error("Invalid log filter: {0}")]
    InvalidLogFilter(String),
}
