//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ConfigValidationError;
use crate::adapters::payment::{HttpGatewayConfig, DEFAULT_BASE_URL};

/// Gateway credentials and endpoint.
///
/// Secrets are wrapped so they never show up in `Debug` output or logs.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub api_key: SecretString,

    pub webhook_secret: SecretString,
}

impl PaymentConfig {
    pub fn is_test_mode(&self) -> bool {
        self.api_key.expose_secret().starts_with("sk_test_")
    }

    pub fn gateway_config(&self) -> HttpGatewayConfig {
        HttpGatewayConfig::new(
            self.api_key.expose_secret().clone(),
            self.webhook_secret.expose_secret().clone(),
        )
        .with_base_url(self.base_url.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired("PAYMENT__API_KEY"));
        }
        if self.webhook_secret.expose_secret().trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired("PAYMENT__WEBHOOK_SECRET"));
        }

        let Some((scheme, rest)) = self.base_url.split_once("://") else {
            return Err(ConfigValidationError::InvalidGatewayUrl);
        };
        if rest.is_empty() {
            return Err(ConfigValidationError::InvalidGatewayUrl);
        }
        match scheme {
            "https" => Ok(()),
            "http" if is_local(rest) => Ok(()),
            "http" => Err(ConfigValidationError::GatewayMustBeHttps),
            _ => Err(ConfigValidationError::InvalidGatewayUrl),
        }
    }
}

fn is_local(host_and_path: &str) -> bool {
    host_and_path.starts_with("localhost") || host_and_path.starts_with("127.0.0.1")
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> PaymentConfig {
        PaymentConfig {
            base_url: base_url.to_string(),
            api_key: SecretString::new("sk_test_abc".to_string()),
            webhook_secret: SecretString::new("whsec_xyz".to_string()),
        }
    }

    #[test]
    fn default_url_is_valid() {
        assert!(config(DEFAULT_BASE_URL).validate().is_ok());
        assert!(config(DEFAULT_BASE_URL).is_test_mode());
    }

    #[test]
    fn plain_http_only_for_localhost() {
        assert!(config("http://localhost:12111").validate().is_ok());
        assert_eq!(
            config("http://gateway.example.com").validate(),
            Err(ConfigValidationError::GatewayMustBeHttps)
        );
        assert_eq!(
            config("ftp://gateway.example.com").validate(),
            Err(ConfigValidationError::InvalidGatewayUrl)
        );
        assert_eq!(config("gateway").validate(), Err(ConfigValidationError::InvalidGatewayUrl));
    }

    #[test]
    fn empty_secrets_are_missing() {
        let mut c = config(DEFAULT_BASE_URL);
        c.webhook_secret = SecretString::new(String::new());
        assert_eq!(
            c.validate(),
            Err(ConfigValidationError::MissingRequired("PAYMENT__WEBHOOK_SECRET"))
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let debug = format!("{:?}", config(DEFAULT_BASE_URL));
        assert!(!debug.contains("sk_test_abc"));
        assert!(!debug.contains("whsec_xyz"));
    }

    #[test]
    fn builds_gateway_config() {
        let gateway = config("http://localhost:12111/").gateway_config();
        assert_eq!(gateway.base_url(), "http://localhost:12111");
    }
}
