//! Payment gateway configuration
//!
//! Both environments are configured up front; which one is live is
//! decided per request from the `gateway_config` row.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::billing::GatewayMode;

const SANDBOX_BASE_URL: &str = "https://sandbox.cashfree.com/pg";
const PRODUCTION_BASE_URL: &str = "https://api.cashfree.com/pg";

/// Credentials and endpoint for one gateway environment
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEnvironmentConfig {
    /// Empty after deserialization means "use the environment's default".
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub client_id: String,

    /// Client secret; also the webhook signing key
    #[serde(default = "empty_secret")]
    pub client_secret: SecretString,
}

impl GatewayEnvironmentConfig {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            client_id: String::new(),
            client_secret: empty_secret(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.expose_secret().is_empty()
    }

    fn validate(&self, name: &'static str, require_https: bool) -> Result<(), ValidationError> {
        let parsed = url::Url::parse(&self.base_url).map_err(|_| ValidationError::InvalidUrl {
            field: name,
            value: self.base_url.clone(),
        })?;
        if require_https && parsed.scheme() != "https" {
            return Err(ValidationError::GatewayMustBeHttps(name));
        }
        let has_id = !self.client_id.is_empty();
        let has_secret = !self.client_secret.expose_secret().is_empty();
        if has_id != has_secret {
            return Err(ValidationError::IncompleteCredentials(name));
        }
        Ok(())
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_sandbox", deserialize_with = "sandbox_section")]
    pub sandbox: GatewayEnvironmentConfig,

    #[serde(default = "default_production", deserialize_with = "production_section")]
    pub production: GatewayEnvironmentConfig,

    /// Sent as `x-api-version` on every call
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Deadline for a single outbound call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Reject webhook signatures older than this. Defaults to seven days;
    /// an explicit `null` disables the check.
    #[serde(default = "default_webhook_max_age")]
    pub webhook_max_age_secs: Option<i64>,
}

impl GatewayConfig {
    pub fn environment(&self, mode: GatewayMode) -> &GatewayEnvironmentConfig {
        match mode {
            GatewayMode::Sandbox => &self.sandbox,
            GatewayMode::Production => &self.production,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.sandbox.validate("gateway.sandbox", false)?;
        self.production.validate("gateway.production", true)?;
        if !self.sandbox.has_credentials() {
            return Err(ValidationError::MissingRequired("GATEWAY__SANDBOX__CLIENT_ID"));
        }
        if self.api_version.trim().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__API_VERSION"));
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 60 {
            return Err(ValidationError::OutOfRange {
                field: "gateway.request_timeout_secs",
                min: 1,
                max: 60,
            });
        }
        if let Some(age) = self.webhook_max_age_secs {
            if age <= 0 {
                return Err(ValidationError::OutOfRange {
                    field: "gateway.webhook_max_age_secs",
                    min: 1,
                    max: i64::MAX,
                });
            }
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sandbox: default_sandbox(),
            production: default_production(),
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout(),
            webhook_max_age_secs: default_webhook_max_age(),
        }
    }
}

/// Longest the gateway keeps retrying a delivery.
pub const DEFAULT_WEBHOOK_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

fn default_webhook_max_age() -> Option<i64> {
    Some(DEFAULT_WEBHOOK_MAX_AGE_SECS)
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

fn default_sandbox() -> GatewayEnvironmentConfig {
    GatewayEnvironmentConfig::new(SANDBOX_BASE_URL)
}

fn default_production() -> GatewayEnvironmentConfig {
    GatewayEnvironmentConfig::new(PRODUCTION_BASE_URL)
}

// A partial section (credentials only) keeps the environment's base URL.
fn sandbox_section<'de, D>(deserializer: D) -> Result<GatewayEnvironmentConfig, D::Error>
where
    D: Deserializer<'de>,
{
    section_with_default_url(deserializer, SANDBOX_BASE_URL)
}

fn production_section<'de, D>(deserializer: D) -> Result<GatewayEnvironmentConfig, D::Error>
where
    D: Deserializer<'de>,
{
    section_with_default_url(deserializer, PRODUCTION_BASE_URL)
}

fn section_with_default_url<'de, D>(
    deserializer: D,
    default_url: &str,
) -> Result<GatewayEnvironmentConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let mut section = GatewayEnvironmentConfig::deserialize(deserializer)?;
    if section.base_url.trim().is_empty() {
        section.base_url = default_url.to_string();
    }
    Ok(section)
}

fn default_api_version() -> String {
    "2023-08-01".to_string()
}

fn default_request_timeout() -> u64 {
    10
}
