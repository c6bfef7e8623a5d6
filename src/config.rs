//! Provider-level configuration.
//!
//! ```hcl
//! provider "census" {
//!   access_token = var.census_token
//!   base_url     = "https://app.getcensus.com/api/v1"
//! }
//! ```
//!
//! The provider only validates and records these settings; the HTTP client
//! that consumes them lives behind [`crate::api::SyncApi`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::validation;

/// Default Census API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://app.getcensus.com/api/v1";

/// Default request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings from the `provider` block.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API endpoint. Defaults to [`DEFAULT_BASE_URL`].
    pub base_url: Option<String>,
    /// Personal access token.
    pub access_token: Option<String>,
    /// Per-request timeout. Defaults to [`DEFAULT_TIMEOUT_SECS`].
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url())
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout().as_secs())
            .finish()
    }
}

impl ProviderConfig {
    /// Parse and check a `provider` block. `null` yields the defaults.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        if let Err(diagnostics) = validation::validate_result(&provider_schema(), value) {
            return Err(ProviderError::Configuration(summarize(&diagnostics)));
        }
        let config: ProviderConfig = match value {
            Value::Null => ProviderConfig::default(),
            other => serde_json::from_value(other.clone())?,
        };

        let base_url = config.base_url();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ProviderError::Configuration(format!(
                "base_url must be an http(s) URL, got '{}'",
                base_url
            )));
        }
        if config.timeout_secs == Some(0) {
            return Err(ProviderError::Configuration(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    /// The API endpoint, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// Schema of the `provider` block.
pub fn provider_schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "base_url",
            Attribute::optional_string().with_description("Census API endpoint"),
        )
        .with_attribute(
            "access_token",
            Attribute::optional_string()
                .sensitive()
                .with_description("Census personal access token"),
        )
        .with_attribute(
            "timeout_secs",
            Attribute::optional_int64().with_description("Per-request timeout in seconds"),
        )
}

pub(crate) fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| match &d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
