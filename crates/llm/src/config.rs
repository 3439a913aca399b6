use std::time::Duration;

use pipeline::InvalidConfiguration;
use serde::{Deserialize, Serialize};

/// Default Anthropic Messages API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// Environment variable read for the API key unless configured otherwise.
pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Output token ceiling sent with every request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Settings for [`AnthropicProvider`](crate::AnthropicProvider), read from the
/// `[anthropic]` table of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Messages API endpoint.
    pub base_url: String,
    /// Output token ceiling.
    pub max_tokens: u32,
    /// Whole-request timeout.
    pub timeout_secs: u64,
    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,
    /// Back-off before the first retry; doubles on each further retry.
    pub initial_backoff_ms: u64,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: 120,
            max_retries: 2,
            initial_backoff_ms: 1000,
        }
    }
}

impl AnthropicConfig {
    /// Whole-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Back-off before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }

    /// Checks values that would make every request fail.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfiguration`] naming the offending field.
    pub fn validate(&self) -> Result<(), InvalidConfiguration> {
        if self.base_url.trim().is_empty() {
            return Err(InvalidConfiguration::new("anthropic.base_url", "must not be empty"));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(InvalidConfiguration::new("anthropic.api_key_env", "must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(InvalidConfiguration::new("anthropic.max_tokens", "must be positive"));
        }
        if self.timeout_secs == 0 {
            return Err(InvalidConfiguration::new("anthropic.timeout_secs", "must be positive"));
        }
        Ok(())
    }
}
