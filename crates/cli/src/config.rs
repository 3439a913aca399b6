//! `claude-nodes.toml` loading.

use std::path::Path;

use anyhow::Context;
use llm::AnthropicConfig;
use pipeline::{InvalidConfiguration, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};

/// File read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "claude-nodes.toml";

/// Top-level configuration. Every table and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Provider settings.
    pub anthropic: AnthropicConfig,
    /// Values applied to node inputs that do not set them.
    pub defaults: Defaults,
    /// Logging and trace export.
    pub telemetry: TelemetryConfig,
}

/// `[defaults]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Model used when a node's inputs do not name one.
    pub model: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, multi-line.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// `[telemetry]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Log line format.
    pub log_format: LogFormat,
    /// OTLP gRPC endpoint; spans are exported only when set.
    pub otlp_endpoint: Option<String>,
    /// `service.name` resource attribute on exported spans.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            otlp_endpoint: None,
            service_name: "claude-nodes".to_string(),
        }
    }
}

impl CliConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("invalid configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or [`DEFAULT_CONFIG_FILE`] if it exists, or defaults.
    ///
    /// An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    fn validate(&self) -> Result<(), InvalidConfiguration> {
        self.anthropic.validate()?;
        if self.defaults.model.trim().is_empty() {
            return Err(InvalidConfiguration::new("defaults.model", "must not be empty"));
        }
        if let Some(endpoint) = &self.telemetry.otlp_endpoint {
            if endpoint.trim().is_empty() {
                return Err(InvalidConfiguration::new(
                    "telemetry.otlp_endpoint",
                    "must not be empty when set",
                ));
            }
        }
        Ok(())
    }
}
