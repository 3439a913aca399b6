//! `list` and `run` subcommands.

use std::path::Path;

use anyhow::{bail, Context};
use async_trait::async_trait;
use llm::{AnthropicProvider, LlmError};
use nodes::registry::MODEL_INPUT;
use nodes::{NodeInputs, NodeRegistry};
use pipeline::{Completion, CompletionError, CompletionService, StepRequest};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::CliConfig;

/// Parses a `KEY=VALUE` argument. The value is read as JSON when it parses,
/// otherwise taken as a plain string.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Builds node inputs from an optional JSON file, `--set` overrides, and the
/// configured default model.
pub fn prepare_inputs(
    file: Option<&Path>,
    assignments: Vec<(String, Value)>,
    config: &CliConfig,
) -> anyhow::Result<NodeInputs> {
    let mut inputs = match file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<NodeInputs>(&text)
                .with_context(|| format!("{} must contain a JSON object", path.display()))?
        }
        None => NodeInputs::new(),
    };
    for (key, value) in assignments {
        inputs.insert(key, value);
    }
    if !inputs.contains(MODEL_INPUT) {
        inputs.insert(MODEL_INPUT, config.defaults.model.clone());
    }
    Ok(inputs)
}

/// Prints every registered node.
pub fn list(registry: &NodeRegistry, json: bool) -> anyhow::Result<()> {
    let descriptors = registry.descriptors();
    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }
    for descriptor in descriptors {
        println!(
            "{:<24} {:<24} {}",
            descriptor.type_id, descriptor.display_name, descriptor.category
        );
    }
    Ok(())
}

/// Runs one node and prints its outputs as pretty JSON.
pub async fn run(
    registry: &NodeRegistry,
    config: &CliConfig,
    node_type: &str,
    inputs: &NodeInputs,
) -> anyhow::Result<()> {
    if registry.get(node_type).is_none() {
        bail!("unknown node type '{node_type}'; run `claude-nodes list` to see the available nodes");
    }
    let service = completion_service(config)?;

    let outputs = registry
        .execute(node_type, inputs, service.as_ref())
        .await
        .with_context(|| format!("node '{node_type}' failed"))?;

    info!(node_type, outputs = outputs.len(), "Node run complete");
    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}

fn completion_service(config: &CliConfig) -> anyhow::Result<Box<dyn CompletionService>> {
    match AnthropicProvider::from_env(config.anthropic.clone()) {
        Ok(provider) => Ok(Box::new(provider)),
        Err(LlmError::MissingApiKey { env }) => {
            warn!(env = %env, "No API key configured; nodes that call the model will fail");
            Ok(Box::new(Unconfigured { env }))
        }
        Err(error) => Err(error.into()),
    }
}

/// Stands in for the provider when no API key is available, so nodes that
/// never call the model still run.
struct Unconfigured {
    env: String,
}

#[async_trait]
impl CompletionService for Unconfigured {
    async fn complete(&self, _request: &StepRequest) -> Result<Completion, CompletionError> {
        Err(CompletionError::AuthFailed {
            message: format!("environment variable '{}' is not set", self.env),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assignment_reads_json_or_string() {
        assert_eq!(
            parse_assignment("iteration_count=2").unwrap(),
            ("iteration_count".to_string(), json!(2))
        );
        assert_eq!(
            parse_assignment("edit_ground=false").unwrap(),
            ("edit_ground".to_string(), json!(false))
        );
        assert_eq!(
            parse_assignment("text=a fox = quick").unwrap(),
            ("text".to_string(), json!("a fox = quick"))
        );
        assert_eq!(
            parse_assignment("image={\"data\":\"AAAA\"}").unwrap().1,
            json!({"data": "AAAA"})
        );
        assert!(parse_assignment("no-equals").is_err());
        assert!(parse_assignment("=value").is_err());
    }

    #[test]
    fn test_prepare_inputs_applies_default_model_only_when_absent() {
        let config = CliConfig::default();

        let defaulted = prepare_inputs(None, vec![("text".into(), json!("hi"))], &config).unwrap();
        assert_eq!(
            defaulted.model().unwrap().as_str(),
            config.defaults.model.as_str()
        );

        let explicit = prepare_inputs(
            None,
            vec![("model".into(), json!("claude-opus-4-1-20250805"))],
            &config,
        )
        .unwrap();
        assert_eq!(explicit.model().unwrap().as_str(), "claude-opus-4-1-20250805");
    }

    #[tokio::test]
    async fn test_unconfigured_service_reports_auth_failure() {
        let service = Unconfigured {
            env: "ANTHROPIC_API_KEY".to_string(),
        };
        let request = StepRequest::new(
            "hello",
            pipeline::ModelId::default(),
            pipeline::Creativity::default(),
        );

        let err = service.complete(&request).await.unwrap_err();

        assert_eq!(err.kind(), pipeline::CompletionErrorKind::AuthFailed);
    }
}
