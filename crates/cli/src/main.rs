//! `claude-nodes` command-line entry point.
//!
//! This binary is the composition root:
//!
//! 1. **Parse configuration**: load `claude-nodes.toml` (or `--config`) and
//!    validate it.
//! 2. **Wire observability**: `tracing-subscriber` with an `EnvFilter`, a
//!    pretty or JSON formatter, and an optional OpenTelemetry OTLP exporter.
//!    Every span and event emitted by the workspace flows through it.
//! 3. **Construct infrastructure**: an `AnthropicProvider` from the
//!    `[anthropic]` table, injected into the node registry.
//! 4. **Dispatch** the `list` or `run` subcommand.

mod commands;
mod config;
mod observability;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nodes::NodeRegistry;
use serde_json::Value;

use crate::config::CliConfig;

#[derive(Debug, Parser)]
#[command(name = "claude-nodes", version, about = "Run Claude prompt nodes from the command line")]
struct Cli {
    /// Configuration file. Defaults to ./claude-nodes.toml when present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the available node types.
    List {
        /// Print full descriptors as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run one node and print its outputs as JSON.
    Run {
        /// Node type id, e.g. `prompt_chain`.
        node_type: String,

        /// JSON object file with the node's inputs.
        #[arg(long, value_name = "FILE")]
        inputs: Option<PathBuf>,

        /// Set one input; the value is parsed as JSON when possible.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = commands::parse_assignment)]
        set: Vec<(String, Value)>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    let telemetry = observability::init(&config.telemetry)?;

    let registry = NodeRegistry::with_builtin_nodes();
    let result = match cli.command {
        Command::List { json } => commands::list(&registry, json),
        Command::Run {
            node_type,
            inputs,
            set,
        } => match commands::prepare_inputs(inputs.as_deref(), set, &config) {
            Ok(inputs) => commands::run(&registry, &config, &node_type, &inputs).await,
            Err(error) => Err(error),
        },
    };

    telemetry.shutdown();
    result
}
