//! Completion-service adapter for Anthropic's Messages API.
//!
//! Implements [`pipeline::CompletionService`] with [`AnthropicProvider`].
//! Orchestrators in the `nodes` crate never see HTTP; they see only the trait.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response
//! parsing, status-code classification, and exponential back-off live here.

mod anthropic;
mod config;
mod error;

pub use anthropic::{AnthropicProvider, ANTHROPIC_VERSION};
pub use config::{AnthropicConfig, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS};
pub use error::LlmError;
