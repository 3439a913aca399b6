use thiserror::Error;

/// Failure to construct a provider. Per-call failures are
/// [`pipeline::CompletionError`]s.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The environment variable that should hold the API key is unset or empty.
    #[error(
        "Anthropic API key not found in environment variable '{env}'. \
         Set it or configure a different api_key_env in [anthropic]."
    )]
    MissingApiKey {
        /// Name of the variable that was read.
        env: String,
    },

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// A configuration value is out of range.
    #[error(transparent)]
    InvalidConfiguration(#[from] pipeline::InvalidConfiguration),
}
