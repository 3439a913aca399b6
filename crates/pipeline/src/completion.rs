//! The completion-service port and the request/result types that cross it.
//!
//! Orchestration code only ever sees [`CompletionService`]; HTTP transport,
//! authentication, and retry live in the `llm` crate behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CompletionError, Creativity, ImageRef, ModelId, Timestamp, TokenCount};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One call to the completion service.
///
/// Built per step by the composer or an orchestrator and never mutated after
/// construction; the `with_*` methods consume and return the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRequest {
    prompt: String,
    system: Option<String>,
    images: Vec<ImageRef>,
    model: ModelId,
    creativity: Creativity,
}

impl StepRequest {
    /// Creates a text-only request with no system prompt.
    pub fn new(prompt: impl Into<String>, model: ModelId, creativity: Creativity) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            images: Vec::new(),
            model,
            creativity,
        }
    }

    /// Sets the system prompt. Blank prompts are dropped.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.system = if system.trim().is_empty() {
            None
        } else {
            Some(system)
        };
        self
    }

    /// Attaches images, in order, ahead of the prompt text.
    #[must_use]
    pub fn with_images(mut self, images: Vec<ImageRef>) -> Self {
        self.images = images;
        self
    }

    /// Returns the user prompt text.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Returns the system prompt, if any.
    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    /// Returns the attached images in order.
    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    /// Returns the model this request targets.
    pub fn model(&self) -> &ModelId {
        &self.model
    }

    /// Returns the requested creativity.
    pub fn creativity(&self) -> Creativity {
        self.creativity
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Successful response from the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    pub text: String,
    /// Input tokens consumed, when the provider reports them.
    pub input_tokens: Option<TokenCount>,
    /// Output tokens generated, when the provider reports them.
    pub output_tokens: Option<TokenCount>,
}

impl Completion {
    /// Creates a completion with no usage information.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            input_tokens: None,
            output_tokens: None,
        }
    }

    /// Attaches token usage.
    #[must_use]
    pub fn with_usage(mut self, input: TokenCount, output: TokenCount) -> Self {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
        self
    }
}

// ---------------------------------------------------------------------------
// Step result
// ---------------------------------------------------------------------------

/// Record of one executed step (a refinement pass or a chain step).
///
/// Appended to orchestrator state once the step finishes and never modified
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 1-based position of the step in its run.
    pub index: usize,
    /// Output text on success, the failure otherwise.
    pub outcome: Result<String, CompletionError>,
    /// When the call was issued.
    pub started_at: Timestamp,
    /// When the call returned.
    pub finished_at: Timestamp,
}

impl StepResult {
    /// Returns `true` if the step produced output.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns the output text if the step succeeded.
    pub fn output(&self) -> Option<&str> {
        self.outcome.as_ref().ok().map(String::as_str)
    }

    /// Returns the failure if the step failed.
    pub fn error(&self) -> Option<&CompletionError> {
        self.outcome.as_ref().err()
    }

    /// Milliseconds the call took.
    pub fn elapsed_ms(&self) -> u64 {
        self.finished_at.millis_since(self.started_at)
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Text/vision completion service.
///
/// Implementations own transport, authentication, timeouts, and retry. A call
/// is treated as atomic: when it returns an error, no compensation is needed.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Runs one completion.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError`] if the provider throttles the request,
    /// rejects the credentials or an image, refuses the request, or cannot be
    /// reached.
    async fn complete(&self, request: &StepRequest) -> Result<Completion, CompletionError>;
}

/// Runs `request` against `service` and records the outcome as a
/// [`StepResult`] with the given 1-based index.
pub async fn execute_step(
    service: &dyn CompletionService,
    index: usize,
    request: &StepRequest,
) -> StepResult {
    let started_at = Timestamp::now();
    let outcome = service
        .complete(request)
        .await
        .map(|completion| completion.text);
    StepResult {
        index,
        outcome,
        started_at,
        finished_at: Timestamp::now(),
    }
}
