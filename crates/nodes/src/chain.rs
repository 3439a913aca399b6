//! Prompt chaining.
//!
//! Runs 1 to [`MAX_CHAIN_STEPS`] steps strictly in order, optionally passing
//! the outputs of earlier steps into later prompts, then merges the outputs
//! according to a [`CombinationMode`]. Any failure is fatal to the chain.

use pipeline::{
    execute_step, ChainError, CombinationMode, CompletionService, Creativity, ImageRef,
    InvalidConfiguration, ModelId, StepRequest, StepResult, MAX_CHAIN_STEPS,
};
use tracing::{debug, info, warn};

/// Separator placed between step outputs in [`CombinationMode::Append`].
pub const APPEND_SEPARATOR: &str = "\n\n";

/// Separator placed between entries of the intermediate transcript.
pub const INTERMEDIATE_SEPARATOR: &str = "\n---\n";

/// One step of a prompt chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    prompt: String,
    images: Vec<ImageRef>,
    pass_context: bool,
}

impl ChainStep {
    /// Creates a text-only step that receives prior outputs.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
            pass_context: true,
        }
    }

    /// Attaches images to this step's request.
    #[must_use]
    pub fn with_images(mut self, images: Vec<ImageRef>) -> Self {
        self.images = images;
        self
    }

    /// Sets whether prior step outputs are appended to this step's prompt.
    #[must_use]
    pub fn with_context_passing(mut self, enabled: bool) -> Self {
        self.pass_context = enabled;
        self
    }

    /// Returns the step's static prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Returns `true` if prior outputs are appended to this step.
    pub fn passes_context(&self) -> bool {
        self.pass_context
    }
}

/// A validated chain: 1 to [`MAX_CHAIN_STEPS`] steps plus how to merge them.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainPlan {
    steps: Vec<ChainStep>,
    combination: CombinationMode,
    input_text: String,
    model: ModelId,
    creativity: Creativity,
}

impl ChainPlan {
    /// Creates a plan.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfiguration`] if `steps` is empty or longer than
    /// [`MAX_CHAIN_STEPS`].
    pub fn new(
        steps: Vec<ChainStep>,
        combination: CombinationMode,
    ) -> Result<Self, InvalidConfiguration> {
        if steps.is_empty() || steps.len() > MAX_CHAIN_STEPS {
            return Err(InvalidConfiguration::new(
                "steps",
                format!(
                    "a chain needs between 1 and {MAX_CHAIN_STEPS} steps, got {}",
                    steps.len()
                ),
            ));
        }
        Ok(Self {
            steps,
            combination,
            input_text: String::new(),
            model: ModelId::default(),
            creativity: Creativity::default(),
        })
    }

    /// Sets text given to the first step and to every context-passing step.
    #[must_use]
    pub fn with_input_text(mut self, input_text: impl Into<String>) -> Self {
        self.input_text = input_text.into();
        self
    }

    /// Sets the model used for every call.
    #[must_use]
    pub fn with_model(mut self, model: ModelId) -> Self {
        self.model = model;
        self
    }

    /// Sets the creativity used for every call.
    #[must_use]
    pub fn with_creativity(mut self, creativity: Creativity) -> Self {
        self.creativity = creativity;
        self
    }

    /// Returns the steps in execution order.
    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    /// Returns the combination mode.
    pub fn combination(&self) -> CombinationMode {
        self.combination
    }
}

/// Result of a successful chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    /// Merged text.
    pub final_text: String,
    /// Labelled step outputs (`"Step k: ..."`) joined by
    /// [`INTERMEDIATE_SEPARATOR`].
    pub intermediate: String,
    /// Every step, in execution order.
    pub steps: Vec<StepResult>,
}

/// Outputs accumulated so far; appended to, never reordered.
struct ChainState {
    results: Vec<StepResult>,
}

impl ChainState {
    fn outputs(&self) -> impl Iterator<Item = &str> {
        self.results.iter().filter_map(StepResult::output)
    }

    fn labelled(&self) -> Vec<String> {
        self.outputs()
            .enumerate()
            .map(|(i, output)| format!("Step {}: {output}", i + 1))
            .collect()
    }
}

fn step_prompt(plan: &ChainPlan, number: usize, step: &ChainStep, state: &ChainState) -> String {
    let mut prompt = step.prompt.clone();
    let has_input = !plan.input_text.trim().is_empty();

    if number == 1 {
        if has_input {
            prompt.push_str(&format!("\n\nInput: {}", plan.input_text));
        }
    } else if step.pass_context {
        let mut context = Vec::with_capacity(number);
        if has_input {
            context.push(format!("Initial input: {}", plan.input_text));
        }
        context.extend(
            state
                .outputs()
                .enumerate()
                .map(|(i, output)| format!("Step {} result: {output}", i + 1)),
        );
        prompt.push_str(&format!("\n\nPrevious results:\n{}", context.join("\n")));
    }
    prompt
}

fn step_system_prompt(number: usize, total: usize) -> String {
    if number == total && total > 1 {
        format!("You are performing the final step ({number} of {total}) of a multi-step analysis.")
    } else {
        format!("You are performing step {number} of {total} of a multi-step analysis.")
    }
}

fn combination_request(plan: &ChainPlan, transcript: &str) -> Option<StepRequest> {
    let (prompt, system) = match plan.combination {
        CombinationMode::Append => return None,
        CombinationMode::Synthesize => (
            format!("Synthesize these analysis steps into a coherent whole:\n\n{transcript}"),
            "Create a unified analysis from multiple perspectives.",
        ),
        CombinationMode::ExtractKeyPoints => (
            format!(
                "Extract the key points from this analysis as a concise bullet list:\n\n{transcript}"
            ),
            "Extract and organize the most important insights.",
        ),
        CombinationMode::StructuredMerge => (
            format!(
                "Merge these analysis steps into one structured Markdown document. \
                 Start with a '# Analysis Results' heading and give each theme its own \
                 '##' section:\n\n{transcript}"
            ),
            "Produce a well-organized, sectioned Markdown composite.",
        ),
    };
    Some(
        StepRequest::new(prompt, plan.model.clone(), plan.creativity).with_system(system),
    )
}

/// Runs `plan` step by step and merges the outputs.
///
/// Makes one completion call per step, plus one more for combination modes
/// other than [`CombinationMode::Append`].
///
/// # Errors
///
/// Returns [`ChainError::StepFailed`] naming the 1-based step as soon as a
/// step fails; later steps are not run and no text is returned. Returns
/// [`ChainError::CombinationFailed`] if the final combination call fails.
pub async fn run_chain(
    service: &dyn CompletionService,
    plan: &ChainPlan,
) -> Result<ChainOutcome, ChainError> {
    let total = plan.steps.len();
    info!(steps = total, combination = %plan.combination, model = %plan.model, "Starting chain");

    let mut state = ChainState {
        results: Vec::with_capacity(total),
    };

    for (offset, step) in plan.steps.iter().enumerate() {
        let number = offset + 1;
        let request = StepRequest::new(
            step_prompt(plan, number, step, &state),
            plan.model.clone(),
            plan.creativity,
        )
        .with_system(step_system_prompt(number, total))
        .with_images(step.images.clone());

        let result = execute_step(service, number, &request).await;
        if let Some(error) = result.error() {
            warn!(step = number, kind = %error.kind(), error = %error, "Chain step failed");
            return Err(ChainError::StepFailed {
                step: number,
                kind: error.kind(),
                source: error.clone(),
            });
        }
        debug!(step = number, elapsed_ms = result.elapsed_ms(), "Chain step completed");
        state.results.push(result);
    }

    let labelled = state.labelled();
    let intermediate = labelled.join(INTERMEDIATE_SEPARATOR);

    let final_text = match combination_request(plan, &labelled.join("\n")) {
        None => state.outputs().collect::<Vec<_>>().join(APPEND_SEPARATOR),
        Some(request) => match service.complete(&request).await {
            Ok(completion) => completion.text,
            Err(error) => {
                warn!(combination = %plan.combination, error = %error, "Chain combination failed");
                return Err(ChainError::CombinationFailed {
                    mode: plan.combination,
                    kind: error.kind(),
                    source: error,
                });
            }
        },
    };

    info!(steps = total, "Chain finished");
    Ok(ChainOutcome {
        final_text,
        intermediate,
        steps: state.results,
    })
}
