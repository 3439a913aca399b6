//! Iterative refinement.
//!
//! Runs up to [`MAX_ITERATIONS`](pipeline::MAX_ITERATIONS) sequential passes
//! over one artifact. Each pass sends the full current text; a successful pass
//! replaces it. A failed pass ends the loop early and the last good text is
//! returned with a [`RefinementWarning`], so progress made before the failure
//! is never lost.

use pipeline::{
    execute_step, CompletionError, CompletionErrorKind, CompletionService, Creativity,
    IterationCount, ModelId, RefinementStrategy, StepRequest, StepResult,
};
use tracing::{debug, info, warn};

use crate::composer::{compose_refinement, refinement_system_prompt, RefinementPass};

/// Optimisation targets used when the caller supplies none.
pub const DEFAULT_OPTIMIZE_FOR: &str = "clarity, detail, accuracy, readability";

/// Configuration of one refinement run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefineConfig {
    /// Instruction applied on every pass.
    pub strategy: RefinementStrategy,
    /// Number of passes.
    pub iterations: IterationCount,
    /// Ask the model to keep the artifact's structure and format.
    pub preserve_structure: bool,
    /// Ask the model to build on earlier passes rather than start fresh.
    pub accumulate_improvements: bool,
    /// Free-form instructions added to every pass.
    pub instructions: String,
    /// Optimisation targets.
    pub optimize_for: String,
    /// Model used for every pass.
    pub model: ModelId,
    /// Creativity used for every pass.
    pub creativity: Creativity,
}

impl RefineConfig {
    /// Creates a configuration with default flags, model, and creativity.
    pub fn new(strategy: RefinementStrategy, iterations: IterationCount) -> Self {
        Self {
            strategy,
            iterations,
            preserve_structure: true,
            accumulate_improvements: true,
            instructions: String::new(),
            optimize_for: DEFAULT_OPTIMIZE_FOR.to_string(),
            model: ModelId::default(),
            creativity: Creativity::default(),
        }
    }

    /// Sets the preserve-structure flag.
    #[must_use]
    pub fn preserve_structure(mut self, preserve: bool) -> Self {
        self.preserve_structure = preserve;
        self
    }

    /// Sets the accumulate-improvements flag.
    #[must_use]
    pub fn accumulate_improvements(mut self, accumulate: bool) -> Self {
        self.accumulate_improvements = accumulate;
        self
    }

    /// Sets the per-pass instructions.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Sets the optimisation targets.
    #[must_use]
    pub fn optimize_for(mut self, targets: impl Into<String>) -> Self {
        self.optimize_for = targets.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn model(mut self, model: ModelId) -> Self {
        self.model = model;
        self
    }

    /// Sets the creativity.
    #[must_use]
    pub fn creativity(mut self, creativity: Creativity) -> Self {
        self.creativity = creativity;
        self
    }
}

/// A pass failed and the loop stopped early.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementWarning {
    /// 1-based number of the failed pass.
    pub iteration: u32,
    /// Kind of the failure.
    pub kind: CompletionErrorKind,
    /// The failure itself.
    pub error: CompletionError,
}

impl std::fmt::Display for RefinementWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kept = match self.iteration {
            1 => "the original text".to_string(),
            n => format!("the result of iteration {}", n - 1),
        };
        write!(
            f,
            "Iteration {} failed ({}): {}; returning {kept}",
            self.iteration, self.kind, self.error
        )
    }
}

/// Result of a refinement run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    /// Best artifact obtained: the last successful pass, or the input if none
    /// succeeded.
    pub text: String,
    /// Passes that completed successfully.
    pub iterations_completed: u32,
    /// One note per successful pass.
    pub notes: Vec<String>,
    /// Every pass that was attempted, in order.
    pub steps: Vec<StepResult>,
    /// Set when a pass failed and the loop stopped early.
    pub warning: Option<RefinementWarning>,
}

impl RefinementOutcome {
    /// Returns `true` if the loop stopped before all passes ran.
    pub fn is_partial(&self) -> bool {
        self.warning.is_some()
    }

    /// Improvement notes followed by the warning, one per line.
    pub fn improvement_notes(&self) -> String {
        let mut lines = self.notes.clone();
        if let Some(warning) = &self.warning {
            lines.push(format!("Warning: {warning}"));
        }
        lines.join("\n")
    }
}

/// State threaded through the refinement loop.
struct RefinementState {
    artifact: String,
    completed: u32,
    notes: Vec<String>,
    steps: Vec<StepResult>,
}

impl RefinementState {
    fn into_outcome(self, warning: Option<RefinementWarning>) -> RefinementOutcome {
        RefinementOutcome {
            text: self.artifact,
            iterations_completed: self.completed,
            notes: self.notes,
            steps: self.steps,
            warning,
        }
    }
}

/// Refines `initial_text` with `config.iterations` sequential passes.
///
/// Makes exactly one completion call per pass. When a call fails, no further
/// calls are made and the outcome carries the last good text plus a warning.
/// With zero iterations the input is returned unchanged and no call is made.
pub async fn refine(
    service: &dyn CompletionService,
    initial_text: &str,
    config: &RefineConfig,
) -> RefinementOutcome {
    let mut state = RefinementState {
        artifact: initial_text.to_string(),
        completed: 0,
        notes: Vec::new(),
        steps: Vec::new(),
    };

    if config.iterations.is_zero() {
        debug!("Refinement requested with zero iterations; returning input unchanged");
        return state.into_outcome(None);
    }

    info!(
        strategy = %config.strategy,
        iterations = config.iterations.get(),
        preserve_structure = config.preserve_structure,
        model = %config.model,
        "Starting refinement"
    );

    let system = refinement_system_prompt(
        &config.optimize_for,
        config.preserve_structure,
        config.accumulate_improvements,
    );

    for iteration in 1..=config.iterations.get() {
        let prompt = compose_refinement(&RefinementPass {
            artifact: &state.artifact,
            strategy: config.strategy,
            iteration,
            total: config.iterations,
            instructions: &config.instructions,
            optimize_for: &config.optimize_for,
        });
        let request = StepRequest::new(prompt, config.model.clone(), config.creativity)
            .with_system(system.clone());

        let result = execute_step(service, iteration as usize, &request).await;
        let outcome = result.outcome.clone();
        state.steps.push(result);

        match outcome {
            Ok(text) => {
                debug!(iteration, chars = text.len(), "Refinement pass completed");
                state.artifact = text;
                state.completed = iteration;
                state.notes.push(format!(
                    "Iteration {iteration}: Applied {} strategy",
                    config.strategy
                ));
            }
            Err(error) => {
                let warning = RefinementWarning {
                    iteration,
                    kind: error.kind(),
                    error,
                };
                warn!(
                    iteration,
                    kind = %warning.kind,
                    error = %warning.error,
                    "Refinement pass failed; keeping last good result"
                );
                return state.into_outcome(Some(warning));
            }
        }
    }

    info!(iterations = state.completed, "Refinement finished");
    state.into_outcome(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rate_limited, ScriptedService};

    fn config(strategy: RefinementStrategy, iterations: u32) -> RefineConfig {
        RefineConfig::new(strategy, IterationCount::new(iterations).unwrap())
    }

    #[tokio::test]
    async fn test_zero_iterations_returns_input_without_calls() {
        let service = ScriptedService::replying(&[]);

        let outcome = refine(&service, "original", &config(RefinementStrategy::Clarify, 0)).await;

        assert_eq!(outcome.text, "original");
        assert_eq!(outcome.iterations_completed, 0);
        assert!(outcome.steps.is_empty());
        assert!(!outcome.is_partial());
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_makes_exactly_one_call_per_iteration() {
        for iterations in 1..=3 {
            let service = ScriptedService::replying(&["v1", "v2", "v3"]);

            let outcome = refine(
                &service,
                "v0",
                &config(RefinementStrategy::Expand, iterations),
            )
            .await;

            assert_eq!(service.call_count(), iterations as usize);
            assert_eq!(outcome.iterations_completed, iterations);
            assert_eq!(outcome.text, format!("v{iterations}"));
            assert_eq!(outcome.notes.len(), iterations as usize);
        }
    }

    #[tokio::test]
    async fn test_each_pass_sees_the_previous_output() {
        let service = ScriptedService::replying(&["first draft", "second draft"]);

        refine(&service, "seed text", &config(RefinementStrategy::Focus, 2)).await;

        let requests = service.requests();
        assert!(requests[0].prompt().contains("seed text"));
        assert!(requests[1].prompt().contains("first draft"));
        assert!(!requests[1].prompt().contains("seed text"));
    }

    #[tokio::test]
    async fn test_failure_stops_loop_and_keeps_last_good_text() {
        let service = ScriptedService::new(vec![Ok("improved"), Err(rate_limited()), Ok("unused")]);

        let outcome = refine(&service, "draft", &config(RefinementStrategy::Clarify, 3)).await;

        assert_eq!(service.call_count(), 2);
        assert_eq!(outcome.text, "improved");
        assert_eq!(outcome.iterations_completed, 1);
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps[0].is_success());
        assert!(!outcome.steps[1].is_success());

        let warning = outcome.warning.as_ref().unwrap();
        assert_eq!(warning.iteration, 2);
        assert_eq!(warning.kind, CompletionErrorKind::RateLimited);
        assert!(outcome.improvement_notes().contains("Iteration 2 failed (rate_limited)"));
    }

    #[tokio::test]
    async fn test_first_pass_failure_returns_original_text() {
        let service = ScriptedService::new(vec![Err(pipeline::CompletionError::AuthFailed {
            message: "invalid x-api-key".to_string(),
        })]);

        let outcome = refine(&service, "untouched", &config(RefinementStrategy::Expand, 2)).await;

        assert_eq!(outcome.text, "untouched");
        assert_eq!(outcome.iterations_completed, 0);
        let warning = outcome.warning.unwrap();
        assert_eq!(warning.kind, CompletionErrorKind::AuthFailed);
        assert!(warning.to_string().contains("returning the original text"));
    }

    #[tokio::test]
    async fn test_restructure_with_preserved_structure_sends_full_artifact() {
        let long_artifact = "# Title\n\n".to_string() + &"Paragraph with detail. ".repeat(200);
        let second = format!("{long_artifact}\n\nExtra section.");
        let service = ScriptedService::replying(&[second.as_str(), "final"]);

        let refine_config = config(RefinementStrategy::Restructure, 2).preserve_structure(true);
        refine(&service, &long_artifact, &refine_config).await;

        let requests = service.requests();
        assert!(requests[0].prompt().contains(&long_artifact));
        assert!(requests[1].prompt().contains(&second));
        for request in &requests {
            assert!(request
                .system()
                .unwrap()
                .contains("Preserve the original structure"));
        }
    }

    #[tokio::test]
    async fn test_passes_use_configured_model_and_creativity() {
        let service = ScriptedService::replying(&["done"]);
        let model = ModelId::new("claude-3-5-haiku-20241022").unwrap();
        let creativity = Creativity::new(0.2).unwrap();

        refine(
            &service,
            "text",
            &config(RefinementStrategy::EnhanceQuality, 1)
                .model(model.clone())
                .creativity(creativity),
        )
        .await;

        let request = &service.requests()[0];
        assert_eq!(request.model(), &model);
        assert_eq!(request.creativity(), creativity);
    }
}
