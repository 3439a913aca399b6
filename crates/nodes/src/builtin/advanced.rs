use async_trait::async_trait;
use pipeline::{
    CombinationMode, CompletionService, DetailLevel, FewShotExample, InvalidConfiguration,
    IterationCount, OutputFormat, RefinementStrategy, StepRequest, TemplateStyle, MAX_ITERATIONS,
};

use super::{complete, CREATIVITY, MODEL};
use crate::chain::{run_chain, ChainPlan, ChainStep};
use crate::composer::PromptComposer;
use crate::refine::{refine, RefineConfig, DEFAULT_OPTIMIZE_FOR};
use crate::registry::{InputKind, InputSpec, Node, NodeDescriptor, NodeError, NodeInputs, NodeOutputs};

const CATEGORY: &str = "Claude/Advanced";

pipeline::choice_enum! {
    /// How a multi-image description relates the images to each other.
    ComparisonMode as "comparison_mode" {
        /// Each image on its own, noting connections.
        Individual => "individual",
        /// Differences and similarities.
        Comparative => "comparative",
        /// A sequence or progression.
        Sequential => "sequential",
        /// Parts of one scene or concept.
        Holistic => "holistic",
    }
}

impl ComparisonMode {
    fn instruction(self) -> Option<&'static str> {
        match self {
            Self::Individual => None,
            Self::Comparative => Some(
                "Compare and contrast these images, highlighting key differences and similarities.",
            ),
            Self::Sequential => {
                Some("Describe these images as a sequence, noting progressions and changes.")
            }
            Self::Holistic => {
                Some("Describe how these images relate to form a complete picture or narrative.")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt Engineer
// ---------------------------------------------------------------------------

const ENGINEER_BASE_PROMPT: &str = "Describe in detail";

/// Builds an engineered prompt and matching system prompt without calling the
/// model.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptEngineer;

static PROMPT_ENGINEER: NodeDescriptor = NodeDescriptor {
    type_id: "prompt_engineer",
    display_name: "Prompt Engineer",
    category: CATEGORY,
    inputs: &[
        InputSpec::optional("base_prompt", InputKind::Text, ENGINEER_BASE_PROMPT),
        InputSpec::optional("context", InputKind::Text, ""),
        InputSpec::optional("requirements", InputKind::Text, ""),
        InputSpec::choice(
            TemplateStyle::FIELD,
            &[
                "none",
                "qwen_style",
                "chain_of_thought",
                "structured_analysis",
                "creative_narrative",
                "technical_documentation",
            ],
            "none",
        ),
        InputSpec::choice(OutputFormat::FIELD, OutputFormat::CHOICES, "plain"),
        InputSpec::choice(DetailLevel::FIELD, DetailLevel::CHOICES, "standard"),
        InputSpec::optional("example_input", InputKind::Text, ""),
        InputSpec::optional("example_output", InputKind::Text, ""),
        InputSpec::optional("examples", InputKind::Examples, ""),
        CREATIVITY,
    ],
    outputs: &["engineered_prompt", "system_prompt"],
};

#[async_trait]
impl Node for PromptEngineer {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &PROMPT_ENGINEER
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        _service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError> {
        let mut examples: Vec<FewShotExample> = inputs.parse("examples")?.unwrap_or_default();
        if let (Some(input), Some(output)) = (
            inputs.optional_text("example_input")?,
            inputs.optional_text("example_output")?,
        ) {
            examples.push(FewShotExample::new(input, output));
        }

        let composer = PromptComposer::new(inputs.text_or("base_prompt", ENGINEER_BASE_PROMPT)?)
            .template(inputs.optional_choice(TemplateStyle::FIELD)?)
            .context(inputs.text_or("context", "")?)
            .requirements(inputs.text_or("requirements", "")?)
            .output_format(inputs.choice(OutputFormat::FIELD, OutputFormat::default())?)
            .detail_level(inputs.choice(DetailLevel::FIELD, DetailLevel::default())?)
            .examples(examples)
            .creativity(inputs.creativity()?);

        Ok(NodeOutputs::new()
            .with("engineered_prompt", composer.compose())
            .with("system_prompt", composer.system_prompt()))
    }
}

// ---------------------------------------------------------------------------
// Context Aware Describe
// ---------------------------------------------------------------------------

const FOCUS_ELEMENTS: &str = "subjects, colors, composition, mood, technical quality";
const CONTEXT_BASE_PROMPT: &str =
    "Analyze these images with attention to their relationships and context.";

/// Describes a batch of images with attention to how they relate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAwareDescribe;

static CONTEXT_AWARE_DESCRIBE: NodeDescriptor = NodeDescriptor {
    type_id: "context_aware_describe",
    display_name: "Context Aware Describe",
    category: CATEGORY,
    inputs: &[
        InputSpec::required("images", InputKind::Images),
        InputSpec::choice(ComparisonMode::FIELD, ComparisonMode::CHOICES, "individual"),
        InputSpec::optional("previous_description", InputKind::Text, ""),
        InputSpec::optional("scene_context", InputKind::Text, ""),
        InputSpec::optional("focus_elements", InputKind::Text, FOCUS_ELEMENTS),
        InputSpec::optional("base_prompt", InputKind::Text, CONTEXT_BASE_PROMPT),
        MODEL,
        CREATIVITY,
    ],
    outputs: &["description"],
};

fn analyst_system_prompt(
    focus: &str,
    mode: ComparisonMode,
    scene_context: Option<&str>,
    previous: Option<&str>,
) -> String {
    let mut system = format!(
        "You are an expert image analyst with deep understanding of visual context and relationships.\n\n\
         Focus on these elements: {focus}\n\n\
         Analysis mode: {mode}\n\
         - individual: Describe each image separately but note connections\n\
         - comparative: Focus on differences and similarities\n\
         - sequential: Treat as a sequence or progression\n\
         - holistic: Describe as parts of a whole scene or concept"
    );
    if let Some(scene) = scene_context {
        system.push_str(&format!("\n\nScene context: {scene}"));
    }
    if let Some(previous) = previous {
        system.push_str(&format!("\n\nPrevious analysis for context: {previous}"));
    }
    system
}

#[async_trait]
impl Node for ContextAwareDescribe {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &CONTEXT_AWARE_DESCRIBE
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError> {
        let images = inputs.images("images")?;
        if images.is_empty() {
            return Err(InvalidConfiguration::missing("images").into());
        }
        let mode = inputs.choice(ComparisonMode::FIELD, ComparisonMode::Individual)?;

        let system = analyst_system_prompt(
            &inputs.text_or("focus_elements", FOCUS_ELEMENTS)?,
            mode,
            inputs.optional_text("scene_context")?.as_deref(),
            inputs.optional_text("previous_description")?.as_deref(),
        );
        let mut prompt = inputs.text_or("base_prompt", CONTEXT_BASE_PROMPT)?;
        if let Some(instruction) = mode.instruction() {
            prompt.push_str("\n\n");
            prompt.push_str(instruction);
        }

        let request = StepRequest::new(prompt, inputs.model()?, inputs.creativity()?)
            .with_system(system)
            .with_images(images);
        let description = complete(service, &request).await?;
        Ok(NodeOutputs::new().with("description", description))
    }
}

// ---------------------------------------------------------------------------
// Iterative Refine
// ---------------------------------------------------------------------------

const REFINEMENT_INSTRUCTIONS: &str =
    "Improve this description by adding more specific details and technical accuracy.";

/// Runs the refinement loop over a text.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterativeRefine;

static ITERATIVE_REFINE: NodeDescriptor = NodeDescriptor {
    type_id: "iterative_refine",
    display_name: "Iterative Refine",
    category: CATEGORY,
    inputs: &[
        InputSpec::required("initial_result", InputKind::Text),
        InputSpec::choice(
            RefinementStrategy::FIELD,
            RefinementStrategy::CHOICES,
            "enhance_quality",
        ),
        InputSpec::optional("refinement_instructions", InputKind::Text, REFINEMENT_INSTRUCTIONS),
        InputSpec::optional("iteration_count", InputKind::Integer, "1"),
        InputSpec::optional("preserve_structure", InputKind::Flag, "true"),
        InputSpec::optional("accumulate_improvements", InputKind::Flag, "true"),
        InputSpec::optional("optimize_for", InputKind::Text, DEFAULT_OPTIMIZE_FOR),
        MODEL,
        CREATIVITY,
    ],
    outputs: &["refined_result", "improvement_notes"],
};

#[async_trait]
impl Node for IterativeRefine {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &ITERATIVE_REFINE
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError> {
        let initial = inputs.text("initial_result")?;
        let count = inputs.integer("iteration_count", 1, 0..=i64::from(MAX_ITERATIONS))?;
        // Range-checked above, so the narrowing cannot truncate.
        let iterations = IterationCount::new(count as u32)?;

        let config = RefineConfig::new(
            inputs.choice(RefinementStrategy::FIELD, RefinementStrategy::default())?,
            iterations,
        )
        .preserve_structure(inputs.flag("preserve_structure", true)?)
        .accumulate_improvements(inputs.flag("accumulate_improvements", true)?)
        .instructions(inputs.text_or("refinement_instructions", REFINEMENT_INSTRUCTIONS)?)
        .optimize_for(inputs.text_or("optimize_for", DEFAULT_OPTIMIZE_FOR)?)
        .model(inputs.model()?)
        .creativity(inputs.creativity()?);

        let outcome = refine(service, &initial, &config).await;
        Ok(NodeOutputs::new()
            .with("improvement_notes", outcome.improvement_notes())
            .with("refined_result", outcome.text))
    }
}

// ---------------------------------------------------------------------------
// Prompt Chain
// ---------------------------------------------------------------------------

const STEP1_PROMPT: &str = "First, analyze the main subjects";
const STEP2_PROMPT: &str = "Next, describe the context and environment";
const STEP3_PROMPT: &str = "Finally, synthesize insights";

/// Runs up to three dependent prompts and merges their outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptChain;

static PROMPT_CHAIN: NodeDescriptor = NodeDescriptor {
    type_id: "prompt_chain",
    display_name: "Prompt Chain",
    category: CATEGORY,
    inputs: &[
        InputSpec::optional("input_text", InputKind::Text, ""),
        InputSpec::optional("input_image", InputKind::Images, ""),
        InputSpec::optional("step1_prompt", InputKind::Text, STEP1_PROMPT),
        InputSpec::optional("step1_use_image", InputKind::Flag, "true"),
        InputSpec::optional("step2_prompt", InputKind::Text, STEP2_PROMPT),
        InputSpec::optional("step2_use_previous", InputKind::Flag, "true"),
        InputSpec::optional("step3_prompt", InputKind::Text, STEP3_PROMPT),
        InputSpec::optional("step3_use_all", InputKind::Flag, "true"),
        InputSpec::choice(CombinationMode::FIELD, CombinationMode::CHOICES, "synthesize"),
        MODEL,
        CREATIVITY,
    ],
    outputs: &["final_output", "intermediate_results"],
};

fn chain_steps(inputs: &NodeInputs) -> Result<Vec<ChainStep>, InvalidConfiguration> {
    let first = inputs.text_or("step1_prompt", STEP1_PROMPT)?;
    if first.trim().is_empty() {
        return Err(InvalidConfiguration::missing("step1_prompt"));
    }
    let mut first = ChainStep::new(first);
    if inputs.flag("step1_use_image", true)? {
        first = first.with_images(inputs.images("input_image")?);
    }

    let mut steps = vec![first];
    for (prompt_key, default, context_key) in [
        ("step2_prompt", STEP2_PROMPT, "step2_use_previous"),
        ("step3_prompt", STEP3_PROMPT, "step3_use_all"),
    ] {
        let prompt = inputs.text_or(prompt_key, default)?;
        if !prompt.trim().is_empty() {
            steps.push(
                ChainStep::new(prompt).with_context_passing(inputs.flag(context_key, true)?),
            );
        }
    }
    Ok(steps)
}

#[async_trait]
impl Node for PromptChain {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &PROMPT_CHAIN
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError> {
        let plan = ChainPlan::new(
            chain_steps(inputs)?,
            inputs.choice(CombinationMode::FIELD, CombinationMode::default())?,
        )?
        .with_input_text(inputs.text_or("input_text", "")?)
        .with_model(inputs.model()?)
        .with_creativity(inputs.creativity()?);

        let outcome = run_chain(service, &plan).await?;
        Ok(NodeOutputs::new()
            .with("final_output", outcome.final_text)
            .with("intermediate_results", outcome.intermediate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rate_limited, ScriptedService};
    use serde_json::json;

    #[tokio::test]
    async fn test_prompt_engineer_makes_no_call() {
        let service = ScriptedService::replying(&[]);
        let inputs = NodeInputs::new()
            .with("base_prompt", "Describe the scene")
            .with("context", "a night market")
            .with("output_format", "markdown")
            .with("example_input", "a cat")
            .with("example_output", "A tabby cat curled on a rug.")
            .with("creativity", 0.1);

        let outputs = PromptEngineer.execute(&inputs, &service).await.unwrap();

        assert_eq!(service.call_count(), 0);
        let prompt = outputs.get("engineered_prompt").unwrap();
        assert!(prompt.starts_with("Examples:"));
        assert!(prompt.contains("Context: a night market"));
        assert!(prompt.ends_with("Format your response using proper Markdown syntax."));
        assert!(outputs
            .get("system_prompt")
            .unwrap()
            .contains("Be factual and objective."));
    }

    #[tokio::test]
    async fn test_prompt_engineer_applies_template_and_rejects_unknown_style() {
        let service = ScriptedService::replying(&[]);

        let outputs = PromptEngineer
            .execute(
                &NodeInputs::new().with("template_style", "chain_of_thought"),
                &service,
            )
            .await
            .unwrap();
        assert!(outputs
            .get("engineered_prompt")
            .unwrap()
            .starts_with("Let's approach this step-by-step."));

        let err = PromptEngineer
            .execute(&NodeInputs::new().with("template_style", "haiku"), &service)
            .await
            .unwrap_err();
        match err {
            NodeError::Configuration(config) => assert_eq!(config.field, "template_style"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_context_aware_describe_builds_mode_prompt() {
        let service = ScriptedService::replying(&["two views of one bridge"]);
        let inputs = NodeInputs::new()
            .with("images", json!([{"data": "AAAA"}, {"data": "BBBB"}]))
            .with("comparison_mode", "comparative")
            .with("scene_context", "city at night");

        let outputs = ContextAwareDescribe.execute(&inputs, &service).await.unwrap();

        assert_eq!(outputs.get("description"), Some("two views of one bridge"));
        let request = &service.requests()[0];
        assert_eq!(request.images().len(), 2);
        assert!(request.prompt().ends_with("highlighting key differences and similarities."));
        let system = request.system().unwrap();
        assert!(system.contains("Analysis mode: comparative"));
        assert!(system.contains("Scene context: city at night"));
        assert!(!system.contains("Previous analysis"));
    }

    #[tokio::test]
    async fn test_iterative_refine_reports_notes_and_partial_failure() {
        let service = ScriptedService::new(vec![Ok("better"), Err(rate_limited())]);
        let inputs = NodeInputs::new()
            .with("initial_result", "draft")
            .with("iteration_count", 3)
            .with("refinement_strategy", "clarify");

        let outputs = IterativeRefine.execute(&inputs, &service).await.unwrap();

        assert_eq!(outputs.get("refined_result"), Some("better"));
        let notes = outputs.get("improvement_notes").unwrap();
        assert!(notes.starts_with("Iteration 1: Applied clarify strategy"));
        assert!(notes.contains("Warning: Iteration 2 failed"));
    }

    #[tokio::test]
    async fn test_iterative_refine_rejects_out_of_range_count() {
        let service = ScriptedService::replying(&[]);
        let inputs = NodeInputs::new()
            .with("initial_result", "draft")
            .with("iteration_count", 4);

        let err = IterativeRefine.execute(&inputs, &service).await.unwrap_err();

        assert!(matches!(err, NodeError::Configuration(_)));
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_prompt_chain_defaults_run_three_steps_and_synthesis() {
        let service = ScriptedService::replying(&["s1", "s2", "s3", "final"]);
        let inputs = NodeInputs::new().with("input_text", "a harbour at dawn");

        let outputs = PromptChain.execute(&inputs, &service).await.unwrap();

        assert_eq!(service.call_count(), 4);
        assert_eq!(outputs.get("final_output"), Some("final"));
        assert_eq!(
            outputs.get("intermediate_results"),
            Some("Step 1: s1\n---\nStep 2: s2\n---\nStep 3: s3")
        );
    }

    #[tokio::test]
    async fn test_prompt_chain_skips_blank_steps() {
        let service = ScriptedService::replying(&["only"]);
        let inputs = NodeInputs::new()
            .with("step2_prompt", "")
            .with("step3_prompt", " ")
            .with("combination_mode", "append");

        let outputs = PromptChain.execute(&inputs, &service).await.unwrap();

        assert_eq!(service.call_count(), 1);
        assert_eq!(outputs.get("final_output"), Some("only"));
    }

    #[tokio::test]
    async fn test_prompt_chain_step_failure_is_fatal() {
        let service = ScriptedService::new(vec![Ok("s1"), Err(rate_limited())]);

        let err = PromptChain
            .execute(&NodeInputs::new(), &service)
            .await
            .unwrap_err();

        match err {
            NodeError::Chain(chain) => assert_eq!(chain.step(), Some(2)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test]
    async fn test_prompt_chain_image_only_reaches_first_step() {
        let service = ScriptedService::replying(&["s1", "s2"]);
        let inputs = NodeInputs::new()
            .with("input_image", json!({"data": "AAAA"}))
            .with("step3_prompt", "")
            .with("combination_mode", "append");

        PromptChain.execute(&inputs, &service).await.unwrap();

        let requests = service.requests();
        assert_eq!(requests[0].images().len(), 1);
        assert!(requests[1].images().is_empty());
    }
}
