//! Prompt composition.
//!
//! Builds request prompts from a template style, detail level, output format,
//! and optional few-shot examples. Composition is pure string assembly and
//! never fails; option strings are validated earlier, when they are parsed
//! into [`TemplateStyle`], [`OutputFormat`], and [`DetailLevel`].

use pipeline::{
    Creativity, DetailLevel, FewShotExample, IterationCount, OutputFormat, RefinementStrategy,
    TemplateStyle,
};

/// Separator between the top-level sections of a composed prompt.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// First line of the few-shot block.
pub const FEW_SHOT_HEADER: &str = "Examples:";

/// Line that closes the few-shot block and hands over to the main instruction.
pub const FEW_SHOT_FOOTER: &str = "Now, following this pattern:";

const DEFAULT_SYSTEM_PERSONA: &str =
    "You are a precise assistant that follows the instructions in the prompt exactly.";

// ---------------------------------------------------------------------------
// Fixed texts
// ---------------------------------------------------------------------------

fn scaffold(style: TemplateStyle, task: &str, context: &str, requirements: &str) -> String {
    match style {
        TemplateStyle::QwenStyle => format!(
            "You are a helpful assistant. Please follow these guidelines:\n\
             1. Be precise and detailed in your analysis\n\
             2. Structure your response clearly\n\
             3. Use specific technical terminology when appropriate\n\
             4. Maintain objectivity while being comprehensive\n\
             \n\
             Task: {task}\n\
             Context: {context}\n\
             Requirements: {requirements}"
        ),
        TemplateStyle::ChainOfThought => format!(
            "Let's approach this step-by-step.\n\
             \n\
             First, I need to understand: {task}\n\
             Context provided: {context}\n\
             \n\
             Let me think through this systematically:\n\
             1. Initial observation\n\
             2. Detailed analysis\n\
             3. Key insights\n\
             4. Final conclusion\n\
             \n\
             {requirements}"
        ),
        TemplateStyle::StructuredAnalysis => format!(
            "Analyze the following according to these dimensions:\n\
             - Visual/Content Overview\n\
             - Technical Details\n\
             - Artistic/Aesthetic Elements\n\
             - Contextual Significance\n\
             - Potential Applications\n\
             \n\
             Task: {task}\n\
             Context: {context}\n\
             Additional Requirements: {requirements}"
        ),
        TemplateStyle::CreativeNarrative => format!(
            "Create an engaging narrative that:\n\
             - Captures the essence of the subject\n\
             - Uses vivid, descriptive language\n\
             - Maintains coherence and flow\n\
             - Incorporates subtle details\n\
             \n\
             Task: {task}\n\
             Context: {context}\n\
             Style Requirements: {requirements}"
        ),
        TemplateStyle::TechnicalDocumentation => format!(
            "Generate technical documentation following these standards:\n\
             - Use precise terminology\n\
             - Include all relevant parameters\n\
             - Structure information hierarchically\n\
             - Provide clear explanations\n\
             \n\
             Task: {task}\n\
             Technical Context: {context}\n\
             Documentation Requirements: {requirements}"
        ),
    }
}

/// Verbosity instruction appended for `level`.
pub fn detail_instruction(level: DetailLevel) -> &'static str {
    match level {
        DetailLevel::Concise => "Be brief and to the point. Focus on key information only.",
        DetailLevel::Standard => "Provide a balanced level of detail.",
        DetailLevel::Detailed => "Include comprehensive details and thorough explanations.",
        DetailLevel::Exhaustive => "Provide exhaustive detail, leaving nothing unexamined.",
    }
}

/// Formatting instruction appended for `format`.
pub fn format_instruction(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Plain => "Respond in plain text without any markup.",
        OutputFormat::Markdown => "Format your response using proper Markdown syntax.",
        OutputFormat::Json => "Structure your response as valid JSON.",
        OutputFormat::Xml => "Structure your response using XML tags.",
    }
}

/// Hint derived from `creativity`, if it falls outside the neutral band.
pub fn creativity_hint(creativity: Creativity) -> Option<&'static str> {
    if creativity.is_factual() {
        Some("Be factual and objective. Avoid speculation.")
    } else if creativity.is_creative() {
        Some("Feel free to be creative and explore interesting angles.")
    } else {
        None
    }
}

/// Instruction placed at the head of every refinement pass for `strategy`.
pub fn strategy_instruction(strategy: RefinementStrategy) -> &'static str {
    match strategy {
        RefinementStrategy::Clarify => {
            "Make this clearer and more understandable while maintaining accuracy:"
        }
        RefinementStrategy::Expand => "Expand this with more relevant details and examples:",
        RefinementStrategy::Focus => {
            "Make this more focused and concise while keeping key information:"
        }
        RefinementStrategy::Restructure => {
            "Reorganize this for better flow and logical structure:"
        }
        RefinementStrategy::EnhanceQuality => "Enhance the overall quality considering:",
    }
}

fn few_shot_block(examples: &[FewShotExample]) -> Option<String> {
    if examples.is_empty() {
        return None;
    }
    let mut sections = vec![FEW_SHOT_HEADER.to_string()];
    sections.extend(examples.iter().enumerate().map(|(i, example)| {
        format!(
            "Example {}:\nInput: {}\nOutput: {}",
            i + 1,
            example.input,
            example.output
        )
    }));
    sections.push(FEW_SHOT_FOOTER.to_string());
    Some(sections.join(SECTION_SEPARATOR))
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// Builder for a composed request prompt.
///
/// [`compose`](Self::compose) produces the user prompt: the few-shot block (if
/// any), the main instruction (scaffolded when a template style is set), then
/// the verbosity and format instructions.
/// [`system_prompt`](Self::system_prompt) produces the matching system prompt,
/// which carries the creativity hint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptComposer {
    base_text: String,
    context: String,
    requirements: String,
    template: Option<TemplateStyle>,
    output_format: OutputFormat,
    detail_level: DetailLevel,
    examples: Vec<FewShotExample>,
    creativity: Option<Creativity>,
}

impl PromptComposer {
    /// Starts a composition around `base_text`.
    pub fn new(base_text: impl Into<String>) -> Self {
        Self {
            base_text: base_text.into(),
            ..Self::default()
        }
    }

    /// Sets the scaffold. `None` uses the base text as the main instruction.
    #[must_use]
    pub fn template(mut self, template: Option<TemplateStyle>) -> Self {
        self.template = template;
        self
    }

    /// Sets background context for the task.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Sets additional requirements for the answer.
    #[must_use]
    pub fn requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = requirements.into();
        self
    }

    /// Sets the requested output format.
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Sets the requested verbosity.
    #[must_use]
    pub fn detail_level(mut self, level: DetailLevel) -> Self {
        self.detail_level = level;
        self
    }

    /// Sets the few-shot examples, shown in the given order.
    #[must_use]
    pub fn examples(mut self, examples: Vec<FewShotExample>) -> Self {
        self.examples = examples;
        self
    }

    /// Sets the creativity the system prompt hints at.
    #[must_use]
    pub fn creativity(mut self, creativity: Creativity) -> Self {
        self.creativity = Some(creativity);
        self
    }

    fn main_instruction(&self) -> String {
        if let Some(style) = self.template {
            return scaffold(style, &self.base_text, &self.context, &self.requirements);
        }
        let mut parts = vec![self.base_text.clone()];
        if !self.context.trim().is_empty() {
            parts.push(format!("Context: {}", self.context));
        }
        if !self.requirements.trim().is_empty() {
            parts.push(format!("Specific requirements: {}", self.requirements));
        }
        parts.join(SECTION_SEPARATOR)
    }

    /// Builds the user prompt.
    pub fn compose(&self) -> String {
        let mut sections = Vec::with_capacity(4);
        if let Some(block) = few_shot_block(&self.examples) {
            sections.push(block);
        }
        sections.push(self.main_instruction());
        sections.push(detail_instruction(self.detail_level).to_string());
        sections.push(format_instruction(self.output_format).to_string());
        sections.join(SECTION_SEPARATOR)
    }

    /// Builds the system prompt that accompanies [`compose`](Self::compose).
    pub fn system_prompt(&self) -> String {
        match self.creativity.and_then(creativity_hint) {
            Some(hint) => format!("{DEFAULT_SYSTEM_PERSONA}{SECTION_SEPARATOR}{hint}"),
            None => DEFAULT_SYSTEM_PERSONA.to_string(),
        }
    }
}

/// Composes a prompt around `base_text` with a template scaffold, format and
/// verbosity instructions, and an optional few-shot block.
///
/// An empty `examples` slice omits the few-shot block entirely.
pub fn compose(
    base_text: &str,
    template_style: TemplateStyle,
    output_format: OutputFormat,
    detail_level: DetailLevel,
    examples: &[FewShotExample],
) -> String {
    PromptComposer::new(base_text)
        .template(Some(template_style))
        .output_format(output_format)
        .detail_level(detail_level)
        .examples(examples.to_vec())
        .compose()
}

// ---------------------------------------------------------------------------
// Refinement passes
// ---------------------------------------------------------------------------

/// Inputs for one refinement pass prompt.
#[derive(Debug, Clone, Copy)]
pub struct RefinementPass<'a> {
    /// Full text of the current artifact.
    pub artifact: &'a str,
    /// Strategy applied on this pass.
    pub strategy: RefinementStrategy,
    /// 1-based pass number.
    pub iteration: u32,
    /// Total passes requested.
    pub total: IterationCount,
    /// Free-form instructions from the caller; may be empty.
    pub instructions: &'a str,
    /// Optimisation targets, appended for `enhance_quality`.
    pub optimize_for: &'a str,
}

/// Builds the prompt for one refinement pass.
///
/// The full artifact is always embedded; passes never work from a diff.
pub fn compose_refinement(pass: &RefinementPass<'_>) -> String {
    let mut instruction = strategy_instruction(pass.strategy).to_string();
    if pass.strategy == RefinementStrategy::EnhanceQuality {
        instruction.push(' ');
        instruction.push_str(pass.optimize_for);
    }

    let mut sections = vec![
        format!("Iteration {} of {}", pass.iteration, pass.total),
        instruction,
        format!("Current version:\n{}", pass.artifact),
    ];
    if !pass.instructions.trim().is_empty() {
        sections.push(format!("Specific instructions: {}", pass.instructions));
    }
    sections.push("Provide the improved version:".to_string());
    sections.join(SECTION_SEPARATOR)
}

/// Builds the editor system prompt shared by every pass of one refinement.
pub fn refinement_system_prompt(
    optimize_for: &str,
    preserve_structure: bool,
    accumulate_improvements: bool,
) -> String {
    let structure = if preserve_structure {
        "Preserve the original structure and format."
    } else {
        "Feel free to restructure as needed."
    };
    let accumulation = if accumulate_improvements {
        "Build upon previous improvements."
    } else {
        "Fresh perspective each iteration."
    };
    format!(
        "You are a meticulous editor focused on iterative improvement.\n\
         Optimization targets: {optimize_for}\n\
         {structure}\n\
         {accumulation}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_without_examples_omits_few_shot_block() {
        let prompt = compose(
            "Describe the scene",
            TemplateStyle::QwenStyle,
            OutputFormat::Plain,
            DetailLevel::Standard,
            &[],
        );

        assert!(!prompt.contains(FEW_SHOT_HEADER));
        assert!(!prompt.contains(FEW_SHOT_FOOTER));
        assert!(prompt.contains("Task: Describe the scene"));
    }

    #[test]
    fn test_compose_prepends_examples_in_order() {
        let examples = vec![
            FewShotExample::new("a red ball", "Sphere, crimson, matte."),
            FewShotExample::new("a blue cube", "Cube, cobalt, glossy."),
        ];

        let prompt = compose(
            "a green cone",
            TemplateStyle::ChainOfThought,
            OutputFormat::Json,
            DetailLevel::Concise,
            &examples,
        );

        assert!(prompt.starts_with(FEW_SHOT_HEADER));
        let first = prompt.find("Input: a red ball").unwrap();
        let second = prompt.find("Input: a blue cube").unwrap();
        let footer = prompt.find(FEW_SHOT_FOOTER).unwrap();
        let task = prompt.find("First, I need to understand: a green cone").unwrap();
        assert!(first < second);
        assert!(second < footer);
        assert!(footer < task);
    }

    #[test]
    fn test_compose_appends_detail_then_format_instruction() {
        let prompt = compose(
            "Summarize",
            TemplateStyle::TechnicalDocumentation,
            OutputFormat::Xml,
            DetailLevel::Exhaustive,
            &[],
        );

        let detail = detail_instruction(DetailLevel::Exhaustive);
        let format = format_instruction(OutputFormat::Xml);
        assert!(prompt.ends_with(format));
        assert!(prompt.find(detail).unwrap() < prompt.find(format).unwrap());
    }

    #[test]
    fn test_every_template_embeds_the_base_text() {
        for style in TemplateStyle::ALL {
            let prompt = compose(
                "UNIQUE-TASK-MARKER",
                *style,
                OutputFormat::Plain,
                DetailLevel::Standard,
                &[],
            );
            assert!(prompt.contains("UNIQUE-TASK-MARKER"), "{style} dropped the task");
        }
    }

    #[test]
    fn test_plain_format_still_gets_an_instruction() {
        let prompt = PromptComposer::new("Describe").compose();
        assert!(prompt.ends_with(format_instruction(OutputFormat::Plain)));
    }

    #[test]
    fn test_untemplated_prompt_lists_context_and_requirements() {
        let prompt = PromptComposer::new("Describe the image")
            .context("A product photo")
            .requirements("Mention the lighting")
            .compose();

        assert!(prompt.starts_with("Describe the image"));
        assert!(prompt.contains("Context: A product photo"));
        assert!(prompt.contains("Specific requirements: Mention the lighting"));
    }

    #[test]
    fn test_system_prompt_creativity_hint() {
        let factual = PromptComposer::new("x")
            .creativity(Creativity::new(0.1).unwrap())
            .system_prompt();
        assert!(factual.contains("Avoid speculation"));

        let creative = PromptComposer::new("x")
            .creativity(Creativity::new(0.9).unwrap())
            .system_prompt();
        assert!(creative.contains("be creative"));

        let neutral = PromptComposer::new("x")
            .creativity(Creativity::new(0.5).unwrap())
            .system_prompt();
        assert_eq!(neutral, DEFAULT_SYSTEM_PERSONA);
    }

    #[test]
    fn test_refinement_prompt_embeds_full_artifact() {
        let artifact = "Line one.\nLine two.\nLine three.";
        let prompt = compose_refinement(&RefinementPass {
            artifact,
            strategy: RefinementStrategy::Restructure,
            iteration: 2,
            total: IterationCount::new(3).unwrap(),
            instructions: "",
            optimize_for: "clarity",
        });

        assert!(prompt.starts_with("Iteration 2 of 3"));
        assert!(prompt.contains(artifact));
        assert!(!prompt.contains("Specific instructions"));
        assert!(!prompt.contains("clarity"));
    }

    #[test]
    fn test_enhance_quality_appends_optimisation_targets() {
        let prompt = compose_refinement(&RefinementPass {
            artifact: "draft",
            strategy: RefinementStrategy::EnhanceQuality,
            iteration: 1,
            total: IterationCount::new(1).unwrap(),
            instructions: "Add technical accuracy.",
            optimize_for: "clarity, detail",
        });

        assert!(prompt.contains("Enhance the overall quality considering: clarity, detail"));
        assert!(prompt.contains("Specific instructions: Add technical accuracy."));
    }

    #[test]
    fn test_refinement_system_prompt_flags() {
        let kept = refinement_system_prompt("accuracy", true, true);
        assert!(kept.contains("Preserve the original structure"));
        assert!(kept.contains("Build upon previous improvements"));

        let free = refinement_system_prompt("accuracy", false, false);
        assert!(free.contains("Feel free to restructure"));
        assert!(free.contains("Fresh perspective"));
    }
}
