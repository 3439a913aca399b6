//! Nodes that produce terse, verb-first edit instructions for the Qwen image
//! editor.

use async_trait::async_trait;
use pipeline::{CompletionService, InvalidConfiguration, StepRequest};
use tracing::debug;

use super::{complete, flatten_single_line, CREATIVITY, MODEL};
use crate::registry::{InputKind, InputSpec, Node, NodeDescriptor, NodeError, NodeInputs, NodeOutputs};

const CATEGORY: &str = "Claude/Qwen";

pipeline::choice_enum! {
    /// Where the key light comes from.
    LightDirection as "light_direction" {
        TopLeft => "top-left",
        TopRight => "top-right",
        MiddleLeft => "middle-left",
        MiddleRight => "middle-right",
        BottomLeft => "bottom-left",
        BottomRight => "bottom-right",
        Ambient => "ambient",
    }
}

impl LightDirection {
    /// Direction as it reads in a sentence, e.g. `middle right`.
    pub fn phrase(self) -> String {
        self.as_str().replace('-', " ")
    }
}

pipeline::choice_enum! {
    /// Character of the key light.
    LightQuality as "light_quality" {
        Harsh => "harsh",
        Soft => "soft",
        GoldenHour => "golden hour",
        Overcast => "overcast",
        Dramatic => "dramatic",
    }
}

pipeline::choice_enum! {
    /// Surface the subject stands on.
    GroundType as "ground_type" {
        Rocky => "rocky",
        Soil => "soil",
        Grass => "grass",
        Sand => "sand",
        Stone => "stone",
        Mixed => "mixed",
    }
}

pipeline::choice_enum! {
    /// Layout of the generated instruction.
    QwenOutputStyle as "output_style" {
        SingleLine => "single_line",
        BulletPoints => "bullet_points",
        NumberedSteps => "numbered_steps",
    }
}

// ---------------------------------------------------------------------------
// Qwen Prompt Generator
// ---------------------------------------------------------------------------

const PROBLEM_DESCRIPTION: &str = "Foot appears to float above ground";

/// Turns a problem statement and edit toggles into one Qwen edit instruction.
#[derive(Debug, Clone, Copy, Default)]
pub struct QwenPromptGenerator;

static QWEN_PROMPT_GENERATOR: NodeDescriptor = NodeDescriptor {
    type_id: "qwen_prompt_generator",
    display_name: "Qwen Prompt Generator",
    category: CATEGORY,
    inputs: &[
        InputSpec::optional("problem_description", InputKind::Text, PROBLEM_DESCRIPTION),
        InputSpec::optional("edit_ground", InputKind::Flag, "true"),
        InputSpec::optional("edit_shadows", InputKind::Flag, "true"),
        InputSpec::optional("edit_integration", InputKind::Flag, "true"),
        InputSpec::choice(LightDirection::FIELD, LightDirection::CHOICES, "middle-right"),
        InputSpec::choice(LightQuality::FIELD, LightQuality::CHOICES, "golden hour"),
        InputSpec::choice(GroundType::FIELD, GroundType::CHOICES, "rocky"),
        InputSpec::choice(QwenOutputStyle::FIELD, QwenOutputStyle::CHOICES, "single_line"),
        InputSpec::optional("max_words", InputKind::Integer, "50"),
        MODEL,
        CREATIVITY,
    ],
    outputs: &["qwen_prompt"],
};

/// Which edits to request and how.
#[derive(Debug, Clone, Copy)]
struct EditPlan {
    ground: bool,
    shadows: bool,
    integration: bool,
    direction: LightDirection,
    quality: LightQuality,
    surface: GroundType,
}

impl EditPlan {
    fn commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        if self.ground {
            commands.push(format!("Anchor firmly onto {} ground", self.surface));
            commands.push(format!("Create realistic deformation in {}", self.surface));
            commands.push("Compress terrain at weight points".to_string());
        }
        if self.shadows {
            commands.push(format!(
                "Cast {} shadows from {}",
                self.quality,
                self.direction.phrase()
            ));
            if self.ground {
                commands.push("Add contact shadows at ground meeting points".to_string());
            }
        }
        if self.integration {
            commands.push("Blend naturally with surface texture".to_string());
            commands.push("Match environmental lighting".to_string());
        }
        commands
    }
}

#[async_trait]
impl Node for QwenPromptGenerator {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &QWEN_PROMPT_GENERATOR
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError> {
        let plan = EditPlan {
            ground: inputs.flag("edit_ground", true)?,
            shadows: inputs.flag("edit_shadows", true)?,
            integration: inputs.flag("edit_integration", true)?,
            direction: inputs.choice(LightDirection::FIELD, LightDirection::MiddleRight)?,
            quality: inputs.choice(LightQuality::FIELD, LightQuality::GoldenHour)?,
            surface: inputs.choice(GroundType::FIELD, GroundType::Rocky)?,
        };
        let commands = plan.commands();
        if commands.is_empty() {
            return Err(InvalidConfiguration::new(
                "edit_ground",
                "enable at least one of edit_ground, edit_shadows, edit_integration",
            )
            .into());
        }
        let style = inputs.choice(QwenOutputStyle::FIELD, QwenOutputStyle::SingleLine)?;
        let max_words = inputs.integer("max_words", 50, 20..=100)?;
        let problem = inputs.text_or("problem_description", PROBLEM_DESCRIPTION)?;

        let system = format!(
            "You are a Qwen edit prompt optimizer.\n\
             Convert the given commands into a {max_words}-word maximum edit instruction.\n\
             Use ONLY action verbs. No descriptions or explanations.\n\
             Output format: {style}"
        );
        let prompt = format!(
            "Problem: {problem}\n\n\
             Required edits:\n{}\n\n\
             Combine these into a {max_words}-word Qwen edit instruction using only action verbs.",
            commands.join("\n")
        );
        debug!(commands = commands.len(), %style, "Requesting Qwen edit instruction");

        let request = StepRequest::new(prompt, inputs.model()?, inputs.creativity()?)
            .with_system(system);
        let mut instruction = complete(service, &request).await?;
        if style == QwenOutputStyle::SingleLine {
            instruction = flatten_single_line(&instruction);
        }
        Ok(NodeOutputs::new().with("qwen_prompt", instruction))
    }
}

// ---------------------------------------------------------------------------
// Qwen From Image
// ---------------------------------------------------------------------------

const TARGET_DESCRIPTION: &str = "Realistic ground contact with proper shadows";

const COMMAND_SYSTEM_PROMPT: &str = "Convert problem statements to Qwen edit commands.\n\
     Use pattern: [VERB] [OBJECT] [SPECIFICATION]\n\
     Examples: 'Anchor foot to ground', 'Create shadow from right', 'Deepen contact depression'\n\
     Maximum 50 words total. Single line output.";

/// Inspects an image for compositing problems, then turns them into a Qwen
/// edit instruction. Makes two calls: vision analysis, then conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct QwenFromImage;

static QWEN_FROM_IMAGE: NodeDescriptor = NodeDescriptor {
    type_id: "qwen_from_image",
    display_name: "Qwen From Image",
    category: CATEGORY,
    inputs: &[
        InputSpec::required("image", InputKind::Images),
        InputSpec::optional("analyze_ground", InputKind::Flag, "true"),
        InputSpec::optional("analyze_lighting", InputKind::Flag, "true"),
        InputSpec::optional("analyze_integration", InputKind::Flag, "true"),
        InputSpec::optional("known_issues", InputKind::Text, ""),
        InputSpec::optional("target_description", InputKind::Text, TARGET_DESCRIPTION),
        MODEL,
        CREATIVITY,
    ],
    outputs: &["qwen_prompt", "analysis"],
};

#[async_trait]
impl Node for QwenFromImage {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &QWEN_FROM_IMAGE
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError> {
        let images = inputs.images("image")?;
        if images.is_empty() {
            return Err(InvalidConfiguration::missing("image").into());
        }

        let mut focus = Vec::with_capacity(3);
        if inputs.flag("analyze_ground", true)? {
            focus.push("ground contact and deformation");
        }
        if inputs.flag("analyze_lighting", true)? {
            focus.push("shadows and lighting consistency");
        }
        if inputs.flag("analyze_integration", true)? {
            focus.push("edge blending and integration");
        }
        if focus.is_empty() {
            return Err(InvalidConfiguration::new(
                "analyze_ground",
                "enable at least one of analyze_ground, analyze_lighting, analyze_integration",
            )
            .into());
        }

        let target = inputs.text_or("target_description", TARGET_DESCRIPTION)?;
        let model = inputs.model()?;
        let creativity = inputs.creativity()?;

        let mut analysis_prompt = format!("Identify editing requirements to achieve: {target}\n");
        if let Some(issues) = inputs.optional_text("known_issues")? {
            analysis_prompt.push_str(&format!("Known issues: {issues}\n"));
        }
        analysis_prompt.push_str("List ONLY what needs to be changed, as brief statements.");

        let analysis_request = StepRequest::new(analysis_prompt, model.clone(), creativity)
            .with_system(format!(
                "You are a visual effects specialist identifying specific fixes needed.\n\
                 Focus on: {}\n\
                 Output format: List specific problems that need editing, not descriptions.",
                focus.join(", ")
            ))
            .with_images(images);
        let analysis = complete(service, &analysis_request).await?;

        let command_request = StepRequest::new(
            format!(
                "Convert these issues to edit commands:\n{analysis}\n\nTarget result: {target}"
            ),
            model,
            creativity,
        )
        .with_system(COMMAND_SYSTEM_PROMPT);
        let commands = complete(service, &command_request).await?;

        Ok(NodeOutputs::new()
            .with("qwen_prompt", flatten_single_line(&commands))
            .with("analysis", analysis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rate_limited, ScriptedService};
    use serde_json::json;

    #[tokio::test]
    async fn test_generator_builds_commands_from_toggles() {
        let service = ScriptedService::replying(&["- Anchor foot onto sand\n- Cast soft shadow"]);
        let inputs = NodeInputs::new()
            .with("ground_type", "sand")
            .with("light_quality", "soft")
            .with("light_direction", "top-left")
            .with("edit_integration", false);

        let outputs = QwenPromptGenerator.execute(&inputs, &service).await.unwrap();

        assert_eq!(
            outputs.get("qwen_prompt"),
            Some("Anchor foot onto sand, Cast soft shadow")
        );
        let request = &service.requests()[0];
        assert!(request.prompt().contains("Anchor firmly onto sand ground"));
        assert!(request.prompt().contains("Cast soft shadows from top left"));
        assert!(request.prompt().contains("Add contact shadows at ground meeting points"));
        assert!(!request.prompt().contains("Blend naturally"));
        assert!(request.system().unwrap().contains("50-word maximum"));
    }

    #[tokio::test]
    async fn test_generator_keeps_layout_for_bullet_points() {
        let service = ScriptedService::replying(&["- Anchor foot\n- Cast shadow"]);
        let inputs = NodeInputs::new().with("output_style", "bullet_points");

        let outputs = QwenPromptGenerator.execute(&inputs, &service).await.unwrap();

        assert_eq!(outputs.get("qwen_prompt"), Some("- Anchor foot\n- Cast shadow"));
    }

    #[tokio::test]
    async fn test_generator_validates_before_calling() {
        let service = ScriptedService::replying(&[]);

        let none_enabled = NodeInputs::new()
            .with("edit_ground", false)
            .with("edit_shadows", false)
            .with("edit_integration", false);
        assert!(QwenPromptGenerator.execute(&none_enabled, &service).await.is_err());

        let too_short = NodeInputs::new().with("max_words", 5);
        assert!(QwenPromptGenerator.execute(&too_short, &service).await.is_err());

        let unknown_light = NodeInputs::new().with("light_quality", "neon");
        assert!(QwenPromptGenerator.execute(&unknown_light, &service).await.is_err());

        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_from_image_analyses_then_converts() {
        let service = ScriptedService::replying(&[
            "Foot hovers above rock\nNo contact shadow",
            "Anchor foot to rock\nAdd contact shadow",
        ]);
        let inputs = NodeInputs::new()
            .with("image", json!({"data": "AAAA"}))
            .with("analyze_integration", false)
            .with("known_issues", "left foot floats");

        let outputs = QwenFromImage.execute(&inputs, &service).await.unwrap();

        assert_eq!(
            outputs.get("qwen_prompt"),
            Some("Anchor foot to rock, Add contact shadow")
        );
        assert_eq!(
            outputs.get("analysis"),
            Some("Foot hovers above rock\nNo contact shadow")
        );

        let requests = service.requests();
        assert_eq!(requests[0].images().len(), 1);
        assert!(requests[0].prompt().contains("Known issues: left foot floats"));
        let analysis_system = requests[0].system().unwrap();
        assert!(analysis_system.contains("shadows and lighting consistency"));
        assert!(!analysis_system.contains("edge blending"));
        assert!(requests[1].images().is_empty());
        assert!(requests[1].prompt().contains("Foot hovers above rock"));
        assert_eq!(requests[1].system(), Some(COMMAND_SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_from_image_stops_after_failed_analysis() {
        let service = ScriptedService::new(vec![Err(rate_limited())]);
        let inputs = NodeInputs::new().with("image", json!({"data": "AAAA"}));

        let err = QwenFromImage.execute(&inputs, &service).await.unwrap_err();

        assert!(matches!(err, NodeError::Completion(_)));
        assert_eq!(service.call_count(), 1);
    }
}
