//! Built-in nodes.
//!
//! | Category | Nodes |
//! |----------|-------|
//! | `Claude` | [`DescribeImage`], [`CombineTexts`], [`TransformText`] |
//! | `Claude/Advanced` | [`PromptEngineer`], [`ContextAwareDescribe`], [`IterativeRefine`], [`PromptChain`] |
//! | `Claude/Qwen` | [`QwenPromptGenerator`], [`QwenFromImage`] |

mod advanced;
mod basic;
mod qwen;

pub use advanced::{ComparisonMode, ContextAwareDescribe, IterativeRefine, PromptChain, PromptEngineer};
pub use basic::{CombineTexts, DescribeImage, TransformText};
pub use qwen::{GroundType, LightDirection, LightQuality, QwenFromImage, QwenOutputStyle, QwenPromptGenerator};

use pipeline::{CompletionService, StepRequest, DEFAULT_MODEL, KNOWN_MODELS};

use crate::registry::{InputKind, InputSpec, Node, NodeError, CREATIVITY_INPUT, MODEL_INPUT};

pub(crate) const MODEL: InputSpec = InputSpec::choice(MODEL_INPUT, KNOWN_MODELS, DEFAULT_MODEL);
pub(crate) const CREATIVITY: InputSpec = InputSpec::optional(CREATIVITY_INPUT, InputKind::Float, "0.7");
pub(crate) const SYSTEM_PROMPT: InputSpec = InputSpec::optional("system_prompt", InputKind::Text, "");

/// Every built-in node, one instance each.
pub(crate) fn all() -> Vec<Box<dyn Node>> {
    vec![
        Box::new(DescribeImage),
        Box::new(CombineTexts),
        Box::new(TransformText),
        Box::new(PromptEngineer),
        Box::new(ContextAwareDescribe),
        Box::new(IterativeRefine),
        Box::new(PromptChain),
        Box::new(QwenPromptGenerator),
        Box::new(QwenFromImage),
    ]
}

async fn complete(service: &dyn CompletionService, request: &StepRequest) -> Result<String, NodeError> {
    Ok(service.complete(request).await?.text)
}

/// Collapses a multi-line command list onto one line.
pub(crate) fn flatten_single_line(text: &str) -> String {
    text.replace('\n', ", ").replace("- ", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_single_line_joins_and_strips_bullets() {
        assert_eq!(
            flatten_single_line("- Anchor foot to ground\n- Cast soft shadow\n"),
            "Anchor foot to ground, Cast soft shadow,"
        );
        assert_eq!(flatten_single_line("  already flat  "), "already flat");
    }
}
