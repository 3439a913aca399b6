use async_trait::async_trait;
use pipeline::{CompletionService, InvalidConfiguration, StepRequest};

use super::{complete, CREATIVITY, MODEL, SYSTEM_PROMPT};
use crate::registry::{InputKind, InputSpec, Node, NodeDescriptor, NodeError, NodeInputs, NodeOutputs};

const CATEGORY: &str = "Claude";

const DESCRIBE_IMAGE_PROMPT: &str = "Describe this image in detail.";
const COMBINE_TEXTS_PROMPT: &str =
    "Combine the following two texts into one coherent prompt without redundancies.";
const TRANSFORM_TEXT_PROMPT: &str = "Transform this text:";

fn request(inputs: &NodeInputs, prompt: String) -> Result<StepRequest, NodeError> {
    let system = inputs.text_or("system_prompt", "")?;
    Ok(StepRequest::new(prompt, inputs.model()?, inputs.creativity()?).with_system(system))
}

// ---------------------------------------------------------------------------
// Describe Image
// ---------------------------------------------------------------------------

/// Sends one or more images with a prompt to the vision model.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescribeImage;

static DESCRIBE_IMAGE: NodeDescriptor = NodeDescriptor {
    type_id: "describe_image",
    display_name: "Describe Image",
    category: CATEGORY,
    inputs: &[
        InputSpec::required("image", InputKind::Images),
        MODEL,
        SYSTEM_PROMPT,
        InputSpec::optional("prompt", InputKind::Text, DESCRIBE_IMAGE_PROMPT),
        CREATIVITY,
    ],
    outputs: &["description"],
};

#[async_trait]
impl Node for DescribeImage {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &DESCRIBE_IMAGE
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
        let prompt = inputs.text_or("prompt", DESCRIBE_IMAGE_PROMPT)?;
        let request = request(inputs, prompt)?.with_images(images);

        let description = complete(service, &request).await?;
        Ok(NodeOutputs::new().with("description", description))
    }
}

// ---------------------------------------------------------------------------
// Combine Texts
// ---------------------------------------------------------------------------

/// Merges two labelled texts into one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombineTexts;

static COMBINE_TEXTS: NodeDescriptor = NodeDescriptor {
    type_id: "combine_texts",
    display_name: "Combine Texts",
    category: CATEGORY,
    inputs: &[
        InputSpec::required("text_1", InputKind::Text),
        InputSpec::optional("text_1_prefix", InputKind::Text, "1"),
        InputSpec::required("text_2", InputKind::Text),
        InputSpec::optional("text_2_prefix", InputKind::Text, "2"),
        MODEL,
        SYSTEM_PROMPT,
        InputSpec::optional("prompt", InputKind::Text, COMBINE_TEXTS_PROMPT),
        CREATIVITY,
    ],
    outputs: &["combined_texts"],
};

#[async_trait]
impl Node for CombineTexts {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &COMBINE_TEXTS
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError> {
        let text_1 = inputs.text("text_1")?;
        let text_2 = inputs.text("text_2")?;
        let prefix_1 = inputs.text_or("text_1_prefix", "1")?;
        let prefix_2 = inputs.text_or("text_2_prefix", "2")?;
        let prompt = inputs.text_or("prompt", COMBINE_TEXTS_PROMPT)?;

        let request = request(
            inputs,
            format!("{prompt}\n{prefix_1} {text_1}\n{prefix_2} {text_2}"),
        )?;

        let combined = complete(service, &request).await?;
        Ok(NodeOutputs::new().with("combined_texts", combined))
    }
}

// ---------------------------------------------------------------------------
// Transform Text
// ---------------------------------------------------------------------------

/// Applies a free-form instruction to a text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformText;

static TRANSFORM_TEXT: NodeDescriptor = NodeDescriptor {
    type_id: "transform_text",
    display_name: "Transform Text",
    category: CATEGORY,
    inputs: &[
        InputSpec::required("text", InputKind::Text),
        MODEL,
        SYSTEM_PROMPT,
        InputSpec::optional("prompt", InputKind::Text, TRANSFORM_TEXT_PROMPT),
        CREATIVITY,
    ],
    outputs: &["transformed_text"],
};

#[async_trait]
impl Node for TransformText {
    fn descriptor(&self) -> &'static NodeDescriptor {
        &TRANSFORM_TEXT
    }

    async fn execute(
        &self,
        inputs: &NodeInputs,
        service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError> {
        let text = inputs.text("text")?;
        let prompt = inputs.text_or("prompt", TRANSFORM_TEXT_PROMPT)?;

        let request = request(inputs, format!("{prompt}\nText: {text}\n"))?;

        let transformed = complete(service, &request).await?;
        Ok(NodeOutputs::new().with("transformed_text", transformed))
    }
}
