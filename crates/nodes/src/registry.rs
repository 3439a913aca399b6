//! Node trait, typed input/output maps, and the registry that dispatches by
//! node type id.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::str::FromStr;

use async_trait::async_trait;
use pipeline::{
    ChainError, CompletionError, CompletionService, Creativity, ImageRef, InvalidConfiguration,
    ModelId, NodeTypeId, RunId,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a node execution or registration.
#[derive(Debug, Error)]
pub enum NodeError {
    /// No node is registered under the requested type id.
    #[error("Unknown node type '{type_id}'")]
    UnknownNodeType {
        /// The requested type id.
        type_id: String,
    },

    /// A node with this type id is already registered.
    #[error("Node type '{type_id}' is already registered")]
    DuplicateNodeType {
        /// The conflicting type id.
        type_id: String,
    },

    /// An input failed validation before any call was made.
    #[error(transparent)]
    Configuration(#[from] InvalidConfiguration),

    /// A completion call failed.
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// A prompt chain failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// Type of a node input as presented to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Free text.
    Text,
    /// Boolean.
    Flag,
    /// Whole number.
    Integer,
    /// Floating-point number.
    Float,
    /// One of a fixed set of strings.
    Choice,
    /// One image object or an array of them.
    Images,
    /// Array of `{input, output}` objects.
    Examples,
}

/// Static description of one node input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InputSpec {
    /// Key in [`NodeInputs`].
    pub name: &'static str,
    /// Value type.
    pub kind: InputKind,
    /// Whether the input must be supplied.
    pub required: bool,
    /// Default, rendered as text. Empty when there is none.
    #[serde(skip_serializing_if = "is_blank")]
    pub default: &'static str,
    /// Accepted values for [`InputKind::Choice`].
    #[serde(skip_serializing_if = "has_no_choices")]
    pub choices: &'static [&'static str],
}

fn is_blank(default: &&'static str) -> bool {
    default.is_empty()
}

fn has_no_choices(choices: &&'static [&'static str]) -> bool {
    choices.is_empty()
}

impl InputSpec {
    /// A required input with no default.
    pub const fn required(name: &'static str, kind: InputKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: "",
            choices: &[],
        }
    }

    /// An optional input with a default.
    pub const fn optional(name: &'static str, kind: InputKind, default: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            default,
            choices: &[],
        }
    }

    /// An optional choice input.
    pub const fn choice(
        name: &'static str,
        choices: &'static [&'static str],
        default: &'static str,
    ) -> Self {
        Self {
            name,
            kind: InputKind::Choice,
            required: false,
            default,
            choices,
        }
    }
}

/// Static description of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeDescriptor {
    /// Registry key.
    pub type_id: &'static str,
    /// Human-readable name.
    pub display_name: &'static str,
    /// Grouping shown by hosts, e.g. `Claude/Advanced`.
    pub category: &'static str,
    /// Accepted inputs.
    pub inputs: &'static [InputSpec],
    /// Keys present in [`NodeOutputs`] on success.
    pub outputs: &'static [&'static str],
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Key under which every node reads its model.
pub const MODEL_INPUT: &str = "model";

/// Key under which every node reads its creativity.
pub const CREATIVITY_INPUT: &str = "creativity";

/// JSON object of node inputs with typed accessors.
///
/// Absent and `null` values are treated alike. Every accessor reports a type
/// mismatch as [`InvalidConfiguration`] naming the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeInputs(Map<String, Value>);

impl NodeInputs {
    /// Creates an empty input map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any previous value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name` to `value`, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns `true` if `name` has a non-null value.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    fn mismatch(name: &str, expected: &str, found: &Value) -> InvalidConfiguration {
        InvalidConfiguration::new(name, format!("expected {expected}, found {found}"))
    }

    /// Required text input.
    pub fn text(&self, name: &str) -> Result<String, InvalidConfiguration> {
        self.optional_text(name)?
            .ok_or_else(|| InvalidConfiguration::missing(name))
    }

    /// Text input with a default for absent values. An explicit empty string
    /// is kept.
    pub fn text_or(&self, name: &str, default: &str) -> Result<String, InvalidConfiguration> {
        match self.get(name) {
            None => Ok(default.to_string()),
            Some(Value::String(text)) => Ok(text.clone()),
            Some(other) => Err(Self::mismatch(name, "a string", other)),
        }
    }

    /// Text input that is `None` when absent or blank.
    pub fn optional_text(&self, name: &str) -> Result<Option<String>, InvalidConfiguration> {
        let text = self.text_or(name, "")?;
        Ok(if text.trim().is_empty() { None } else { Some(text) })
    }

    /// Boolean input.
    pub fn flag(&self, name: &str, default: bool) -> Result<bool, InvalidConfiguration> {
        match self.get(name) {
            None => Ok(default),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(other) => Err(Self::mismatch(name, "a boolean", other)),
        }
    }

    /// Integer input constrained to `range`.
    pub fn integer(
        &self,
        name: &str,
        default: i64,
        range: RangeInclusive<i64>,
    ) -> Result<i64, InvalidConfiguration> {
        let value = match self.get(name) {
            None => default,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| Self::mismatch(name, "an integer", value))?,
        };
        if !range.contains(&value) {
            return Err(InvalidConfiguration::new(
                name,
                format!(
                    "{value} is outside the range {}..={}",
                    range.start(),
                    range.end()
                ),
            ));
        }
        Ok(value)
    }

    /// Floating-point input. Integers are accepted.
    pub fn float(&self, name: &str, default: f64) -> Result<f64, InvalidConfiguration> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_f64()
                .ok_or_else(|| Self::mismatch(name, "a number", value)),
        }
    }

    /// Choice input parsed into `T`; unknown strings are rejected.
    pub fn choice<T>(&self, name: &str, default: T) -> Result<T, InvalidConfiguration>
    where
        T: FromStr<Err = InvalidConfiguration>,
    {
        Ok(self.optional_choice(name)?.unwrap_or(default))
    }

    /// Choice input where absent or `"none"` means no selection.
    pub fn optional_choice<T>(&self, name: &str) -> Result<Option<T>, InvalidConfiguration>
    where
        T: FromStr<Err = InvalidConfiguration>,
    {
        match self.optional_text(name)? {
            None => Ok(None),
            Some(text) if text.eq_ignore_ascii_case("none") => Ok(None),
            Some(text) => text
                .parse::<T>()
                .map(Some)
                .map_err(|err| err.for_field(name)),
        }
    }

    /// Deserializes an arbitrary input into `T`.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, InvalidConfiguration> {
        self.get(name)
            .map(|value| {
                T::deserialize(value).map_err(|err| InvalidConfiguration::new(name, err.to_string()))
            })
            .transpose()
    }

    /// Image input: a single image object or an array of them.
    pub fn images(&self, name: &str) -> Result<Vec<ImageRef>, InvalidConfiguration> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(Value::Array(_)) => Ok(self.parse::<Vec<ImageRef>>(name)?.unwrap_or_default()),
            Some(_) => Ok(self.parse::<ImageRef>(name)?.into_iter().collect()),
        }
    }

    /// The `model` input, or the default model.
    pub fn model(&self) -> Result<ModelId, InvalidConfiguration> {
        match self.optional_text(MODEL_INPUT)? {
            None => Ok(ModelId::default()),
            Some(model) => ModelId::new(model)
                .ok_or_else(|| InvalidConfiguration::new(MODEL_INPUT, "model id must not be blank")),
        }
    }

    /// The `creativity` input, or the default creativity.
    pub fn creativity(&self) -> Result<Creativity, InvalidConfiguration> {
        let default = Creativity::default().as_f64();
        let value = self.float(CREATIVITY_INPUT, default)?;
        Creativity::new(value).ok_or_else(|| {
            InvalidConfiguration::new(CREATIVITY_INPUT, format!("{value} is outside 0.0..=1.0"))
        })
    }
}

impl From<Map<String, Value>> for NodeInputs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Named text outputs of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeOutputs(BTreeMap<String, String>);

impl NodeOutputs {
    /// Creates an empty output map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an output.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Returns an output by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterates outputs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of outputs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no outputs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Node trait
// ---------------------------------------------------------------------------

/// A unit of work a host can invoke by type id.
#[async_trait]
pub trait Node: Send + Sync {
    /// Returns the static description of this node.
    fn descriptor(&self) -> &'static NodeDescriptor;

    /// Runs the node.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Configuration`] for invalid inputs (before any call
    /// is made), or the completion/chain failure that ended the run.
    async fn execute(
        &self,
        inputs: &NodeInputs,
        service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps node type ids to nodes.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<NodeTypeId, Box<dyn Node>>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in node.
    pub fn with_builtin_nodes() -> Self {
        let mut registry = Self::new();
        for node in crate::builtin::all() {
            // Built-in type ids are distinct constants.
            let type_id = node.descriptor().type_id;
            if let Some(id) = NodeTypeId::new(type_id) {
                registry.nodes.insert(id, node);
            }
        }
        registry
    }

    /// Registers `node` under its descriptor's type id.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::DuplicateNodeType`] if the id is taken, or
    /// [`NodeError::Configuration`] if the id is blank.
    pub fn register(&mut self, node: impl Node + 'static) -> Result<(), NodeError> {
        let type_id = node.descriptor().type_id;
        let id = NodeTypeId::new(type_id)
            .ok_or_else(|| InvalidConfiguration::new("type_id", "node type id must not be blank"))?;
        if self.nodes.contains_key(&id) {
            return Err(NodeError::DuplicateNodeType {
                type_id: type_id.to_string(),
            });
        }
        self.nodes.insert(id, Box::new(node));
        Ok(())
    }

    /// Looks up a node by type id.
    pub fn get(&self, type_id: &str) -> Option<&dyn Node> {
        let id = NodeTypeId::new(type_id)?;
        self.nodes.get(&id).map(Box::as_ref)
    }

    /// Descriptors of every registered node, ordered by category then type id.
    pub fn descriptors(&self) -> Vec<&'static NodeDescriptor> {
        let mut descriptors: Vec<_> = self.nodes.values().map(|node| node.descriptor()).collect();
        descriptors.sort_by_key(|d| (d.category, d.type_id));
        descriptors
    }

    /// Runs the node registered under `type_id`.
    ///
    /// The run executes inside a span carrying a fresh [`RunId`] and the type
    /// id.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::UnknownNodeType`] if nothing is registered under
    /// `type_id`, otherwise whatever the node returns.
    pub async fn execute(
        &self,
        type_id: &str,
        inputs: &NodeInputs,
        service: &dyn CompletionService,
    ) -> Result<NodeOutputs, NodeError> {
        let node = self.get(type_id).ok_or_else(|| NodeError::UnknownNodeType {
            type_id: type_id.to_string(),
        })?;

        let run_id = RunId::new_random();
        let span = info_span!("node_run", node_type = type_id, run_id = %run_id);
        async move {
            info!("Executing node");
            let result = node.execute(inputs, service).await;
            match &result {
                Ok(outputs) => info!(outputs = outputs.len(), "Node finished"),
                Err(error) => warn!(error = %error, "Node failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}
