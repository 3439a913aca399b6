//! Claude node implementations and the orchestrators behind them.
//!
//! Nodes read a JSON object of inputs, build one or more [`pipeline::StepRequest`]s
//! and send them through a [`pipeline::CompletionService`]. The multi-call
//! nodes delegate to two orchestrators:
//!
//! - [`refine::refine`]: sequential passes over one artifact, keeping the last
//!   good text when a pass fails.
//! - [`chain::run_chain`]: up to three dependent steps plus a combination
//!   step; any failure is fatal.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes sequence calls between the domain types in
//! [`pipeline`] and whatever [`pipeline::CompletionService`] the host injects.
//! They never touch HTTP.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`composer`] | Template scaffolds, format/detail instructions, few-shot blocks |
//! | [`refine`] | Refinement orchestrator |
//! | [`chain`] | Chain orchestrator |
//! | [`registry`] | `Node` trait, `NodeInputs`/`NodeOutputs`, `NodeRegistry` |
//! | [`builtin`] | The nine built-in nodes |

pub mod builtin;
pub mod chain;
pub mod composer;
pub mod refine;
pub mod registry;

#[cfg(test)]
mod testing;

pub use chain::{run_chain, ChainOutcome, ChainPlan, ChainStep};
pub use composer::{compose, PromptComposer};
pub use refine::{refine, RefineConfig, RefinementOutcome, RefinementWarning};
pub use registry::{
    InputKind, InputSpec, Node, NodeDescriptor, NodeError, NodeInputs, NodeOutputs, NodeRegistry,
};
