//! Core domain for the Claude node workspace.
//!
//! This crate holds every shared type the nodes and orchestrators use: the
//! request/result types that cross the completion-service boundary, the closed
//! option enums, newtype identifiers, and the error types. Infrastructure
//! crates implement [`CompletionService`]; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Domain types + port definitions.** This crate has no I/O dependencies.
//! It defines *what* a completion call looks like; the `llm` crate defines
//! *how* it reaches the provider.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ModelId`, `NodeTypeId`, `RunId`) |
//! | [`types`] | Value types with invariants (`Creativity`, `IterationCount`, `ImageRef`, ...) |
//! | [`options`] | Closed option enums (`TemplateStyle`, `RefinementStrategy`, `CombinationMode`, ...) |
//! | [`completion`] | `CompletionService` port, `StepRequest`, `StepResult` |
//! | [`errors`] | Completion, configuration, and chain errors; retry policy |

pub mod completion;
pub mod errors;
pub mod identifiers;
pub mod options;
pub mod types;

#[doc(hidden)]
pub use serde as __serde;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use completion::{execute_step, Completion, CompletionService, StepRequest, StepResult};
pub use errors::{
    ChainError, CompletionError, CompletionErrorKind, InvalidConfiguration, RetryPolicy,
};
pub use identifiers::{ModelId, NodeTypeId, RunId, DEFAULT_MODEL, KNOWN_MODELS};
pub use options::{CombinationMode, DetailLevel, OutputFormat, RefinementStrategy, TemplateStyle};
pub use types::{
    Creativity, FewShotExample, ImageRef, IterationCount, Timestamp, TokenCount, MAX_CHAIN_STEPS,
    MAX_ITERATIONS, SUPPORTED_IMAGE_TYPES,
};
