//! Execution pipeline for untrusted source.
//!
//! # Architecture
//!
//! ```text
//! ExecutionRequest
//!     │
//!     └── Orchestrator
//!             │
//!             ├── Validator            (size, deny-list)
//!             ├── ToolchainAdapter     (prechecks, argv)
//!             ├── Workspace            (source + artifact, always destroyed)
//!             │
//!             └── ProcessRunner        (compile, then run)
//!                     │
//!                     └── OutputEvent channel ──► transport
//! ```
//!
//! Buffered callers use [`Orchestrator::execute`]; streaming callers use
//! [`Orchestrator::execute_streaming`] or [`Orchestrator::stream`]. Both run
//! the same pipeline and yield the same [`ExecutionOutcome`].

mod event;
mod orchestrator;
mod outcome;

use serde::{Deserialize, Serialize};

pub use event::OutputEvent;
pub use orchestrator::Orchestrator;
pub use outcome::ExecutionOutcome;

use crate::language::Language;

/// One request to build and run a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: Language,
    pub source: String,
}

impl ExecutionRequest {
    pub fn new(language: Language, source: impl Into<String>) -> Self {
        Self {
            language,
            source: source.into(),
        }
    }
}

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    EmptyCode,
    PayloadTooLarge,
    RestrictedConstruct,
    MissingEntryPoint,
    MissingIncludeOrClass,
    CompileFailure,
    LaunchFailure,
    RuntimeFailure,
    Timeout,
    InternalError,
}

impl FailureKind {
    /// Refused by the policy validator.
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            FailureKind::EmptyCode | FailureKind::PayloadTooLarge | FailureKind::RestrictedConstruct
        )
    }
}
