//! Core engine for polyrun.
//!
//! This crate provides:
//! - Static policy validation of untrusted source
//! - Per-request workspaces with guaranteed cleanup
//! - Toolchain adapters for Python, C, C++ and Java
//! - A supervised process runner with timeouts and streamed output
//! - The execution orchestrator tying the pipeline together

pub mod config;
pub mod error;
pub mod execute;
pub mod language;
pub mod process;
pub mod templates;
pub mod toolchain;
pub mod validate;
pub mod workspace;

pub use config::{ExecutionConfig, SandboxIdentity, ToolchainPaths};
pub use error::{Error, Result};
pub use execute::{
    ExecutionOutcome, ExecutionRequest, FailureKind, Orchestrator, OutputEvent,
};
pub use language::Language;
pub use process::{CommandSpec, ProcessReport, ProcessRunner, ProcessStatus, ResourceLimits};
pub use toolchain::{Toolchain, ToolchainAdapter, ToolchainDescriptor, Toolchains};
pub use validate::{Rejection, Validator};
pub use workspace::Workspace;
