use std::path::PathBuf;

use super::{CommandLine, Stage, ToolchainAdapter, ToolchainDescriptor, workspace_file};
use crate::execute::FailureKind;
use crate::language::Language;
use crate::process::ResourceLimits;
use crate::validate::Rejection;
use crate::workspace::Workspace;

const SOURCE_FILE: &str = "main.c";
pub(super) const ARTIFACT: &str = "main";

/// Entry-point and include checks shared by C and C++.
pub(super) fn precheck_native(source: &str) -> Result<(), Rejection> {
    if !source.contains("int main") {
        return Err(Rejection::new(
            FailureKind::MissingEntryPoint,
            "Compilation Error: undefined reference to `main`\nError: main function not found",
        ));
    }
    if !source.contains("#include") {
        return Err(Rejection::new(
            FailureKind::MissingIncludeOrClass,
            "Compilation Error: Missing required header files",
        ));
    }
    Ok(())
}

/// Limits for gcc/g++ and for the binaries they produce.
pub(super) fn native_limits(stage: Stage) -> ResourceLimits {
    match stage {
        Stage::Compile => ResourceLimits {
            address_space_bytes: Some(1024 * 1024 * 1024),
            max_processes: Some(64),
            ..Default::default()
        },
        Stage::Run => ResourceLimits {
            address_space_bytes: Some(256 * 1024 * 1024),
            max_processes: Some(16),
            ..Default::default()
        },
    }
}

/// Run the artifact compiled into the workspace.
pub(super) fn native_run_command(workspace: &Workspace) -> CommandLine {
    let artifact = workspace
        .artifact_path()
        .map(PathBuf::from)
        .unwrap_or_else(|| workspace.root_dir().join(ARTIFACT));
    CommandLine::new(artifact)
}

/// GCC, C11.
#[derive(Debug, Clone)]
pub struct CToolchain {
    compiler: PathBuf,
}

impl CToolchain {
    pub fn new(compiler: PathBuf) -> Self {
        Self { compiler }
    }
}

impl ToolchainAdapter for CToolchain {
    fn language(&self) -> Language {
        Language::C
    }

    fn descriptor(&self) -> ToolchainDescriptor {
        ToolchainDescriptor {
            language: Language::C,
            source_extension: "c",
            compile_required: true,
            compiler: Some(self.compiler.clone()),
            runtime: None,
        }
    }

    fn precheck(&self, source: &str) -> Result<(), Rejection> {
        precheck_native(source)
    }

    fn source_file_name(&self, _source: &str) -> String {
        SOURCE_FILE.to_string()
    }

    fn artifact_name(&self, _source: &str) -> Option<String> {
        Some(ARTIFACT.to_string())
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<CommandLine> {
        Some(
            CommandLine::new(&self.compiler)
                .args(["-std=c11", "-O2", "-pipe", "-o"])
                .arg(workspace_file(workspace.artifact_path(), ARTIFACT))
                .arg(workspace_file(workspace.source_path(), SOURCE_FILE))
                .arg("-lm"),
        )
    }

    fn run_command(&self, workspace: &Workspace) -> CommandLine {
        native_run_command(workspace)
    }

    fn limits(&self, stage: Stage) -> ResourceLimits {
        native_limits(stage)
    }
}
