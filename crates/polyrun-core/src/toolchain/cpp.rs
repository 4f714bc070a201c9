use std::path::PathBuf;

use super::c::{ARTIFACT, native_limits, native_run_command, precheck_native};
use super::{CommandLine, Stage, ToolchainAdapter, ToolchainDescriptor, workspace_file};
use crate::language::Language;
use crate::process::ResourceLimits;
use crate::validate::Rejection;
use crate::workspace::Workspace;

const SOURCE_FILE: &str = "main.cpp";

/// G++, C++17.
#[derive(Debug, Clone)]
pub struct CppToolchain {
    compiler: PathBuf,
}

impl CppToolchain {
    pub fn new(compiler: PathBuf) -> Self {
        Self { compiler }
    }
}

impl ToolchainAdapter for CppToolchain {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn descriptor(&self) -> ToolchainDescriptor {
        ToolchainDescriptor {
            language: Language::Cpp,
            source_extension: "cpp",
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
                .args(["-std=c++17", "-O2", "-pipe", "-o"])
                .arg(workspace_file(workspace.artifact_path(), ARTIFACT))
                .arg(workspace_file(workspace.source_path(), SOURCE_FILE)),
        )
    }

    fn run_command(&self, workspace: &Workspace) -> CommandLine {
        native_run_command(workspace)
    }

    fn limits(&self, stage: Stage) -> ResourceLimits {
        native_limits(stage)
    }
}
