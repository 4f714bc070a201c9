use std::path::PathBuf;

use super::{CommandLine, Stage, ToolchainAdapter, ToolchainDescriptor};
use crate::language::Language;
use crate::process::ResourceLimits;
use crate::workspace::Workspace;

const SOURCE_FILE: &str = "main.py";

/// CPython, run directly on the source file.
#[derive(Debug, Clone)]
pub struct PythonToolchain {
    interpreter: PathBuf,
}

impl PythonToolchain {
    pub fn new(interpreter: PathBuf) -> Self {
        Self { interpreter }
    }
}

impl ToolchainAdapter for PythonToolchain {
    fn language(&self) -> Language {
        Language::Python
    }

    fn descriptor(&self) -> ToolchainDescriptor {
        ToolchainDescriptor {
            language: Language::Python,
            source_extension: "py",
            compile_required: false,
            compiler: None,
            runtime: Some(self.interpreter.clone()),
        }
    }

    fn source_file_name(&self, _source: &str) -> String {
        SOURCE_FILE.to_string()
    }

    fn compile_command(&self, _workspace: &Workspace) -> Option<CommandLine> {
        None
    }

    fn run_command(&self, workspace: &Workspace) -> CommandLine {
        // CPython makes a script path absolute in tracebacks, so the source
        // goes in on stdin and frames read `<stdin>` instead.
        let source = workspace
            .source_path()
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace.root_dir().join(SOURCE_FILE));

        // -B: no .pyc, -u: unbuffered so output streams, -I: isolated mode.
        CommandLine::new(&self.interpreter)
            .args(["-B", "-u", "-I", "-"])
            .stdin(source)
    }

    fn environment(&self) -> Vec<(String, String)> {
        vec![("PYTHONIOENCODING".to_string(), "utf-8".to_string())]
    }

    fn limits(&self, _stage: Stage) -> ResourceLimits {
        ResourceLimits {
            address_space_bytes: Some(512 * 1024 * 1024),
            max_processes: Some(16),
            ..Default::default()
        }
    }
}
