//! Language toolchain adapters.
//!
//! Each supported [`Language`] has one [`ToolchainAdapter`] describing how to
//! compile (if needed) and run a snippet. Adapters only produce argv; the
//! [`Toolchain`] wrapper turns that into a [`CommandSpec`] with the sandbox
//! environment, identity and limits, and drives the [`ProcessRunner`].
//!
//! Adding a language means adding an adapter and a registry slot, nothing
//! else.

mod c;
mod cpp;
mod java;
mod python;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

pub use c::CToolchain;
pub use cpp::CppToolchain;
pub use java::JavaToolchain;
pub use python::PythonToolchain;

use crate::config::{SandboxIdentity, ToolchainPaths};
use crate::execute::OutputEvent;
use crate::language::Language;
use crate::process::{CommandSpec, ProcessReport, ProcessRunner, ResourceLimits};
use crate::validate::Rejection;
use crate::workspace::Workspace;

/// Search path handed to every child.
const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Largest file a child may write (compiler artifacts included).
const MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;

/// Static description of a language's toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainDescriptor {
    pub language: Language,
    pub source_extension: &'static str,
    pub compile_required: bool,
    pub compiler: Option<PathBuf>,
    /// Host runtime, or `None` when the compiled artifact runs on its own.
    pub runtime: Option<PathBuf>,
}

impl ToolchainDescriptor {
    /// Whether every host binary this toolchain needs resolves to an
    /// executable.
    pub fn is_available(&self) -> bool {
        if self.compiler.is_none() && self.runtime.is_none() {
            return false;
        }
        self.compiler.as_deref().is_none_or(is_executable)
            && self.runtime.as_deref().is_none_or(is_executable)
    }
}

fn is_executable(path: &Path) -> bool {
    if path.is_absolute() {
        path.is_file()
    } else {
        which::which(path).is_ok()
    }
}

/// Which invocation a command or limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Run,
}

/// A program and its arguments, before sandbox settings are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub stdin: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Feed `path` to the program's stdin.
    pub fn stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Language-specific build-and-run strategy.
pub trait ToolchainAdapter: Send + Sync + fmt::Debug {
    fn language(&self) -> Language;

    fn descriptor(&self) -> ToolchainDescriptor;

    /// Cheap static checks that fail fast without invoking a compiler.
    fn precheck(&self, _source: &str) -> Result<(), Rejection> {
        Ok(())
    }

    /// File name the source is written under.
    fn source_file_name(&self, source: &str) -> String;

    /// Name of the compiled artifact, for languages that produce one.
    fn artifact_name(&self, _source: &str) -> Option<String> {
        None
    }

    /// Compiler invocation, or `None` for interpreted languages.
    fn compile_command(&self, workspace: &Workspace) -> Option<CommandLine>;

    fn run_command(&self, workspace: &Workspace) -> CommandLine;

    /// Extra environment on top of the sandbox defaults.
    fn environment(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn limits(&self, stage: Stage) -> ResourceLimits;
}

/// Bare name of a workspace file. Children run inside the workspace, so
/// diagnostics then never carry the host path.
pub(crate) fn workspace_file(file: Option<&Path>, fallback: &str) -> String {
    file.and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .unwrap_or(fallback)
        .to_string()
}

/// Registry of adapters, one per [`Language`].
#[derive(Debug)]
pub struct Toolchains {
    python: PythonToolchain,
    c: CToolchain,
    cpp: CppToolchain,
    java: JavaToolchain,
}

impl Toolchains {
    pub fn new(paths: &ToolchainPaths) -> Self {
        Self {
            python: PythonToolchain::new(paths.python.clone()),
            c: CToolchain::new(paths.c_compiler.clone()),
            cpp: CppToolchain::new(paths.cpp_compiler.clone()),
            java: JavaToolchain::new(paths.java_compiler.clone(), paths.java_runtime.clone()),
        }
    }

    pub fn get(&self, language: Language) -> &dyn ToolchainAdapter {
        match language {
            Language::Python => &self.python,
            Language::C => &self.c,
            Language::Cpp => &self.cpp,
            Language::Java => &self.java,
        }
    }

    /// Descriptors for every language, in [`Language::ALL`] order.
    pub fn descriptors(&self) -> Vec<ToolchainDescriptor> {
        Language::ALL
            .iter()
            .map(|&language| self.get(language).descriptor())
            .collect()
    }
}

impl Default for Toolchains {
    fn default() -> Self {
        Self::new(&ToolchainPaths::detect())
    }
}

/// Result of the compile stage.
#[derive(Debug)]
pub enum CompileResult {
    /// Interpreted language; nothing to do.
    NotRequired,
    Compiled(ProcessReport),
    /// Compiler did not exit cleanly (nonzero, signal, timeout or launch failure).
    Failed(ProcessReport),
}

/// An adapter bound to a runner and sandbox settings for one request.
pub struct Toolchain<'a> {
    adapter: &'a dyn ToolchainAdapter,
    runner: &'a ProcessRunner,
    identity: Option<SandboxIdentity>,
}

impl<'a> Toolchain<'a> {
    pub fn new(
        adapter: &'a dyn ToolchainAdapter,
        runner: &'a ProcessRunner,
        identity: Option<SandboxIdentity>,
    ) -> Self {
        Self {
            adapter,
            runner,
            identity,
        }
    }

    pub fn adapter(&self) -> &'a dyn ToolchainAdapter {
        self.adapter
    }

    /// Compile the workspace source if the language requires it.
    pub async fn prepare(&self, workspace: &Workspace) -> CompileResult {
        let Some(line) = self.adapter.compile_command(workspace) else {
            return CompileResult::NotRequired;
        };

        let spec = self.command_spec(line, workspace, Stage::Compile);
        let report = self.runner.run(&spec).await;
        if report.success() {
            CompileResult::Compiled(report)
        } else {
            CompileResult::Failed(report)
        }
    }

    /// Run the prepared program, forwarding output chunks to `events`.
    pub async fn execute(
        &self,
        workspace: &Workspace,
        events: Option<&mpsc::UnboundedSender<OutputEvent>>,
    ) -> ProcessReport {
        let line = self.adapter.run_command(workspace);
        let spec = self.command_spec(line, workspace, Stage::Run);
        self.runner.run_streaming(&spec, events).await
    }

    fn command_spec(&self, line: CommandLine, workspace: &Workspace, stage: Stage) -> CommandSpec {
        let dir = workspace.root_dir().display().to_string();

        let mut limits = self.adapter.limits(stage);
        limits.file_size_bytes.get_or_insert(MAX_FILE_BYTES);
        limits
            .cpu_seconds
            .get_or_insert(cpu_budget(self.runner.timeout()));
        if self.identity.is_none() {
            limits.max_processes = None;
        }

        let mut spec = CommandSpec::new(line.program, workspace.root_dir())
            .args(line.args)
            .env("PATH", search_path(&self.adapter_program_dirs()))
            .env("HOME", dir.clone())
            .env("TMPDIR", dir)
            .env("LANG", "C.UTF-8")
            .identity(self.identity)
            .limits(limits)
            .stdin_file(line.stdin);
        for (key, value) in self.adapter.environment() {
            spec = spec.env(key, value);
        }
        spec
    }

    fn adapter_program_dirs(&self) -> Vec<PathBuf> {
        let descriptor = self.adapter.descriptor();
        descriptor
            .compiler
            .iter()
            .chain(descriptor.runtime.iter())
            .filter_map(|p| p.parent())
            .filter(|p| p.is_absolute())
            .map(Path::to_path_buf)
            .collect()
    }
}

/// `SANDBOX_PATH` with the toolchain's own directories in front.
fn search_path(extra: &[PathBuf]) -> String {
    let mut dirs: Vec<String> = Vec::new();
    for dir in extra
        .iter()
        .map(|d| d.display().to_string())
        .chain(SANDBOX_PATH.split(':').map(str::to_string))
    {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs.join(":")
}

/// CPU seconds allowed for a wall-clock budget; one second of headroom.
fn cpu_budget(timeout: Duration) -> u64 {
    timeout.as_millis().div_ceil(1000) as u64 + 1
}
