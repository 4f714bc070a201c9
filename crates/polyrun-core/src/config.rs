//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wall-clock budget for each spawned process.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default maximum accepted source size in bytes.
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 10 * 1024;

/// Default cap on captured stdout+stderr per process.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// The unprivileged identity child processes run as when the host is root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl SandboxIdentity {
    /// `nobody:nogroup` on most distributions.
    pub const NOBODY: SandboxIdentity = SandboxIdentity {
        uid: 65534,
        gid: 65534,
    };
}

/// Locations of the host toolchain binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainPaths {
    pub python: PathBuf,
    pub c_compiler: PathBuf,
    pub cpp_compiler: PathBuf,
    pub java_compiler: PathBuf,
    pub java_runtime: PathBuf,
}

impl ToolchainPaths {
    /// Look each binary up on `PATH`, keeping the bare name when not found so
    /// the failure surfaces as a launch failure at spawn time.
    pub fn detect() -> Self {
        Self {
            python: find_binary(&["python3", "python"]),
            c_compiler: find_binary(&["gcc", "cc"]),
            cpp_compiler: find_binary(&["g++", "c++"]),
            java_compiler: find_binary(&["javac"]),
            java_runtime: find_binary(&["java"]),
        }
    }
}

impl Default for ToolchainPaths {
    fn default() -> Self {
        Self::detect()
    }
}

fn find_binary(candidates: &[&str]) -> PathBuf {
    for name in candidates {
        if let Ok(path) = which::which(name) {
            return path;
        }
    }
    tracing::debug!("No binary found for {:?}", candidates);
    PathBuf::from(candidates[0])
}

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Wall-clock budget for each compile or run invocation.
    pub timeout: Duration,
    /// Maximum accepted source size in bytes.
    pub max_source_bytes: usize,
    /// Maximum captured output per process (stdout and stderr combined).
    pub max_output_bytes: usize,
    /// Directory under which per-request workspaces are created.
    pub workspace_root: PathBuf,
    /// Identity to drop to when running as root. `None` disables dropping.
    pub sandbox_identity: Option<SandboxIdentity>,
    /// Toolchain binaries.
    pub toolchains: ToolchainPaths,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            workspace_root: std::env::temp_dir().join("polyrun"),
            sandbox_identity: Some(SandboxIdentity::NOBODY),
            toolchains: ToolchainPaths::detect(),
        }
    }
}

impl ExecutionConfig {
    /// Set the per-process timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the workspace root directory.
    pub fn with_workspace_root(mut self, root: impl AsRef<Path>) -> Self {
        self.workspace_root = root.as_ref().to_path_buf();
        self
    }

    /// Set the maximum source size.
    pub fn with_max_source_bytes(mut self, max: usize) -> Self {
        self.max_source_bytes = max;
        self
    }

    /// Set the output cap.
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    /// Set (or clear) the sandbox identity.
    pub fn with_sandbox_identity(mut self, identity: Option<SandboxIdentity>) -> Self {
        self.sandbox_identity = identity;
        self
    }

    /// Override the toolchain binaries.
    pub fn with_toolchains(mut self, toolchains: ToolchainPaths) -> Self {
        self.toolchains = toolchains;
        self
    }

    /// The identity actually applied to children.
    ///
    /// Dropping privileges needs root; for any other host user the children
    /// simply inherit it.
    pub fn effective_identity(&self) -> Option<SandboxIdentity> {
        #[cfg(unix)]
        {
            // SAFETY: geteuid has no preconditions and cannot fail.
            let euid = unsafe { libc::geteuid() };
            if euid == 0 { self.sandbox_identity } else { None }
        }
        #[cfg(not(unix))]
        {
            None
        }
    }
}
