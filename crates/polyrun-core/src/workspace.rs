//! Per-request workspaces.
//!
//! Every request gets its own directory under the configured root:
//!
//! ```text
//! <workspace_root>/
//! └── <uuid>/        # one per request, removed when the request ends
//!     ├── main.c     # materialized source
//!     └── main       # compiled artifact (compiled languages only)
//! ```
//!
//! Names are UUID v4, so concurrent requests never share paths and no
//! locking is needed.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::SandboxIdentity;
use crate::error::{Error, Result};

/// An isolated filesystem scope for one execution request.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    root_dir: PathBuf,
    source_path: Option<PathBuf>,
    artifact_path: Option<PathBuf>,
    owner: Option<SandboxIdentity>,
    destroyed: bool,
}

impl Workspace {
    /// Allocate a fresh workspace directory under `root`.
    ///
    /// When `owner` is set the directory is handed to that identity so a
    /// compiler running with dropped privileges can write its artifact.
    pub fn create(root: &Path, owner: Option<SandboxIdentity>) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| Error::workspace(root, e))?;
        if owner.is_some() {
            ensure_traversable(root)?;
        }

        let id = Uuid::new_v4();
        let root_dir = root.join(id.to_string());
        fs::create_dir(&root_dir).map_err(|e| Error::workspace(&root_dir, e))?;

        let workspace = Self {
            id,
            root_dir,
            source_path: None,
            artifact_path: None,
            owner,
            destroyed: false,
        };
        workspace.restrict_permissions()?;

        tracing::debug!(workspace = %workspace.id, "Created workspace {}", workspace.root_dir.display());
        Ok(workspace)
    }

    #[cfg(unix)]
    fn restrict_permissions(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let mode = if self.owner.is_some() { 0o755 } else { 0o700 };
        fs::set_permissions(&self.root_dir, fs::Permissions::from_mode(mode))
            .map_err(|e| Error::workspace(&self.root_dir, e))?;

        if let Some(owner) = self.owner {
            std::os::unix::fs::chown(&self.root_dir, Some(owner.uid), Some(owner.gid))
                .map_err(|e| Error::workspace(&self.root_dir, e))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn restrict_permissions(&self) -> Result<()> {
        Ok(())
    }

    /// Unique identifier of this workspace.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The workspace directory.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Path of the materialized source file, once written.
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Path of the compiled artifact, once reserved.
    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    /// Write the user's source into the workspace as `filename`.
    pub fn write_source(&mut self, filename: &str, content: &str) -> Result<&Path> {
        let path = self.root_dir.join(sanitize_file_name(filename));
        fs::write(&path, content).map_err(|e| Error::workspace(&path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644))
                .map_err(|e| Error::workspace(&path, e))?;
        }

        Ok(self.source_path.insert(path).as_path())
    }

    /// Reserve the path of the compiled artifact.
    pub fn reserve_artifact(&mut self, name: &str) -> &Path {
        let path = self.root_dir.join(sanitize_file_name(name));
        self.artifact_path.insert(path).as_path()
    }

    /// Remove the workspace and everything in it.
    ///
    /// Best-effort and idempotent. Failures are logged, never returned.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        match fs::remove_dir_all(&self.root_dir) {
            Ok(()) => {
                tracing::debug!(workspace = %self.id, "Destroyed workspace");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    workspace = %self.id,
                    "Failed to remove workspace {}: {}",
                    self.root_dir.display(),
                    e
                );
            }
        }
    }

    /// Whether [`destroy`](Self::destroy) already ran.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Covers cancelled futures and panics; the orchestrator destroys
        // explicitly on every normal path.
        self.destroy();
    }
}

/// Let other users pass through `root` so the sandbox identity can reach
/// its own workspace below it.
#[cfg(unix)]
fn ensure_traversable(root: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(root)
        .map_err(|e| Error::workspace(root, e))?
        .permissions()
        .mode();
    if mode & 0o111 != 0o111 {
        fs::set_permissions(root, fs::Permissions::from_mode((mode & 0o7777) | 0o111))
            .map_err(|e| Error::workspace(root, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_traversable(_root: &Path) -> Result<()> {
    Ok(())
}

/// Keep only the final path component so a file name can never escape the
/// workspace directory.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("source");
    if base.is_empty() || base == "." || base == ".." {
        "source".to_string()
    } else {
        base.to_string()
    }
}
