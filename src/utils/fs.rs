use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const WORKSPACE_PREFIX: &str = "autoinstall_build_";

/// Temporary directory tree owned by a single build.
///
/// Removal is best-effort: failures are logged and never returned, so they
/// cannot mask the error that ended the build.
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh, uniquely named workspace under `root` (or the system
    /// temp dir).
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).with_context(|| {
                    format!("Failed to create work directory root: {}", root.display())
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("Failed to create working directory")?;

        let path = dir.path().to_path_buf();
        info!("Created working directory: {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create_subdirectory(&self, name: &str) -> Result<PathBuf> {
        let subdir = self.path.join(name);
        std::fs::create_dir_all(&subdir)
            .with_context(|| format!("Failed to create subdirectory: {}", subdir.display()))?;
        Ok(subdir)
    }

    /// Remove the workspace now.
    pub fn cleanup(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        info!("Cleaning up working directory: {}", self.path.display());

        // Extracted image files are read-only; make them removable first.
        if let Err(e) = make_tree_writable(&self.path) {
            debug!("Could not restore write permission before cleanup: {:#}", e);
        }

        match dir.close() {
            Ok(()) => debug!("Successfully cleaned up working directory"),
            Err(e) => warn!(
                "Failed to remove working directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Give the owner write permission on every file and directory under `root`.
///
/// Image extraction reproduces the read-only modes of ISO 9660, which would
/// otherwise block patching and cleanup for non-root users.
pub fn make_tree_writable(root: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if entry.file_type().is_symlink() {
                continue;
            }

            let metadata = entry.metadata()?;
            let mut permissions = metadata.permissions();
            if permissions.mode() & 0o200 == 0 {
                permissions.set_mode(permissions.mode() | 0o200);
                std::fs::set_permissions(entry.path(), permissions).with_context(|| {
                    format!("Failed to set permissions for: {}", entry.path().display())
                })?;
            }
        }
    }

    #[cfg(not(unix))]
    {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            let mut permissions = entry.metadata()?.permissions();
            if permissions.readonly() {
                permissions.set_readonly(false);
                std::fs::set_permissions(entry.path(), permissions)?;
            }
        }
    }

    Ok(())
}
