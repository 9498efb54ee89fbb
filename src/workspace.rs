//! Path-scoped access to a sandbox's workspace directory.
//!
//! Every file operation goes through [`ScopedWorkspace::resolve`], which
//! rejects any path that would land outside the workspace root, whether via
//! `..` components, absolute paths, or symlinks pointing elsewhere.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// A workspace directory with all paths confined to its root.
#[derive(Debug, Clone)]
pub struct ScopedWorkspace {
    /// Canonical absolute path of the workspace root.
    root: PathBuf,
    /// Directory names skipped by [`ScopedWorkspace::list_files`].
    excluded_dirs: Vec<String>,
}

impl ScopedWorkspace {
    /// Creates the root directory if needed and opens it as a workspace.
    pub async fn create(root: impl AsRef<Path>, excluded_dirs: Vec<String>) -> Result<Self> {
        tokio::fs::create_dir_all(root.as_ref()).await?;
        let root = tokio::fs::canonicalize(root.as_ref()).await?;
        Ok(Self {
            root,
            excluded_dirs,
        })
    }

    /// Returns the canonical workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a workspace-relative path to an absolute path under the root.
    ///
    /// An empty path or `.` resolves to the root itself.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let relative = relative.as_ref();
        let escape = || Error::PathEscape {
            path: relative.display().to_string(),
        };

        let mut normalized = self.root.clone();
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => normalized.push(part),
                Component::ParentDir => {
                    if normalized == self.root {
                        return Err(escape());
                    }
                    normalized.pop();
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape()),
            }
        }

        // Lexically inside the root; now make sure no existing component is a
        // symlink that leads back out.
        let mut existing = normalized.as_path();
        while std::fs::symlink_metadata(existing).is_err() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => return Err(escape()),
            }
        }

        let canonical = std::fs::canonicalize(existing).map_err(|_| escape())?;
        if !canonical.starts_with(&self.root) {
            tracing::warn!(
                path = %relative.display(),
                target = ?canonical,
                "rejected symlink escape"
            );
            return Err(escape());
        }

        let remainder = normalized.strip_prefix(existing).map_err(|_| escape())?;
        if remainder.as_os_str().is_empty() {
            Ok(canonical)
        } else {
            Ok(canonical.join(remainder))
        }
    }

    /// Writes `content` to `path`, creating parent directories as needed.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let target = self.resolve(path)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;

        tracing::debug!(path = %path, bytes = content.len(), "wrote workspace file");
        Ok(())
    }

    /// Reads the file at `path` as UTF-8.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let target = self.resolve(path)?;

        tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::NotFound(PathBuf::from(path)),
                _ => Error::Io(e),
            })
    }

    /// Returns true if `path` exists inside the workspace.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    /// Recursively lists regular files under `directory` (or the root).
    ///
    /// Paths are returned relative to the workspace root in depth-first
    /// order. Excluded directories are never descended into; listing one of
    /// them, or anything below one, yields nothing.
    pub async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>> {
        let start = self.resolve(directory.unwrap_or(""))?;

        let inside_excluded = start
            .strip_prefix(&self.root)
            .map(|relative| {
                relative
                    .components()
                    .any(|c| self.is_excluded(&c.as_os_str().to_string_lossy()))
            })
            .unwrap_or(false);
        if inside_excluded {
            tracing::debug!(directory = ?directory, "listing inside excluded directory");
            return Ok(Vec::new());
        }

        let metadata = tokio::fs::metadata(&start).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(PathBuf::from(directory.unwrap_or("."))),
            _ => Error::Io(e),
        })?;
        if !metadata.is_dir() {
            return Err(Error::NotFound(PathBuf::from(directory.unwrap_or("."))));
        }

        let mut files = Vec::new();
        let mut stack = vec![start];

        while let Some(dir) = stack.pop() {
            let mut entries = Vec::new();
            let mut reader = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = reader.next_entry().await? {
                entries.push(entry);
            }
            entries.sort_by_key(|e| e.file_name());

            let mut subdirs = Vec::new();
            for entry in entries {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    let name = entry.file_name();
                    if self.is_excluded(&name.to_string_lossy()) {
                        continue;
                    }
                    subdirs.push(entry.path());
                } else if file_type.is_file() {
                    if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                        files.push(relative.to_string_lossy().to_string());
                    }
                }
            }

            // Reverse so the first subdirectory is popped first.
            stack.extend(subdirs.into_iter().rev());
        }

        Ok(files)
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excluded_dirs.iter().any(|d| d == name)
    }
}
