//! Per-request workspaces.
//!
//! Every conversion gets its own directory `<root>/<uuid>` created with
//! owner-only permissions. A workspace is owned by the request that created
//! it until it is handed to [`WorkspaceManager::schedule_destroy`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{ConvertError, Result};

const MAX_FILENAME_LEN: usize = 100;
const FALLBACK_STEM: &str = "document";

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

/// A created workspace directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub token: Uuid,
    pub path: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named workspace under the root.
    pub async fn create(&self) -> Result<Workspace> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ConvertError::resource(&self.root, e))?;

        let token = Uuid::new_v4();
        let path = self.root.join(token.to_string());

        let mut builder = tokio::fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(0o700);
        // Non-recursive: an existing directory with this name is an error, never reused
        builder
            .create(&path)
            .await
            .map_err(|e| ConvertError::resource(&path, e))?;

        tracing::debug!(workspace = %token, "Workspace created");
        Ok(Workspace { token, path })
    }

    /// Write `data` into the workspace under a sanitized version of `filename`.
    pub async fn place_file(&self, workspace: &Workspace, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let safe_name = sanitize_filename(filename);
        let target = workspace.path.join(&safe_name);

        if target.parent() != Some(workspace.path.as_path()) {
            return Err(ConvertError::PathViolation {
                path: target,
                boundary: workspace.path.clone(),
            });
        }

        tokio::fs::write(&target, data)
            .await
            .map_err(|e| ConvertError::resource(&target, e))?;
        Ok(target)
    }

    /// Recursively remove a workspace. Removing a missing path is not an error.
    pub async fn destroy(&self, path: &Path) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove the workspace after `delay`, detached from the caller.
    ///
    /// Errors are logged and swallowed; the janitor picks up anything left.
    pub fn schedule_destroy(&self, path: PathBuf, delay: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match manager.destroy(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Deferred workspace cleanup done"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Deferred workspace cleanup failed"),
            }
        })
    }
}

/// Reduce an untrusted filename to a single safe path component.
///
/// Keeps only the final component (either separator), drops NUL and control
/// characters and `..` runs, maps anything outside `[A-Za-z0-9._-]` to `_`
/// and caps the length while keeping the extension.
pub fn sanitize_filename(filename: &str) -> String {
    let last = filename.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .replace("..", "");

    let mut sanitized = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(c);
    }

    let (stem, ext) = match sanitized.rfind('.') {
        Some(idx) if idx > 0 => (&sanitized[..idx], &sanitized[idx..]),
        _ => (sanitized.as_str(), ""),
    };
    let stem = stem.trim_matches('.');
    let stem = if stem.is_empty() || stem == "_" {
        FALLBACK_STEM
    } else {
        stem
    };

    let budget = MAX_FILENAME_LEN.saturating_sub(ext.len());
    let stem: String = stem.chars().take(budget).collect();
    format!("{stem}{ext}").chars().take(MAX_FILENAME_LEN).collect()
}

/// True when `candidate` is strictly below `root` once both are resolved.
///
/// Both paths are canonicalized (symlinks resolved) and compared by
/// component, so `/tmp/deck2pdf-evil` is not inside `/tmp/deck2pdf`.
pub fn is_strict_descendant(root: &Path, candidate: &Path) -> bool {
    let (Ok(root), Ok(candidate)) = (root.canonicalize(), candidate.canonicalize()) else {
        return false;
    };
    candidate != root && candidate.starts_with(&root)
}
