//! Temp artifact allocation and disposal.
//!
//! Every session owns an [`ArtifactRegistry`]. Paths are namespaced by the
//! session token and a monotonic counter, so two sessions sharing a temp
//! directory never collide and no locking is needed.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Prefix for every allocated file name.
const ARTIFACT_PREFIX: &str = "vidfusion";

/// Unique token identifying one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// The token as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of an artifact owned by a session.
pub type ArtifactHandle = PathBuf;

/// Allocates intermediate artifact paths for one session and tracks them for
/// disposal.
#[derive(Debug)]
pub struct ArtifactRegistry {
    root: PathBuf,
    session: SessionId,
    next: u64,
    root_ready: bool,
    handles: Vec<ArtifactHandle>,
}

impl ArtifactRegistry {
    /// Create a registry allocating under `root`.
    pub fn new(root: impl Into<PathBuf>, session: SessionId) -> Self {
        Self {
            root: root.into(),
            session,
            next: 0,
            root_ready: false,
            handles: Vec::new(),
        }
    }

    /// Directory artifacts are allocated in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Session this registry belongs to.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Reserve a new artifact path with the given extension.
    ///
    /// The root directory is created on first use. The file itself is not
    /// created; the step writing it does that.
    pub fn allocate(&mut self, extension: &str) -> Result<ArtifactHandle> {
        if !self.root_ready {
            std::fs::create_dir_all(&self.root)
                .map_err(|e| Error::resource_at("failed to create temp dir", &self.root, e))?;
            self.root_ready = true;
        }

        let name = format!(
            "{}_{}_{:04}.{}",
            ARTIFACT_PREFIX, self.session, self.next, extension
        );
        self.next += 1;

        let path = self.root.join(name);
        self.handles.push(path.clone());
        Ok(path)
    }

    /// Take ownership of an artifact created elsewhere.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.handles.contains(&path) {
            self.handles.push(path);
        }
    }

    /// Every artifact registered so far, in creation order.
    pub fn handles(&self) -> &[ArtifactHandle] {
        &self.handles
    }

    /// Whether `path` is owned by this registry.
    pub fn owns(&self, path: &Path) -> bool {
        self.handles.iter().any(|h| h == path)
    }

    /// Remove every registered artifact from disk.
    ///
    /// Missing files are fine, so calling this twice is harmless. Returns the
    /// number of files actually removed. Other failures are reported after
    /// every file has been attempted.
    pub fn dispose_all(&self) -> Result<usize> {
        let mut removed = 0;
        let mut first_error = None;

        for path in &self.handles {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    removed += 1;
                    tracing::trace!(path = %path.display(), "Removed temp artifact");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to remove temp artifact"
                    );
                    if first_error.is_none() {
                        first_error = Some(Error::resource_at("failed to remove", path, e));
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }
}
