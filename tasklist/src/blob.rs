//! Blob store seam for image and file attachments.
//!
//! Tasks reference blobs by URL. The repository only ever deletes blobs:
//! uploads happen before a URL is attached, outside this crate. A
//! [`BlobLocator`] turns a stored URL into the storage-relative path the
//! store understands by stripping everything up to the bucket name.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

/// Default bucket holding task attachments.
pub const DEFAULT_BUCKET: &str = "todo-attachments";

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The path would escape the store root or is otherwise malformed.
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
    /// Filesystem error for a specific object.
    #[error("blob i/o error for {path}: {source}")]
    Io {
        /// Object path relative to the store root.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The store refused the request.
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Object storage addressed by path.
pub trait BlobStore: Send + Sync {
    /// Deletes the objects at `paths`. Missing objects are not an error.
    fn remove(&self, paths: &[String]) -> impl Future<Output = Result<(), BlobError>> + Send;
}

impl<B: BlobStore> BlobStore for Arc<B> {
    fn remove(&self, paths: &[String]) -> impl Future<Output = Result<(), BlobError>> + Send {
        (**self).remove(paths)
    }
}

/// Maps attachment URLs to storage-relative paths within one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocator {
    bucket: String,
}

impl Default for BlobLocator {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET)
    }
}

impl BlobLocator {
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Storage path for an attachment reference.
    ///
    /// Absolute URLs must contain the bucket as a path segment; the path
    /// is whatever follows it (query and fragment dropped). Absolute URLs
    /// outside the bucket point at blobs this store does not own and map
    /// to `None`. Anything else is treated as a path already, with an
    /// optional leading `/` and `<bucket>/` stripped.
    #[must_use]
    pub fn path_of(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if let Ok(url) = Url::parse(reference) {
            let mut segments = url.path_segments()?;
            segments.by_ref().find(|segment| *segment == self.bucket)?;
            let path = segments.collect::<Vec<_>>().join("/");
            return (!path.is_empty()).then_some(path);
        }

        let relative = reference.trim_start_matches('/');
        let relative = relative
            .strip_prefix(self.bucket.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(relative);
        (!relative.is_empty()).then(|| relative.to_string())
    }

    /// Storage paths for a set of references, deduplicated, order kept.
    #[must_use]
    pub fn paths_of<'a>(&self, references: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut seen = BTreeSet::new();
        references
            .into_iter()
            .filter_map(|reference| {
                let path = self.path_of(reference);
                if path.is_none() {
                    tracing::debug!(reference, "attachment outside bucket, not removing");
                }
                path
            })
            .filter(|path| seen.insert(path.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Blob store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let is_plain = relative.components().next().is_some()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn remove_one(&self, path: &str) -> Result<(), BlobError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BlobError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}

impl BlobStore for FsBlobStore {
    /// Attempts every path and reports the first failure.
    async fn remove(&self, paths: &[String]) -> Result<(), BlobError> {
        let mut first_error = None;
        for path in paths {
            if let Err(e) = self.remove_one(path).await {
                tracing::warn!(path = %path, error = %e, "failed to remove blob");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryInner {
    objects: BTreeSet<String>,
    removals: Vec<Vec<String>>,
    failing: bool,
}

/// In-process blob store that records every `remove` call.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object at `path`.
    pub fn insert(&self, path: impl Into<String>) {
        self.inner.lock().objects.insert(path.into());
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.inner.lock().objects.contains(path)
    }

    /// Arguments of every `remove` call so far, in call order.
    #[must_use]
    pub fn removals(&self) -> Vec<Vec<String>> {
        self.inner.lock().removals.clone()
    }

    /// Makes subsequent `remove` calls fail (after recording them).
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }
}

impl BlobStore for MemoryBlobStore {
    async fn remove(&self, paths: &[String]) -> Result<(), BlobError> {
        let mut inner = self.inner.lock();
        inner.removals.push(paths.to_vec());
        if inner.failing {
            return Err(BlobError::Unavailable("memory store set to fail".to_string()));
        }
        for path in paths {
            inner.objects.remove(path);
        }
        drop(inner);
        Ok(())
    }
}
