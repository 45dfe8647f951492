//! In-memory mock filesystem for testing the reader without a shared volume.
//!
//! Clones of a `MockFs` share the same file table, so a test can hand one
//! clone to the reader and keep rewriting the "producer" side through another.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Paths that exist but fail to read (permission errors and the like).
    unreadable: HashSet<PathBuf>,
}

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    inner: Arc<Mutex<Inner>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file with the given content.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let mut inner = self.lock();
        let path = path.as_ref().to_path_buf();
        inner.unreadable.remove(&path);
        inner.files.insert(path, content.into());
    }

    /// Removes a file. Missing files are ignored.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let mut inner = self.lock();
        inner.files.remove(path.as_ref());
        inner.unreadable.remove(path.as_ref());
    }

    /// Marks a path as existing but failing every read with `PermissionDenied`.
    pub fn add_unreadable(&self, path: impl AsRef<Path>) {
        let mut inner = self.lock();
        inner.files.remove(path.as_ref());
        inner.unreadable.insert(path.as_ref().to_path_buf());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned table only happens after a panicking test; keep going.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let inner = self.lock();
        if inner.unreadable.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {:?}", path),
            ));
        }
        inner.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        let inner = self.lock();
        inner.files.contains_key(path) || inner.unreadable.contains(path)
    }
}
