//! Unit storage abstraction.
//!
//! Every byte an intermediate unit holds goes through a [`UnitStorage`].
//! Units are addressed by keys relative to the storage root:
//! - Local filesystem ([`LocalStorage`], always available)
//! - Test doubles that inject faults

mod local;

pub use local::LocalStorage;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Trait for unit storage backends.
///
/// Implementations must be shareable across the merge worker pool.
pub trait UnitStorage: Send + Sync {
    /// Create (or truncate) the object at key for writing.
    fn create(&self, key: &str) -> io::Result<Box<dyn Write + Send>>;

    /// Open the object at key for buffered reading.
    fn open(&self, key: &str) -> io::Result<Box<dyn BufRead + Send>>;

    /// Atomically rename an object inside the storage.
    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Delete the object at key.
    fn remove(&self, key: &str) -> io::Result<()>;

    /// Check if key exists.
    fn exists(&self, key: &str) -> bool;

    /// List keys with given prefix.
    fn list(&self, prefix: &str) -> io::Result<Vec<String>>;

    /// Move the object at key to a path outside the storage.
    fn export(&self, key: &str, dest: &Path) -> io::Result<()>;

    /// Filesystem location of key, for diagnostics.
    fn location(&self, key: &str) -> PathBuf;
}
