//! Workspace and owned intermediate units.
//!
//! A [`Unit`] owns its backing object: dropping an armed handle deletes it.
//! Consuming a unit is either [`Unit::delete`] (normal path, errors
//! reported), [`Unit::keep`] (leave on disk for diagnosis or resumption) or
//! [`Unit::persist`] (move out of the workspace as a final result).

use crate::error::{DedupError, FailureSite, Result};
use crate::lines::{write_line, LineReader};
use crate::storage::{LocalStorage, UnitStorage};
use std::fmt;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const PARTIAL_SUFFIX: &str = ".partial";

/// Key of the chunk unit with the given sequence index.
#[must_use]
pub fn chunk_key(index: usize) -> String {
    format!("chunk_{index:06}.jsonl")
}

/// Key of the unit produced by merging pair `pair` in round `round`.
#[must_use]
pub fn merge_key(round: usize, pair: usize) -> String {
    format!("merge_r{round:03}_{pair:06}.jsonl")
}

/// Directory holding intermediate units for one pipeline run.
///
/// Exclusively owned by one running engine instance.
#[derive(Clone)]
pub struct Workspace {
    root: PathBuf,
    storage: Arc<dyn UnitStorage>,
    /// Topmost directory this workspace had to create, if any.
    created: Option<PathBuf>,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("created", &self.created)
            .finish()
    }
}

impl Workspace {
    /// Open a filesystem workspace, creating the directory if absent.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let created = root
            .ancestors()
            .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
            .last()
            .map(Path::to_path_buf);
        let storage = LocalStorage::new(&root)
            .map_err(|e| DedupError::storage(FailureSite::Workspace(root.clone()), e))?;
        debug!(root = %root.display(), created = ?created, "opened workspace");
        Ok(Self {
            root,
            storage: Arc::new(storage),
            created,
        })
    }

    /// Build a workspace over a custom storage backend.
    pub fn with_storage(root: impl Into<PathBuf>, storage: Arc<dyn UnitStorage>) -> Self {
        Self {
            root: root.into(),
            storage,
            created: None,
        }
    }

    /// Workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether this workspace created its root directory.
    #[must_use]
    pub fn created_root(&self) -> bool {
        self.created.is_some()
    }

    /// Storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn UnitStorage> {
        &self.storage
    }

    /// Start writing a new unit under `key`.
    pub fn create_unit(&self, key: impl Into<String>, index: usize) -> io::Result<UnitWriter> {
        let key = key.into();
        let partial = format!("{key}{PARTIAL_SUFFIX}");
        let inner = self.storage.create(&partial)?;
        Ok(UnitWriter {
            storage: Arc::clone(&self.storage),
            key,
            partial,
            index,
            lines: 0,
            writer: Some(BufWriter::new(inner)),
        })
    }

    /// Take ownership of a unit left in the workspace by an earlier run.
    ///
    /// The unit's records are counted by streaming it once.
    pub fn adopt_unit(&self, key: impl Into<String>, index: usize) -> io::Result<Unit> {
        let key = key.into();
        let mut lines = 0;
        for line in LineReader::new(self.storage.open(&key)?) {
            line?;
            lines += 1;
        }
        Ok(Unit {
            storage: Arc::clone(&self.storage),
            key,
            index,
            lines,
            armed: true,
        })
    }

    /// Keys of all committed units currently in the workspace.
    pub fn unit_keys(&self) -> io::Result<Vec<String>> {
        Ok(self
            .storage
            .list("")?
            .into_iter()
            .filter(|k| !k.ends_with(PARTIAL_SUFFIX))
            .collect())
    }

    /// Remove the root directory if this workspace created it and it is empty.
    ///
    /// Parent directories created by [`Workspace::open`] are removed too,
    /// as long as they are empty.
    pub fn remove_if_empty(&self) {
        let Some(top) = &self.created else {
            return;
        };
        for dir in self.root.ancestors() {
            if let Err(e) = std::fs::remove_dir(dir) {
                debug!(dir = %dir.display(), error = %e, "workspace left in place");
                return;
            }
            debug!(dir = %dir.display(), "removed workspace directory");
            if dir == top.as_path() {
                return;
            }
        }
    }
}

/// Writer for a unit that is not yet visible under its final key.
///
/// Dropping the writer without [`commit`](UnitWriter::commit) discards the
/// partial output.
pub struct UnitWriter {
    storage: Arc<dyn UnitStorage>,
    key: String,
    partial: String,
    index: usize,
    lines: usize,
    writer: Option<BufWriter<Box<dyn Write + Send>>>,
}

impl UnitWriter {
    /// Append one record.
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "unit writer already closed"))?;
        write_line(writer, line)?;
        self.lines += 1;
        Ok(())
    }

    /// Records written so far.
    #[must_use]
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Flush, then publish the unit under its final key.
    pub fn commit(mut self) -> io::Result<Unit> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        self.storage.rename(&self.partial, &self.key)?;
        let unit = Unit {
            storage: Arc::clone(&self.storage),
            key: std::mem::take(&mut self.key),
            index: self.index,
            lines: self.lines,
            armed: true,
        };
        self.partial.clear();
        Ok(unit)
    }
}

impl Drop for UnitWriter {
    fn drop(&mut self) {
        if self.partial.is_empty() {
            return;
        }
        drop(self.writer.take());
        if self.storage.exists(&self.partial) {
            if let Err(e) = self.storage.remove(&self.partial) {
                warn!(key = %self.partial, error = %e, "failed to discard partial unit");
            }
        }
    }
}

/// Owned handle to a committed intermediate unit.
pub struct Unit {
    storage: Arc<dyn UnitStorage>,
    key: String,
    index: usize,
    lines: usize,
    armed: bool,
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("key", &self.key)
            .field("index", &self.index)
            .field("lines", &self.lines)
            .finish()
    }
}

impl Unit {
    /// Storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Sequence index assigned by the stage that created the unit.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of records in the unit.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines
    }

    /// True if the unit holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    /// Filesystem location of the unit.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.storage.location(&self.key)
    }

    /// Stream the unit's records in stored order.
    pub fn lines(&self) -> io::Result<LineReader<Box<dyn BufRead + Send>>> {
        Ok(LineReader::new(self.storage.open(&self.key)?))
    }

    /// Delete the unit, reporting failure.
    pub fn delete(mut self) -> io::Result<()> {
        self.armed = false;
        self.storage.remove(&self.key)
    }

    /// Leave the unit on disk and return its location.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        self.path()
    }

    /// Move the unit to `dest` outside the workspace.
    ///
    /// On failure the unit is left in the workspace so the result is not lost.
    pub fn persist(mut self, dest: &Path) -> io::Result<PathBuf> {
        self.armed = false;
        self.storage.export(&self.key, dest)?;
        Ok(dest.to_path_buf())
    }
}

impl Drop for Unit {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.storage.remove(&self.key) {
            warn!(key = %self.key, error = %e, "failed to clean up unit");
        }
    }
}
