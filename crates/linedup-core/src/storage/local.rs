//! Local filesystem storage backend.

use super::UnitStorage;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend, creating `root` if absent.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of this storage.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl UnitStorage for LocalStorage {
    fn create(&self, key: &str) -> io::Result<Box<dyn Write + Send>> {
        let file = File::create(self.key_to_path(key))?;
        Ok(Box::new(file))
    }

    fn open(&self, key: &str) -> io::Result<Box<dyn BufRead + Send>> {
        let file = File::open(self.key_to_path(key))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.key_to_path(from), self.key_to_path(to))
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        fs::remove_file(self.key_to_path(key))
    }

    fn exists(&self, key: &str) -> bool {
        self.key_to_path(key).exists()
    }

    fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let key = entry.file_name().to_string_lossy().to_string();
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn export(&self, key: &str, dest: &Path) -> io::Result<()> {
        let src = self.key_to_path(key);
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        match fs::rename(&src, dest) {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device(&e) => {
                copy_into_place(&src, dest)?;
                fs::remove_file(&src)
            }
            Err(e) => Err(e),
        }
    }

    fn location(&self, key: &str) -> PathBuf {
        self.key_to_path(key)
    }
}

#[cfg(unix)]
const EXDEV: i32 = 18;
// ERROR_NOT_SAME_DEVICE
#[cfg(not(unix))]
const EXDEV: i32 = 17;

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(EXDEV)
}

/// Copy `src` to a hidden sibling of `dest`, then rename it over `dest`.
///
/// `dest` is either untouched or complete; a failed copy removes the sibling.
fn copy_into_place(src: &Path, dest: &Path) -> io::Result<()> {
    let name = dest.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name")
    })?;
    let staged = dest.with_file_name(format!(".{}.partial", name.to_string_lossy()));

    let result = fs::copy(src, &staged).and_then(|_| fs::rename(&staged, dest));
    if result.is_err() && staged.exists() {
        let _ = fs::remove_file(&staged);
    }
    result
}
