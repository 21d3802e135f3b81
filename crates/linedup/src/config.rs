//! Engine configuration.

use linedup_core::{DedupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for external deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupConfig {
    /// Lines per chunk. Larger chunks mean fewer merge rounds but a larger
    /// in-memory set during chunking.
    pub chunk_size: usize,
    /// Directory for intermediate units. Created if absent.
    pub workspace: PathBuf,
    /// Drop empty and whitespace-only lines before chunking.
    pub skip_blank_lines: bool,
    /// Merge the pairs of one round concurrently.
    pub parallel_merge: bool,
    /// Worker threads for parallel merging (rayon default when unset).
    pub merge_threads: Option<usize>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            workspace: PathBuf::from("linedup-work"),
            skip_blank_lines: false,
            parallel_merge: false,
            merge_threads: None,
        }
    }
}

impl DedupConfig {
    /// Create config with the given chunk size and workspace.
    #[must_use]
    pub fn new(chunk_size: usize, workspace: impl Into<PathBuf>) -> Self {
        Self {
            chunk_size,
            workspace: workspace.into(),
            ..Default::default()
        }
    }

    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the workspace directory.
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Enable or disable blank line skipping.
    #[must_use]
    pub fn with_skip_blank_lines(mut self, skip: bool) -> Self {
        self.skip_blank_lines = skip;
        self
    }

    /// Enable parallel merging, optionally with a fixed thread count.
    #[must_use]
    pub fn with_parallel_merge(mut self, threads: Option<usize>) -> Self {
        self.parallel_merge = true;
        self.merge_threads = threads;
        self
    }

    /// Check the configuration without touching the filesystem beyond a stat.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DedupError::InvalidConfiguration(
                "chunk_size must be >= 1".into(),
            ));
        }
        if self.workspace.as_os_str().is_empty() {
            return Err(DedupError::InvalidConfiguration(
                "workspace path must not be empty".into(),
            ));
        }
        if self.workspace.exists() && !self.workspace.is_dir() {
            return Err(DedupError::InvalidConfiguration(format!(
                "workspace {} exists and is not a directory",
                self.workspace.display()
            )));
        }
        if self.merge_threads == Some(0) {
            return Err(DedupError::InvalidConfiguration(
                "merge_threads must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Parse a JSON configuration document. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(ConfigFile::from_json_str(json)?.apply(Self::default()))
    }

    /// Load a JSON configuration file. Missing keys take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(ConfigFile::from_json_file(path)?.apply(Self::default()))
    }
}

/// Contents of a JSON configuration file.
///
/// Only the keys present in the file are set, so a file can be layered over
/// any base configuration with [`ConfigFile::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub chunk_size: Option<usize>,
    pub workspace: Option<PathBuf>,
    pub skip_blank_lines: Option<bool>,
    pub parallel_merge: Option<bool>,
    pub merge_threads: Option<usize>,
}

impl ConfigFile {
    /// Parse a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| DedupError::InvalidConfiguration(format!("config: {e}")))
    }

    /// Load a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DedupError::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Override the fields of `base` that this file sets.
    #[must_use]
    pub fn apply(self, mut base: DedupConfig) -> DedupConfig {
        if let Some(chunk_size) = self.chunk_size {
            base.chunk_size = chunk_size;
        }
        if let Some(workspace) = self.workspace {
            base.workspace = workspace;
        }
        if let Some(skip) = self.skip_blank_lines {
            base.skip_blank_lines = skip;
        }
        if let Some(parallel) = self.parallel_merge {
            base.parallel_merge = parallel;
        }
        if self.merge_threads.is_some() {
            base.merge_threads = self.merge_threads;
        }
        base
    }
}
