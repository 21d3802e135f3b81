//! Chunking phase.
//!
//! Splits the input into windows of `chunk_size` lines, removes exact
//! duplicates inside each window and writes every window to its own unit.
//!
//! Within-chunk order is **not** preserved: a window is reduced through a hash
//! set and written in set iteration order. Only the merge phase defines a
//! stable order.

use crate::cancel::CancelToken;
use linedup_core::{chunk_key, is_blank, DedupError, FailureSite, Result, Unit, Workspace};
use std::collections::HashSet;
use std::io;
use tracing::{debug, info};

/// Statistics from the chunking phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Lines read from the input (blank lines included).
    pub lines_read: usize,
    /// Lines written across all chunk units.
    pub lines_written: usize,
    /// Blank lines dropped when blank skipping is on.
    pub blank_skipped: usize,
    /// Chunk units produced.
    pub chunks: usize,
}

/// Ordered chunk units plus statistics.
#[derive(Debug)]
pub struct ChunkOutput {
    /// Units in input order.
    pub units: Vec<Unit>,
    /// Chunking statistics.
    pub stats: ChunkStats,
}

/// Splits an input stream into deduplicated chunk units.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    skip_blank: bool,
}

impl Chunker {
    /// Create a chunker. `chunk_size` must be at least 1.
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DedupError::InvalidConfiguration(
                "chunk_size must be >= 1".into(),
            ));
        }
        Ok(Self {
            chunk_size,
            skip_blank: false,
        })
    }

    /// Drop empty and whitespace-only lines.
    #[must_use]
    pub fn skip_blank_lines(mut self, skip: bool) -> Self {
        self.skip_blank = skip;
        self
    }

    /// Lines per chunk.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunk `lines` into units inside `workspace`.
    ///
    /// Empty input yields zero units. On a storage failure the units already
    /// written stay on disk; on cancellation they are deleted.
    pub fn chunk<I>(
        &self,
        lines: I,
        workspace: &Workspace,
        cancel: &CancelToken,
    ) -> Result<ChunkOutput>
    where
        I: IntoIterator<Item = io::Result<Vec<u8>>>,
    {
        let mut units = Vec::new();
        let mut stats = ChunkStats::default();

        match self.fill(lines, workspace, cancel, &mut units, &mut stats) {
            Ok(()) => {
                info!(
                    chunks = stats.chunks,
                    lines_read = stats.lines_read,
                    lines_written = stats.lines_written,
                    "chunking complete"
                );
                Ok(ChunkOutput { units, stats })
            }
            Err(e @ DedupError::StorageFailure { .. }) => {
                for unit in units {
                    unit.keep();
                }
                Err(e)
            }
            // Dropping the armed handles removes every written chunk.
            Err(e) => Err(e),
        }
    }

    fn fill<I>(
        &self,
        lines: I,
        workspace: &Workspace,
        cancel: &CancelToken,
        units: &mut Vec<Unit>,
        stats: &mut ChunkStats,
    ) -> Result<()>
    where
        I: IntoIterator<Item = io::Result<Vec<u8>>>,
    {
        let mut buffer: Vec<Vec<u8>> = Vec::with_capacity(self.chunk_size.min(1 << 16));

        for line in lines {
            let line = line.map_err(|e| DedupError::storage(FailureSite::Input, e))?;
            stats.lines_read += 1;

            if self.skip_blank && is_blank(&line) {
                stats.blank_skipped += 1;
                continue;
            }

            buffer.push(line);
            if buffer.len() >= self.chunk_size {
                let unit = self.write_chunk(&mut buffer, units.len(), workspace, cancel)?;
                stats.lines_written += unit.len();
                units.push(unit);
            }
        }

        if !buffer.is_empty() {
            let unit = self.write_chunk(&mut buffer, units.len(), workspace, cancel)?;
            stats.lines_written += unit.len();
            units.push(unit);
        }

        stats.chunks = units.len();
        Ok(())
    }

    fn write_chunk(
        &self,
        buffer: &mut Vec<Vec<u8>>,
        index: usize,
        workspace: &Workspace,
        cancel: &CancelToken,
    ) -> Result<Unit> {
        if cancel.is_cancelled() {
            return Err(DedupError::Cancelled);
        }

        let buffered = buffer.len();
        let distinct: HashSet<Vec<u8>> = buffer.drain(..).collect();

        let key = chunk_key(index);
        let site = || FailureSite::Chunk {
            index,
            key: key.clone(),
        };

        let mut writer = workspace
            .create_unit(key.clone(), index)
            .map_err(|e| DedupError::storage(site(), e))?;
        for line in &distinct {
            writer
                .write_line(line)
                .map_err(|e| DedupError::storage(site(), e))?;
        }
        let unit = writer.commit().map_err(|e| DedupError::storage(site(), e))?;

        debug!(index, buffered, distinct = unit.len(), key = %unit.key(), "wrote chunk");
        Ok(unit)
    }
}
