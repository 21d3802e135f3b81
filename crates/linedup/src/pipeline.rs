//! End-to-end external deduplication.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use linedup::{DedupConfig, ExternalDeduplicator};
//!
//! let config = DedupConfig::new(1_000_000, "/tmp/linedup-work");
//! let dedup = ExternalDeduplicator::new(config).unwrap();
//!
//! let stats = dedup.run_file("input.jsonl", "output.jsonl").unwrap();
//! println!("Processed {} lines, kept {} unique", stats.total_lines, stats.unique_lines);
//! ```

use crate::cancel::CancelToken;
use crate::chunker::{ChunkOutput, Chunker};
use crate::config::DedupConfig;
use crate::convert::{InputFormat, ParquetLines};
use crate::reducer::MergeReducer;
use linedup_core::{DedupError, FailureSite, LineReader, Result, Workspace};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Statistics from one deduplication run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupStats {
    /// Lines read from the input.
    pub total_lines: usize,
    /// Distinct lines written to the output.
    pub unique_lines: usize,
    /// Lines removed as duplicates.
    pub duplicates: usize,
    /// Duplicates over deduplicated lines.
    pub duplicate_ratio: f64,
    /// Blank lines dropped before chunking.
    pub blank_skipped: usize,
    /// Chunk units produced.
    pub chunks: usize,
    /// Merge rounds executed.
    pub rounds: usize,
    /// Pair merges performed.
    pub merges: usize,
    /// Processing time in seconds.
    pub elapsed_secs: f64,
}

impl DedupStats {
    /// Throughput in input lines per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.total_lines as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// Chunk-then-merge deduplicator with bounded memory.
#[derive(Debug, Clone)]
pub struct ExternalDeduplicator {
    config: DedupConfig,
    cancel: CancelToken,
}

impl ExternalDeduplicator {
    /// Create a deduplicator. The configuration is validated up front and
    /// nothing is created on disk when it is rejected.
    pub fn new(config: DedupConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Use an externally owned cancel token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels runs of this deduplicator.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Deduplicate `lines` into `output` using the configured workspace.
    pub fn run<I, P>(&self, lines: I, output: P) -> Result<DedupStats>
    where
        I: IntoIterator<Item = io::Result<Vec<u8>>>,
        P: AsRef<Path>,
    {
        let workspace = Workspace::open(&self.config.workspace)?;
        let result = self.run_in_workspace(lines, output, &workspace);
        workspace.remove_if_empty();
        result
    }

    /// Deduplicate the lines of a buffered reader.
    pub fn run_reader<R: BufRead, P: AsRef<Path>>(
        &self,
        reader: R,
        output: P,
    ) -> Result<DedupStats> {
        self.run(LineReader::new(reader), output)
    }

    /// Deduplicate a file. Parquet input is detected by extension and its
    /// rows are deduplicated as JSON object lines.
    pub fn run_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<DedupStats> {
        let input = input.as_ref();
        match InputFormat::from_path(input) {
            Some(InputFormat::Parquet) => self.run(ParquetLines::open(input)?, output),
            _ => {
                let file = File::open(input)
                    .map_err(|e| DedupError::storage(FailureSite::Input, e))?;
                self.run_reader(BufReader::new(file), output)
            }
        }
    }

    /// Deduplicate `lines` into `output` inside an already opened workspace.
    ///
    /// The output file appears only once the final merge round succeeded.
    pub fn run_in_workspace<I, P>(
        &self,
        lines: I,
        output: P,
        workspace: &Workspace,
    ) -> Result<DedupStats>
    where
        I: IntoIterator<Item = io::Result<Vec<u8>>>,
        P: AsRef<Path>,
    {
        let start = Instant::now();
        let output = output.as_ref();

        info!(
            workspace = %workspace.root().display(),
            chunk_size = self.config.chunk_size,
            "chunking input"
        );
        let chunker =
            Chunker::new(self.config.chunk_size)?.skip_blank_lines(self.config.skip_blank_lines);
        let ChunkOutput {
            units,
            stats: chunk_stats,
        } = chunker.chunk(lines, workspace, &self.cancel)?;

        let mut stats = DedupStats {
            total_lines: chunk_stats.lines_read,
            blank_skipped: chunk_stats.blank_skipped,
            chunks: chunk_stats.chunks,
            ..Default::default()
        };

        if units.is_empty() {
            info!(output = %output.display(), "input is empty, writing empty output");
            create_parent(output)?;
            File::create(output)
                .map_err(|e| DedupError::storage(FailureSite::Output(output.to_path_buf()), e))?;
            stats.elapsed_secs = start.elapsed().as_secs_f64();
            return Ok(stats);
        }

        info!(units = units.len(), "merging chunks");
        let reduction = MergeReducer::new()
            .parallel(self.config.parallel_merge)
            .threads(self.config.merge_threads)
            .reduce(units, workspace, &self.cancel)?;

        stats.unique_lines = reduction.unit.len();
        stats.rounds = reduction.stats.rounds;
        stats.merges = reduction.stats.merges;

        create_parent(output)?;
        reduction
            .unit
            .persist(output)
            .map_err(|e| DedupError::storage(FailureSite::Output(output.to_path_buf()), e))?;

        let considered = stats.total_lines - stats.blank_skipped;
        stats.duplicates = considered - stats.unique_lines;
        stats.duplicate_ratio = if considered > 0 {
            stats.duplicates as f64 / considered as f64
        } else {
            0.0
        };
        stats.elapsed_secs = start.elapsed().as_secs_f64();

        info!(
            output = %output.display(),
            total = stats.total_lines,
            unique = stats.unique_lines,
            rounds = stats.rounds,
            "deduplication complete"
        );
        Ok(stats)
    }
}

fn create_parent(output: &Path) -> Result<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| DedupError::storage(FailureSite::Output(PathBuf::from(parent)), e)),
        _ => Ok(()),
    }
}

/// Deduplicate a file with default settings.
///
/// Convenience function for simple use cases.
pub fn deduplicate_file<P, Q, W>(
    input: P,
    output: Q,
    chunk_size: usize,
    workspace: W,
) -> Result<DedupStats>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    W: Into<PathBuf>,
{
    ExternalDeduplicator::new(DedupConfig::new(chunk_size, workspace))?.run_file(input, output)
}
