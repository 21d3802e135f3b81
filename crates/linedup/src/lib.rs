//! # linedup
//!
//! External exact-duplicate removal for line-oriented record files (JSONL
//! training corpora) that do not fit in memory.
//!
//! ## Algorithm
//!
//! 1. **Chunk**: read the input in windows of `chunk_size` lines, drop exact
//!    duplicates inside each window and persist each window as a unit.
//! 2. **Merge**: combine units pairwise, round after round, with a streaming
//!    merge-dedup until one unit remains. That unit becomes the output.
//!
//! Peak memory is bounded by the chunk window and by the membership set of
//! one merge pair, independent of total input size.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linedup::{deduplicate_file, DedupStats};
//!
//! let stats: DedupStats =
//!     deduplicate_file("corpus.jsonl", "corpus.dedup.jsonl", 500_000, "/tmp/linedup").unwrap();
//! println!("{} -> {} lines", stats.total_lines, stats.unique_lines);
//! ```
//!
//! ## Ordering
//!
//! Within one chunk, order is **not** preserved (set-based reduction). The
//! merge step is stable: a merge of `(A, B)` emits A in order, then the lines
//! of B not present in A, in order.
//!
//! ## Modules
//!
//! - [`chunker`]: the chunking phase
//! - [`reducer`]: the pairwise merge phase
//! - [`pipeline`]: end-to-end driver
//! - [`config`]: configuration
//! - [`cancel`]: cooperative cancellation
//! - [`convert`]: Parquet input

pub mod cancel;
pub mod chunker;
pub mod config;
pub mod convert;
pub mod pipeline;
pub mod reducer;

pub use cancel::CancelToken;
pub use chunker::{ChunkOutput, ChunkStats, Chunker};
pub use config::{ConfigFile, DedupConfig};
pub use convert::{convert_directory, parquet_to_jsonl, ConvertStats, InputFormat, ParquetLines};
pub use pipeline::{deduplicate_file, DedupStats, ExternalDeduplicator};
pub use reducer::{MergeReducer, ReduceStats, Reduction};

pub use linedup_core::{
    chunk_key, merge_key, DedupError, FailureSite, LineReader, LocalStorage, Result, Unit,
    UnitStorage, Workspace,
};
