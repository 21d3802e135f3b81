//! # linedup-core
//!
//! Shared infrastructure for the linedup external deduplication engine:
//! - Error taxonomy ([`DedupError`], [`FailureSite`])
//! - Line framing ([`LineReader`])
//! - Unit storage backends ([`UnitStorage`], [`LocalStorage`])
//! - The workspace and owned intermediate units ([`Workspace`], [`Unit`])

pub mod error;
pub mod lines;
pub mod storage;
pub mod workspace;

pub use error::{DedupError, FailureSite, Result};
pub use lines::{is_blank, write_line, LineReader};
pub use storage::{LocalStorage, UnitStorage};
pub use workspace::{chunk_key, merge_key, Unit, UnitWriter, Workspace};
