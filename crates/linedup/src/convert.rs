//! Parquet input.
//!
//! Datasets often arrive as Parquet shards. Each row is rendered as a single
//! JSON object line so it can flow straight into the chunker, or be written
//! out as a JSONL file.

use linedup_core::{write_line, DedupError, FailureSite, Result};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::reader::RowIter;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Line-oriented records (JSON Lines or plain text).
    Jsonl,
    /// Apache Parquet.
    Parquet,
}

impl InputFormat {
    /// Detect format from file extension.
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jsonl" | "ndjson" | "json" | "txt" => Some(Self::Jsonl),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// Rows of a Parquet file as JSON object lines.
pub struct ParquetLines {
    rows: RowIter<'static>,
    path: PathBuf,
    row_num: usize,
}

impl ParquetLines {
    /// Open a Parquet file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| DedupError::storage(FailureSite::Input, e))?;
        let reader = SerializedFileReader::new(file)
            .map_err(|e| DedupError::InvalidFormat(format!("{}: {e}", path.display())))?;
        debug!(
            path = %path.display(),
            row_groups = reader.metadata().num_row_groups(),
            rows = reader.metadata().file_metadata().num_rows(),
            "opened parquet input"
        );
        let rows = RowIter::from_file_into(Box::new(reader));
        Ok(Self {
            rows,
            path,
            row_num: 0,
        })
    }

    /// Rows yielded so far.
    #[must_use]
    pub fn row_num(&self) -> usize {
        self.row_num
    }
}

impl Iterator for ParquetLines {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.rows.next()? {
            Ok(row) => row,
            Err(e) => {
                return Some(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} row {}: {e}", self.path.display(), self.row_num),
                )))
            }
        };
        self.row_num += 1;
        Some(serde_json::to_vec(&row.to_json_value()).map_err(io::Error::from))
    }
}

/// Statistics from a Parquet to JSONL conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertStats {
    /// Source Parquet file.
    pub input: PathBuf,
    /// Written JSONL file.
    pub output: PathBuf,
    /// Rows written.
    pub rows: usize,
    /// Processing time in seconds.
    pub elapsed_secs: f64,
}

/// Convert a Parquet file to JSON Lines, one object per row.
pub fn parquet_to_jsonl<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
) -> Result<ConvertStats> {
    let start = Instant::now();
    let input = input.as_ref();
    let output = output.as_ref();
    let output_err =
        |e: io::Error| DedupError::storage(FailureSite::Output(output.to_path_buf()), e);

    let lines = ParquetLines::open(input)?;
    let mut writer = BufWriter::new(File::create(output).map_err(output_err)?);
    let mut rows = 0;

    for line in lines {
        let line = line.map_err(|e| DedupError::storage(FailureSite::Input, e))?;
        write_line(&mut writer, &line).map_err(output_err)?;
        rows += 1;
    }
    writer.flush().map_err(output_err)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        rows,
        "converted parquet to jsonl"
    );
    Ok(ConvertStats {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        rows,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// Convert every `*.parquet` file in `dir` to a sibling `.jsonl` file.
///
/// Converted sources are moved into `dir/processed/` so a rerun skips them.
pub fn convert_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<ConvertStats>> {
    let dir = dir.as_ref();
    let dir_err = |e: io::Error| DedupError::storage(FailureSite::Input, e);
    let processed = dir.join("processed");

    let mut sources: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(dir_err)?
        .collect::<io::Result<Vec<_>>>()
        .map_err(dir_err)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && InputFormat::from_path(path) == Some(InputFormat::Parquet)
        })
        .collect();
    sources.sort();

    if sources.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(&processed)
        .map_err(|e| DedupError::storage(FailureSite::Output(processed.clone()), e))?;

    let total = sources.len();
    let mut results = Vec::with_capacity(total);
    for (idx, source) in sources.into_iter().enumerate() {
        info!("Processing file {}/{}: {}", idx + 1, total, source.display());
        let target = source.with_extension("jsonl");
        let stats = parquet_to_jsonl(&source, &target)?;

        let Some(name) = source.file_name() else {
            continue;
        };
        let moved = processed.join(name);
        fs::rename(&source, &moved)
            .map_err(|e| DedupError::storage(FailureSite::Output(moved.clone()), e))?;
        results.push(stats);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_parquet(path: &Path, ids: &[i64], texts: &[&str]) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(ids.to_vec())) as ArrayRef,
                Arc::new(StringArray::from(texts.to_vec())) as ArrayRef,
            ],
        )
        .unwrap();

        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(InputFormat::from_path("a.jsonl"), Some(InputFormat::Jsonl));
        assert_eq!(InputFormat::from_path("a.PARQUET"), Some(InputFormat::Parquet));
        assert_eq!(InputFormat::from_path("a.csv"), None);
        assert_eq!(InputFormat::from_path("noext"), None);
    }

    #[test]
    fn test_parquet_lines_are_json_objects() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.parquet");
        write_parquet(&path, &[1, 2], &["hello", "world"]);

        let lines: Vec<serde_json::Value> = ParquetLines::open(&path)
            .unwrap()
            .map(|l| serde_json::from_slice(&l.unwrap()).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["text"], "world");
    }

    #[test]
    fn test_parquet_to_jsonl() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("data.parquet");
        let output = tmp.path().join("data.jsonl");
        write_parquet(&input, &[1, 2, 3], &["a", "b", "a"]);

        let stats = parquet_to_jsonl(&input, &output).unwrap();

        assert_eq!(stats.rows, 3);
        let content = fs::read_to_string(&output).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_invalid_parquet() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.parquet");
        fs::write(&path, "definitely not parquet").unwrap();

        assert!(matches!(
            ParquetLines::open(&path),
            Err(DedupError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_convert_directory_moves_sources() {
        let tmp = TempDir::new().unwrap();
        write_parquet(&tmp.path().join("b.parquet"), &[1], &["x"]);
        write_parquet(&tmp.path().join("a.parquet"), &[2, 3], &["y", "z"]);
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let results = convert_directory(tmp.path()).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rows, 2);
        assert!(tmp.path().join("a.jsonl").exists());
        assert!(tmp.path().join("b.jsonl").exists());
        assert!(tmp.path().join("processed").join("a.parquet").exists());
        assert!(!tmp.path().join("a.parquet").exists());

        // Second run finds nothing left to convert.
        assert!(convert_directory(tmp.path()).unwrap().is_empty());
    }
}
