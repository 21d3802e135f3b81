//! linedup CLI - exact deduplication for line-oriented datasets larger than memory.

use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use linedup::{
    convert_directory, parquet_to_jsonl, ConfigFile, DedupConfig, DedupError, DedupStats,
    ExternalDeduplicator, FailureSite, InputFormat, ParquetLines,
};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// JSON output for dedup results.
#[derive(Serialize)]
struct JsonOutput {
    input: String,
    output: String,
    workspace: String,
    chunk_size: usize,
    #[serde(flatten)]
    stats: DedupStats,
    throughput_lines_s: f64,
}

/// File format for input.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum Format {
    /// Auto-detect from file extension
    Auto,
    /// One record per line
    Jsonl,
    /// Apache Parquet format (rows become JSON object lines)
    Parquet,
}

/// Exact deduplication for line-oriented datasets larger than memory.
///
/// Splits the input into chunks, removes duplicates within each chunk, then
/// merges chunk files pairwise until one duplicate-free file remains.
#[derive(Parser, Debug)]
#[command(name = "linedup")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input file path (JSONL or Parquet), or "-" for stdin.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Output file path.
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Lines per chunk. Larger chunks use more memory but need fewer merge rounds.
    #[arg(short = 'c', long)]
    chunk_size: Option<usize>,

    /// Directory for intermediate chunk files (default: next to the output).
    #[arg(short = 'w', long, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// JSON configuration file. Command line flags take precedence.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Merge independent pairs of a round in parallel.
    #[arg(long)]
    parallel: bool,

    /// Worker threads for parallel merging (implies --parallel).
    #[arg(long)]
    threads: Option<usize>,

    /// Drop empty and whitespace-only lines.
    #[arg(long)]
    skip_blank_lines: bool,

    /// Input format (auto-detect from file extension by default).
    #[arg(long, value_enum, default_value = "auto")]
    format: Format,

    /// Output results as JSON.
    #[arg(long)]
    json: bool,

    /// Show progress spinner.
    #[arg(long)]
    progress: bool,

    /// Verbose logging (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a Parquet file, or every Parquet file in a directory, to JSONL
    Convert {
        /// Parquet file or directory of Parquet files
        path: PathBuf,

        /// Output JSONL file (single-file mode only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Create a spinner for indeterminate progress.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Default workspace: a hidden directory next to the output file.
fn default_workspace(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!(".{name}.linedup-work"))
}

/// Build the effective configuration: config file, then command line flags.
fn build_config(args: &Cli, output: &Path) -> Result<DedupConfig, DedupError> {
    let mut config = DedupConfig::default().with_workspace(default_workspace(output));
    if let Some(path) = &args.config {
        config = ConfigFile::from_json_file(path)?.apply(config);
    }

    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(workspace) = &args.workspace {
        config.workspace = workspace.clone();
    }
    if args.skip_blank_lines {
        config.skip_blank_lines = true;
    }
    if args.parallel || args.threads.is_some() {
        let threads = args.threads.or(config.merge_threads);
        config = config.with_parallel_merge(threads);
    }

    Ok(config)
}

fn run_convert(
    path: &Path,
    output: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let results = if path.is_dir() {
        if output.is_some() {
            return Err("--output is not supported when converting a directory".into());
        }
        convert_directory(path)?
    } else {
        let target = output.map_or_else(|| path.with_extension("jsonl"), Path::to_path_buf);
        vec![parquet_to_jsonl(path, &target)?]
    };

    if json {
        let summary: Vec<_> = results
            .iter()
            .map(|s| {
                serde_json::json!({
                    "input": s.input.display().to_string(),
                    "output": s.output.display().to_string(),
                    "rows": s.rows,
                    "elapsed_secs": s.elapsed_secs,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if results.is_empty() {
        eprintln!("No Parquet files found in {}", path.display());
    } else {
        for s in &results {
            eprintln!(
                "Converted {} -> {} ({} rows, {:.3}s)",
                s.input.display(),
                s.output.display(),
                s.rows,
                s.elapsed_secs
            );
        }
    }

    Ok(())
}

fn run(args: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &args.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "linedup", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::Convert { path, output }) => {
            return run_convert(path, output.as_deref(), args.json);
        }
        None => {}
    }

    // Require input file for dedup operations
    let input = args.input.clone().ok_or("Input file is required")?;
    let output = args
        .output
        .clone()
        .ok_or("output file required (use -o/--output)")?;

    let config = build_config(&args, &output)?;
    let dedup = ExternalDeduplicator::new(config)?;

    let from_stdin = input.as_os_str() == "-";
    let input_format = match args.format {
        Format::Jsonl => InputFormat::Jsonl,
        Format::Parquet => InputFormat::Parquet,
        Format::Auto if from_stdin => InputFormat::Jsonl,
        Format::Auto => InputFormat::from_path(&input).unwrap_or(InputFormat::Jsonl),
    };
    if from_stdin && input_format == InputFormat::Parquet {
        return Err("Parquet input cannot be read from stdin".into());
    }

    if args.verbose > 0 && !args.json {
        let config = dedup.config();
        eprintln!("Configuration:");
        eprintln!("  Input: {}", input.display());
        eprintln!("  Output: {}", output.display());
        eprintln!("  Format: {:?}", input_format);
        eprintln!("  Chunk size: {}", config.chunk_size);
        eprintln!("  Workspace: {}", config.workspace.display());
        eprintln!("  Parallel merge: {}", config.parallel_merge);
        eprintln!();
    }

    let start = Instant::now();
    let pb = if args.progress && !args.json {
        Some(create_spinner("Running external deduplication..."))
    } else {
        None
    };

    let result = if from_stdin {
        dedup.run_reader(io::stdin().lock(), &output)
    } else {
        match input_format {
            InputFormat::Parquet => {
                ParquetLines::open(&input).and_then(|lines| dedup.run(lines, &output))
            }
            InputFormat::Jsonl => File::open(&input)
                .map_err(|e| DedupError::storage(FailureSite::Input, e))
                .and_then(|file| dedup.run_reader(BufReader::new(file), &output)),
        }
    };

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let stats = result?;

    if args.json {
        let report = JsonOutput {
            input: input.display().to_string(),
            output: output.display().to_string(),
            workspace: dedup.config().workspace.display().to_string(),
            chunk_size: dedup.config().chunk_size,
            throughput_lines_s: stats.throughput(),
            stats,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!();
        eprintln!("Deduplication Results:");
        eprintln!("  Total lines:       {}", stats.total_lines);
        eprintln!("  Unique lines:      {}", stats.unique_lines);
        eprintln!("  Duplicates found:  {}", stats.duplicates);
        eprintln!("  Duplicate ratio:   {:.2}%", stats.duplicate_ratio * 100.0);
        if stats.blank_skipped > 0 {
            eprintln!("  Blank lines:       {} skipped", stats.blank_skipped);
        }
        eprintln!();
        eprintln!("Performance:");
        eprintln!("  Chunks:            {}", stats.chunks);
        eprintln!("  Merge rounds:      {}", stats.rounds);
        eprintln!("  Processing time:   {:.3}s", stats.elapsed_secs);
        eprintln!("  Throughput:        {:.0} lines/sec", stats.throughput());
        eprintln!();
        eprintln!(
            "Wrote {} ({:.3}s total)",
            output.display(),
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}

fn main() {
    let args = Cli::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
