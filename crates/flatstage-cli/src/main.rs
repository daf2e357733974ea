//! Flatstage - staging engine command line tools

use anyhow::{Context, Result};
use clap::Parser;
use flatstage_common::logging::{init_logging, LogConfig, LogLevel};
use flatstage_core::checksum::Checksum;
use flatstage_core::cleaner;
use flatstage_core::config::StageConfig;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "flatstage")]
#[command(author, version, about = "Flat-file staging engine tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Repair a raw bulk-copy stream into one line per logical record
    ///
    /// Reads the producer's output, deletes disallowed characters, escapes
    /// embedded tabs and newlines, and reassembles records split across
    /// physical lines. Intended to sit in the pipe between the bulk-copy
    /// producer and the bulk-load consumer.
    Clean {
        /// Input file (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the persisted checksum for a job prefix
    Checksum {
        /// Checksum prefix (names <prefix>.checksum in the data directory)
        prefix: String,

        /// Data directory (defaults to the configured STAGE_DATA_DIR)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().unwrap_or_default();
    log_config.log_file_prefix = "flatstage".to_string();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    match cli.command {
        Command::Clean { input, output } => clean(input, output),
        Command::Checksum { prefix, data_dir } => show_checksum(&prefix, data_dir),
    }
}

fn clean(input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let reader: Box<dyn BufRead> = match &input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("cannot open input {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("cannot create output {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let stats = cleaner::clean_stream(reader, &mut writer)?;
    info!(
        lines_in = stats.lines_in,
        records_out = stats.records_out,
        chars_dropped = stats.chars_dropped,
        "stream cleaned"
    );
    Ok(())
}

fn show_checksum(prefix: &str, data_dir: Option<PathBuf>) -> Result<()> {
    let data_dir = match data_dir {
        Some(dir) => dir,
        None => StageConfig::load()?.staging.data_dir,
    };

    // The computed value is irrelevant for inspection; only the persisted
    // side is read.
    let checksum = Checksum::new(prefix, &data_dir, 0);
    match checksum.stored()? {
        Some(value) => println!("{}: {}", prefix, value),
        None => println!("{}: no checksum recorded", prefix),
    }
    Ok(())
}
