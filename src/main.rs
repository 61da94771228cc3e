use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use pdl::cli::TransferMode;
use pdl::commands;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Single URL to download (if provided, the tasks file is ignored)
    #[arg(index = 1)]
    url: Option<String>,

    /// Path to the file containing URLs (one per line)
    #[arg(short = 't', long = "tasks-file", default_value = "download.txt")]
    tasks_file: PathBuf,

    /// Directory to save downloaded files
    #[arg(short = 'd', long = "download-dir", default_value = "downloads")]
    download_dir: PathBuf,

    /// Explicit destination path (single-URL mode; a directory gets the
    /// inferred filename appended)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Maximum number of files downloaded at once (defaults to logical CPUs)
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// Global rate limit in bytes per second (e.g., 1048576 for 1MB/s)
    #[arg(short = 'r', long)]
    rate_limit: Option<u32>,

    /// Number of connections per file (parallel mode)
    #[arg(short = 's', long, default_value_t = 8)]
    split: usize,

    /// Transfer strategy per file
    #[arg(short = 'm', long, value_enum, default_value = "parallel")]
    mode: TransferMode,

    /// Comma-separated list of allowed file extensions (e.g., "zip,tar.gz");
    /// other URLs are refused before any request is made
    #[arg(long = "allowed-types")]
    allowed_types: Option<String>,

    /// Print the final report of each download as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let mut args = Args::parse();

    // Resolve paths to absolute up front so every worker agrees on where
    // files land regardless of later directory changes.
    if args.download_dir.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            args.download_dir = cwd.join(&args.download_dir);
        }
    }
    if args.url.is_none() {
        if let Ok(abs_input) = std::fs::canonicalize(&args.tasks_file) {
            args.tasks_file = abs_input;
        }
    }

    let allowed_types = args.allowed_types.as_deref().map(parse_allow_list);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if let Some(url) = args.url {
            commands::run_single_download(
                url,
                args.download_dir,
                args.output,
                args.rate_limit,
                args.split,
                args.mode,
                allowed_types,
                args.json,
            )
            .await
        } else {
            commands::run_downloads(
                args.tasks_file,
                args.download_dir,
                args.concurrency,
                args.rate_limit,
                args.split,
                args.mode,
                allowed_types,
                args.json,
            )
            .await
        }
    })
}

fn parse_allow_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().to_string())
        .filter(|ext| !ext.is_empty())
        .collect()
}
