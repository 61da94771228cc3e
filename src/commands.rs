use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;

use crate::cli::TransferMode;
use crate::downloader::Downloader;
use crate::report::{DownloadReport, SegmentOutcome};
use crate::utils::{
    get_filename_from_url, is_allowed_file_type, resolve_destination_path, sanitize_filename,
};

/// HEAD precheck across all URLs, for the batch summary header. URLs whose
/// size cannot be determined are simply absent from the map.
pub async fn get_total_size(urls: &[String]) -> HashMap<String, u64> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("pdl/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    let mut handles = vec![];

    for url in urls {
        let client = client.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            if let Ok(resp) = client.head(&url).send().await {
                let size = resp
                    .headers()
                    .get(reqwest::header::CONTENT_LENGTH)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(0);
                (url, size)
            } else {
                (url, 0)
            }
        }));
    }

    let mut map = HashMap::new();
    for handle in handles {
        if let Ok((url, size)) = handle.await {
            if size > 0 {
                map.insert(url, size);
            }
        }
    }
    map
}

pub async fn run_single_download(
    url: String,
    download_dir: PathBuf,
    output: Option<PathBuf>,
    rate_limit: Option<u32>,
    split: usize,
    mode: TransferMode,
    allowed_types: Option<Vec<String>>,
    json_report: bool,
) -> Result<()> {
    let filename = sanitize_filename(&get_filename_from_url(&url)?);

    if let Some(allowed) = &allowed_types {
        if !is_allowed_file_type(&filename, allowed) {
            bail!("file type of {} is not in the allow list", filename);
        }
    }

    let destination = match &output {
        Some(raw) => resolve_destination_path(raw, &filename),
        None => download_dir.join(&filename),
    };
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create output directory")?;
        }
    }

    let urls = vec![url.clone()];
    println!("Calculating size...");
    let size_map = get_total_size(&urls).await;
    let known: u64 = size_map.values().sum();

    let downloader = Downloader::new(rate_limit, 1, known);
    let connections = mode.connection_count(split);

    if matches!(mode, TransferMode::Parallel)
        && file_matches_known_size(&destination, size_map.get(&url)).await
    {
        downloader.report_skipped(&destination).await?;
        return Ok(());
    }

    let report = downloader.download(&url, &destination, connections).await?;
    print_report(&report, json_report)?;

    if !report.is_success() {
        bail!("download of {} did not complete", url);
    }
    Ok(())
}

pub async fn run_downloads(
    tasks_file: PathBuf,
    download_dir: PathBuf,
    concurrency: Option<usize>,
    rate_limit: Option<u32>,
    split: usize,
    mode: TransferMode,
    allowed_types: Option<Vec<String>>,
    json_report: bool,
) -> Result<()> {
    if !download_dir.exists() {
        fs::create_dir_all(&download_dir)
            .await
            .context("Failed to create output directory")?;
    }

    let file = fs::File::open(&tasks_file)
        .await
        .context(format!("Failed to open tasks file: {:?}", tasks_file))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let mut urls: Vec<String> = vec![];
    while let Some(line) = lines.next_line().await? {
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }
        urls.push(raw.to_string());
    }

    if let Some(allowed) = &allowed_types {
        urls.retain(|url| {
            let keep = get_filename_from_url(url)
                .map(|name| is_allowed_file_type(&name, allowed))
                .unwrap_or(false);
            if !keep {
                eprintln!("Skipping {} (file type not allowed)", url);
            }
            keep
        });
    }

    let total_files = urls.len();

    // Pre-calculate total size
    println!("Calculating total size...");
    let size_map = get_total_size(&urls).await;
    let known: u64 = size_map.values().sum();

    let downloader = Arc::new(Downloader::new(rate_limit, total_files, known));
    let concurrency = concurrency.unwrap_or_else(num_cpus::get);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = vec![];

    for url in urls {
        let downloader = downloader.clone();
        let semaphore = semaphore.clone();
        let download_dir = download_dir.clone();
        let known_size = size_map.get(&url).copied();
        let connections = mode.connection_count(split);
        let parallel = matches!(mode, TransferMode::Parallel);

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire().await.unwrap();

            let filename = match get_filename_from_url(&url) {
                Ok(name) => sanitize_filename(&name),
                Err(e) => {
                    eprintln!("Skipping {}: {}", url, e);
                    return None;
                }
            };
            let destination = download_dir.join(&filename);

            if parallel && file_matches_known_size(&destination, known_size.as_ref()).await {
                if let Err(e) = downloader.report_skipped(&destination).await {
                    eprintln!("Failed to stat {}: {}", destination.display(), e);
                }
                return None;
            }

            match downloader.download(&url, &destination, connections).await {
                Ok(report) => Some(report),
                Err(e) => {
                    eprintln!("Failed to download {}: {}", url, e);
                    None
                }
            }
        });
        handles.push(handle);
    }

    let mut failures = 0usize;
    for handle in handles {
        if let Some(report) = handle.await? {
            if !report.is_success() {
                failures += 1;
            }
            print_report(&report, json_report)?;
        }
    }

    if failures > 0 {
        bail!("{failures} download(s) did not complete");
    }
    Ok(())
}

async fn file_matches_known_size(path: &Path, known: Option<&u64>) -> bool {
    let Some(&size) = known else { return false };
    match fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.len() == size,
        Err(_) => false,
    }
}

/// Prints the failed ranges of a report, or the whole report as JSON.
fn print_report(report: &DownloadReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for segment in report.failed_ranges() {
        if let SegmentOutcome::Failed { reason } = &segment.outcome {
            eprintln!(
                "Failed range {}-{} of {}: {}",
                segment.range.start,
                segment.range.end,
                report.destination.display(),
                reason
            );
        }
    }
    Ok(())
}
