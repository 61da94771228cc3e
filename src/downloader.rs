use chrono::{DateTime, Local};
use governor::{Quota, RateLimiter};
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::{header, Client};
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use crate::error::DownloadError;
use crate::planner;
use crate::progress::{BatchProgress, Progress, ProgressSnapshot};
use crate::report::DownloadReport;
use crate::segment::{self, ArcRateLimiter};

/// Orchestrates downloads: size query, range planning, one fetcher task
/// per range, join, report. Holds the shared HTTP client, the progress
/// rendering surface and the optional global rate limiter.
pub struct Downloader {
    client: Client,
    multi_progress: MultiProgress,
    rate_limiter: Option<ArcRateLimiter>,
    batch: BatchProgress,
}

impl Downloader {
    pub fn new(rate_limit_bytes_per_sec: Option<u32>, total_files: usize, known_bytes: u64) -> Self {
        let multi_progress = MultiProgress::new();
        // Draw to stderr at a fixed rate so bars survive output redirection.
        multi_progress.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        Self::with_parts(multi_progress, rate_limit_bytes_per_sec, total_files, known_bytes)
    }

    /// Downloader with no terminal rendering, for library callers and tests.
    pub fn silent(
        rate_limit_bytes_per_sec: Option<u32>,
        total_files: usize,
        known_bytes: u64,
    ) -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        Self::with_parts(multi_progress, rate_limit_bytes_per_sec, total_files, known_bytes)
    }

    fn with_parts(
        multi_progress: MultiProgress,
        rate_limit_bytes_per_sec: Option<u32>,
        total_files: usize,
        known_bytes: u64,
    ) -> Self {
        let client = Client::builder()
            .user_agent(concat!("pdl/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        let rate_limiter = rate_limit_bytes_per_sec.map(|limit| {
            let quota = Quota::per_second(NonZeroU32::new(limit).unwrap());
            Arc::new(RateLimiter::direct(quota))
        });

        let batch = BatchProgress::new(&multi_progress, total_files, known_bytes);

        Self {
            client,
            multi_progress,
            rate_limiter,
            batch,
        }
    }

    pub fn batch(&self) -> &BatchProgress {
        &self.batch
    }

    /// Pollable aggregate progress across everything this downloader has
    /// fetched so far.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.batch.snapshot()
    }

    /// Downloads `url` into `destination` over `connections` parallel range
    /// requests. A single connection streams sequentially and resumes a
    /// partial file; servers that do not report a size get a plain
    /// streaming fetch regardless of the requested connection count.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        connections: usize,
    ) -> Result<DownloadReport, DownloadError> {
        let label = display_name(destination);

        let report = match self.query_size(url).await {
            Ok(0) => {
                fs::write(destination, b"")
                    .await
                    .map_err(|source| DownloadError::filesystem(destination, source))?;
                DownloadReport::from_segments(destination.to_path_buf(), 0, Vec::new())
            }
            Ok(total_size) if connections <= 1 => {
                self.download_sequential(url, destination, total_size, &label)
                    .await?
            }
            Ok(total_size) => {
                self.download_parallel(url, destination, total_size, connections, &label)
                    .await?
            }
            Err(DownloadError::SizeUnknown(_)) => {
                self.download_unbounded(url, destination, &label).await?
            }
            Err(e) => return Err(e),
        };

        if report.is_success() {
            self.batch.file_finished();
        }
        Ok(report)
    }

    /// HEAD request for the remote size. A reachable server that answers
    /// without a usable Content-Length counts as unknown; a server we
    /// cannot reach at all is a hard transport error.
    async fn query_size(&self, url: &str) -> Result<u64, DownloadError> {
        let response = self.client.head(url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::SizeUnknown(url.to_string()));
        }

        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| DownloadError::SizeUnknown(url.to_string()))
    }

    async fn download_parallel(
        &self,
        url: &str,
        destination: &Path,
        total_size: u64,
        connections: usize,
        label: &str,
    ) -> Result<DownloadReport, DownloadError> {
        let ranges = match planner::plan(total_size, connections, 0) {
            Ok(ranges) => ranges,
            Err(DownloadError::InvalidPartition { .. }) => {
                // More connections than bytes: clamp and replan once.
                let clamped = planner::clamp_connections(connections, total_size);
                planner::plan(total_size, clamped, 0)?
            }
            Err(e) => return Err(e),
        };

        // Size the file up front. Partial content from an earlier
        // multi-connection run is discarded; that mode cannot resume.
        let file = fs::File::create(destination)
            .await
            .map_err(|source| DownloadError::filesystem(destination, source))?;
        file.set_len(total_size)
            .await
            .map_err(|source| DownloadError::filesystem(destination, source))?;
        drop(file);

        let progress = Progress::new(&self.multi_progress, total_size, label)
            .with_aggregate(self.batch.byte_counter());

        let mut handles = Vec::with_capacity(ranges.len());
        for range in ranges {
            let client = self.client.clone();
            let url = url.to_string();
            let destination = destination.to_path_buf();
            let progress = progress.clone();
            let limiter = self.rate_limiter.clone();

            handles.push(tokio::spawn(async move {
                segment::fetch(&client, &url, range, &destination, &progress, limiter).await
            }));
        }

        // The join is the only synchronization point: a failing segment
        // never cancels its siblings.
        let mut segments = Vec::with_capacity(handles.len());
        for handle in handles {
            segments.push(handle.await??);
        }

        let report = DownloadReport::from_segments(destination.to_path_buf(), total_size, segments);
        self.finish_progress(&progress, &report, label);
        Ok(report)
    }

    /// Single-connection strategy: picks up where a previous run stopped,
    /// requesting only the bytes the destination file does not have yet.
    async fn download_sequential(
        &self,
        url: &str,
        destination: &Path,
        total_size: u64,
        label: &str,
    ) -> Result<DownloadReport, DownloadError> {
        let already = match fs::metadata(destination).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(source) => return Err(DownloadError::filesystem(destination, source)),
        };

        let ranges = planner::plan(total_size, 1, already)?;
        if ranges.is_empty() {
            // Everything is on disk already.
            return Ok(DownloadReport::from_segments(
                destination.to_path_buf(),
                total_size,
                Vec::new(),
            ));
        }

        if already == 0 {
            // The fetcher seeks into an existing file; make sure there is one.
            fs::File::create(destination)
                .await
                .map_err(|source| DownloadError::filesystem(destination, source))?;
        }

        let progress = Progress::resumed(&self.multi_progress, total_size, already, label)
            .with_aggregate(self.batch.byte_counter());

        let result = segment::fetch(
            &self.client,
            url,
            ranges[0],
            destination,
            &progress,
            self.rate_limiter.clone(),
        )
        .await?;

        let report =
            DownloadReport::from_segments(destination.to_path_buf(), total_size, vec![result]);
        self.finish_progress(&progress, &report, label);
        Ok(report)
    }

    /// Streaming fallback when the remote size is unknown: one plain GET,
    /// no partitioning, no resume. The report's total reflects what
    /// actually arrived.
    async fn download_unbounded(
        &self,
        url: &str,
        destination: &Path,
        label: &str,
    ) -> Result<DownloadReport, DownloadError> {
        let progress = Progress::unbounded(&self.multi_progress, label)
            .with_aggregate(self.batch.byte_counter());

        let result = segment::fetch_unbounded(
            &self.client,
            url,
            destination,
            &progress,
            self.rate_limiter.clone(),
        )
        .await?;

        let total_size = result.bytes_written;
        self.batch.add_known_bytes(total_size);

        let report =
            DownloadReport::from_segments(destination.to_path_buf(), total_size, vec![result]);
        self.finish_progress(&progress, &report, label);
        Ok(report)
    }

    fn finish_progress(&self, progress: &Progress, report: &DownloadReport, label: &str) {
        if report.is_success() {
            progress.finish(format!("Completed   {label}"));
        } else {
            let failed = report.failed_ranges().count();
            progress.abandon(format!(
                "Failed      {label} ({failed} of {} ranges)",
                report.segments.len()
            ));
        }
    }

    /// Reports an already-complete file the way a finished bar would.
    pub async fn report_skipped(&self, destination: &Path) -> Result<(), DownloadError> {
        let metadata = fs::metadata(destination)
            .await
            .map_err(|source| DownloadError::filesystem(destination, source))?;
        let size = metadata.len();
        let created: DateTime<Local> = metadata
            .created()
            .map_err(|source| DownloadError::filesystem(destination, source))?
            .into();

        let bar = self.multi_progress.add(ProgressBar::new(0));
        bar.set_style(ProgressStyle::default_bar().template("{msg}").unwrap());
        bar.finish_with_message(format!(
            "{:>25} {:>17} Skipped {}",
            format!("{}", HumanBytes(size)),
            created.format("%Y-%m-%d %H:%M"),
            display_name(destination),
        ));

        self.batch.file_finished();
        self.batch.add_bytes(size);
        Ok(())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
