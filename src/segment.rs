use futures::StreamExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::RateLimiter;
use reqwest::{header, Client, StatusCode};
use std::io::SeekFrom;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};

use crate::error::DownloadError;
use crate::planner::ByteRange;
use crate::progress::Progress;
use crate::report::SegmentResult;

pub type ArcRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Fetches one byte range and writes it at its offset in `destination`.
///
/// Transport problems (request errors, bad status, truncated bodies) end
/// the segment with a `Failed` outcome and leave any bytes already written
/// in place. Only filesystem errors propagate as hard errors, since the
/// shared destination file can no longer be trusted.
pub async fn fetch(
    client: &Client,
    url: &str,
    range: ByteRange,
    destination: &Path,
    progress: &Progress,
    limiter: Option<ArcRateLimiter>,
) -> Result<SegmentResult, DownloadError> {
    let response = match client
        .get(url)
        .header(header::RANGE, range.header_value())
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return Ok(SegmentResult::failed(range, 0, format!("request failed: {e}"))),
    };

    let status = response.status();
    if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
        return Ok(SegmentResult::failed(
            range,
            0,
            format!("unexpected status {status}"),
        ));
    }
    if status == StatusCode::OK && range.start > 0 {
        // The server ignored the range header; writing a full body at this
        // offset would corrupt the regions owned by other segments.
        return Ok(SegmentResult::failed(
            range,
            0,
            "server ignored range request",
        ));
    }

    let file = OpenOptions::new()
        .write(true)
        .open(destination)
        .await
        .map_err(|source| DownloadError::filesystem(destination, source))?;
    let mut writer = BufWriter::new(file);
    writer
        .get_mut()
        .seek(SeekFrom::Start(range.start))
        .await
        .map_err(|source| DownloadError::filesystem(destination, source))?;

    let expected = range.len();
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = writer.flush().await;
                return Ok(SegmentResult::failed(
                    range,
                    written,
                    format!("stream interrupted: {e}"),
                ));
            }
        };

        // Never write past the end of the owned range, even if the server
        // sends a longer body than requested.
        let take = chunk.len().min((expected - written) as usize);
        if take == 0 {
            break;
        }

        if let Some(limiter) = &limiter {
            if let Some(n) = NonZeroU32::new(take as u32) {
                limiter.until_n_ready(n).await.unwrap();
            }
        }

        writer
            .write_all(&chunk[..take])
            .await
            .map_err(|source| DownloadError::filesystem(destination, source))?;
        written += take as u64;
        progress.inc(take as u64);

        if written == expected {
            break;
        }
    }

    writer
        .flush()
        .await
        .map_err(|source| DownloadError::filesystem(destination, source))?;

    if written < expected {
        return Ok(SegmentResult::failed(
            range,
            written,
            format!("truncated body: got {written} of {expected} bytes"),
        ));
    }

    Ok(SegmentResult::completed(range, written))
}

/// Streams a full response with no range header, for servers that do not
/// report a size up front. The destination is rewritten from scratch.
pub async fn fetch_unbounded(
    client: &Client,
    url: &str,
    destination: &Path,
    progress: &Progress,
    limiter: Option<ArcRateLimiter>,
) -> Result<SegmentResult, DownloadError> {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            return Ok(SegmentResult::failed(
                ByteRange::new(0, 0),
                0,
                format!("request failed: {e}"),
            ))
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Ok(SegmentResult::failed(
            ByteRange::new(0, 0),
            0,
            format!("unexpected status {status}"),
        ));
    }

    let file = tokio::fs::File::create(destination)
        .await
        .map_err(|source| DownloadError::filesystem(destination, source))?;
    let mut writer = BufWriter::new(file);

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = writer.flush().await;
                return Ok(SegmentResult::failed(
                    ByteRange::new(0, written.saturating_sub(1)),
                    written,
                    format!("stream interrupted: {e}"),
                ));
            }
        };
        if chunk.is_empty() {
            continue;
        }

        if let Some(limiter) = &limiter {
            if let Some(n) = NonZeroU32::new(chunk.len() as u32) {
                limiter.until_n_ready(n).await.unwrap();
            }
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|source| DownloadError::filesystem(destination, source))?;
        written += chunk.len() as u64;
        progress.inc(chunk.len() as u64);
    }

    writer
        .flush()
        .await
        .map_err(|source| DownloadError::filesystem(destination, source))?;

    Ok(SegmentResult::completed(
        ByteRange::new(0, written.saturating_sub(1)),
        written,
    ))
}
