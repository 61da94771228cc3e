//! Parallel, resumable, range-partitioned file downloads.
//!
//! The crate splits a remote file into disjoint byte ranges, fetches them
//! over independent connections into the right offsets of one destination
//! file, and aggregates progress across the segments. A single-connection
//! sequential mode resumes interrupted transfers from the bytes already on
//! disk, and servers that do not advertise a size fall back to a plain
//! streaming fetch.
//!
//! [`Downloader::download`] is the entry point; it returns a
//! [`DownloadReport`] describing every segment's outcome.

pub mod cli;
pub mod commands;
pub mod downloader;
pub mod error;
pub mod planner;
pub mod progress;
pub mod report;
pub mod segment;
pub mod utils;

pub use downloader::Downloader;
pub use error::DownloadError;
pub use planner::{clamp_connections, plan, ByteRange};
pub use progress::{BatchProgress, Progress, ProgressSnapshot};
pub use report::{DownloadReport, OverallOutcome, SegmentOutcome, SegmentResult};
