use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::planner::ByteRange;

/// How a single segment ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentOutcome {
    Completed,
    Failed { reason: String },
}

/// The terminal state of one segment fetch. Bytes already written by a
/// failed segment stay on disk; the count records how far it got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentResult {
    pub range: ByteRange,
    pub bytes_written: u64,
    pub outcome: SegmentOutcome,
}

impl SegmentResult {
    pub fn completed(range: ByteRange, bytes_written: u64) -> Self {
        Self {
            range,
            bytes_written,
            outcome: SegmentOutcome::Completed,
        }
    }

    pub fn failed(range: ByteRange, bytes_written: u64, reason: impl Into<String>) -> Self {
        Self {
            range,
            bytes_written,
            outcome: SegmentOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, SegmentOutcome::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallOutcome {
    Success,
    Failure,
}

/// Terminal artifact of one download, listing every segment in range order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    pub destination: PathBuf,
    pub total_size: u64,
    pub segments: Vec<SegmentResult>,
    pub outcome: OverallOutcome,
}

impl DownloadReport {
    /// Aggregates joined segment results; any failed segment fails the
    /// download as a whole.
    pub fn from_segments(
        destination: PathBuf,
        total_size: u64,
        segments: Vec<SegmentResult>,
    ) -> Self {
        let outcome = if segments.iter().all(SegmentResult::is_completed) {
            OverallOutcome::Success
        } else {
            OverallOutcome::Failure
        };
        Self {
            destination,
            total_size,
            segments,
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == OverallOutcome::Success
    }

    pub fn bytes_written(&self) -> u64 {
        self.segments.iter().map(|s| s.bytes_written).sum()
    }

    /// Segments that did not complete, for the caller to re-run with a
    /// different connection count or accept as partial data.
    pub fn failed_ranges(&self) -> impl Iterator<Item = &SegmentResult> {
        self.segments.iter().filter(|s| !s.is_completed())
    }
}
