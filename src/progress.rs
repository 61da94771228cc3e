use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Point-in-time view of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub total: u64,
}

/// Byte counter shared by every segment of one download.
///
/// `inc` is an atomic add plus a bar tick; indicatif throttles actual
/// drawing to the draw target rate, so callers never block on rendering.
#[derive(Clone)]
pub struct Progress {
    total: u64,
    completed: Arc<AtomicU64>,
    aggregate: Option<Arc<AtomicU64>>,
    bar: ProgressBar,
}

impl Progress {
    pub fn new(multi: &MultiProgress, total: u64, label: &str) -> Self {
        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(bar_style());
        bar.set_message(format!("Downloading {label}"));
        Self {
            total,
            completed: Arc::new(AtomicU64::new(0)),
            aggregate: None,
            bar,
        }
    }

    /// Progress for a resumed transfer: `already` bytes are on disk.
    pub fn resumed(multi: &MultiProgress, total: u64, already: u64, label: &str) -> Self {
        let progress = Self::new(multi, total, label);
        progress.completed.store(already, Ordering::Relaxed);
        progress.bar.set_position(already);
        progress
    }

    /// Transfer with no known length (fallback path): spinner plus byte count.
    pub fn unbounded(multi: &MultiProgress, label: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {bytes:>12} {bytes_per_sec:>12} {msg}")
                .unwrap(),
        );
        bar.set_message(format!("Downloading {label}"));
        Self {
            total: 0,
            completed: Arc::new(AtomicU64::new(0)),
            aggregate: None,
            bar,
        }
    }

    /// Counter without a visible bar, for library callers and tests.
    pub fn hidden(total: u64) -> Self {
        Self {
            total,
            completed: Arc::new(AtomicU64::new(0)),
            aggregate: None,
            bar: ProgressBar::hidden(),
        }
    }

    /// Feed every increment into a shared batch counter as well.
    pub(crate) fn with_aggregate(mut self, aggregate: Arc<AtomicU64>) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn inc(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.completed.fetch_add(n, Ordering::Relaxed);
        if let Some(aggregate) = &self.aggregate {
            aggregate.fetch_add(n, Ordering::Relaxed);
        }
        self.bar.inc(n);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total,
        }
    }

    pub fn finish(&self, message: String) {
        self.bar.finish_with_message(message);
    }

    pub fn abandon(&self, message: String) {
        self.bar.abandon_with_message(message);
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {bytes_per_sec:>12} {eta:>4} {msg}")
        .unwrap()
        .progress_chars("=>-")
}

/// Summary header across a batch of files, refreshed by a background task.
pub struct BatchProgress {
    downloaded_files: Arc<AtomicUsize>,
    downloaded_bytes: Arc<AtomicU64>,
    known_bytes: Arc<AtomicU64>,
    total_files: usize,
}

impl BatchProgress {
    pub fn new(multi: &MultiProgress, total_files: usize, known_bytes: u64) -> Self {
        let header = multi.add(ProgressBar::new(0));
        header.set_style(ProgressStyle::default_bar().template("{msg}").unwrap());
        header.set_message(format!("Summary: Files: 0/{} | Downloaded: 0 B", total_files));

        let batch = Self {
            downloaded_files: Arc::new(AtomicUsize::new(0)),
            downloaded_bytes: Arc::new(AtomicU64::new(0)),
            known_bytes: Arc::new(AtomicU64::new(known_bytes)),
            total_files,
        };

        // Refresh the header on a timer instead of on every chunk.
        let files = batch.downloaded_files.clone();
        let bytes = batch.downloaded_bytes.clone();
        let known = batch.known_bytes.clone();
        tokio::spawn(async move {
            loop {
                header.set_message(format!(
                    "Summary: Files: {}/{} | Downloaded: {} / {}",
                    files.load(Ordering::Relaxed),
                    total_files,
                    HumanBytes(bytes.load(Ordering::Relaxed)),
                    HumanBytes(known.load(Ordering::Relaxed)),
                ));
                header.tick();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        batch
    }

    pub fn file_finished(&self) {
        self.downloaded_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.downloaded_bytes.fetch_add(n, Ordering::Relaxed);
    }

    /// Accounts for a size discovered after the initial precheck.
    pub fn add_known_bytes(&self, n: u64) {
        self.known_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn byte_counter(&self) -> Arc<AtomicU64> {
        self.downloaded_bytes.clone()
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.downloaded_bytes.load(Ordering::Relaxed),
            total: self.known_bytes.load(Ordering::Relaxed),
        }
    }
}
