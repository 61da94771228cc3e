use clap::ValueEnum;

/// How a single file is transferred.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum TransferMode {
    /// Split the file into ranges fetched over parallel connections.
    Parallel,
    /// One connection, streaming in order; resumes partial files.
    Sequential,
}

impl TransferMode {
    pub fn connection_count(self, split: usize) -> usize {
        match self {
            TransferMode::Parallel => split.max(1),
            TransferMode::Sequential => 1,
        }
    }
}
