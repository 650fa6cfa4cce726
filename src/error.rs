//! Error types for conntop operations.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the collection and recording pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The OS refused to produce samples. Transient: the poll is skipped
    /// and retried on the next tick.
    #[error("sampler unavailable: {0}")]
    Sampler(String),

    /// I/O error (recording file, procfs reads, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A recording could not be opened or decompressed.
    #[error("cannot open recording: {0}")]
    PlayerOpen(String),

    /// Snapshot encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV row could not be written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
