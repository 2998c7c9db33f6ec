//! Error types for the cookie baker worker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CookieBakerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid workload: {0}")]
    InvalidWorkload(#[from] InvalidWorkload),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Bake job error: {0}")]
    Job(String),
}

/// Reasons a `WorkloadRequest` is refused before a job is built from it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidWorkload {
    #[error("sample count must be positive, got {0}")]
    SampleCount(i32),

    #[error("resolution must be positive, got {0}")]
    Resolution(i32),

    #[error("bounce count must not be negative, got {0}")]
    BounceCount(i32),

    #[error("index pool length {0} is not a multiple of 3")]
    IndexPoolLength(usize),

    #[error("object {object}: index range {offset}+{count} outside pool of {pool}")]
    IndexRange {
        object: usize,
        offset: i32,
        count: i32,
        pool: usize,
    },

    #[error("object {object}: vertex {vertex} outside pool of {pool}")]
    VertexIndex {
        object: usize,
        vertex: i64,
        pool: usize,
    },
}

pub type Result<T> = std::result::Result<T, CookieBakerError>;
