use thiserror::Error;

/// Errors raised when a network, a dataset or a trainer is misconfigured.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
