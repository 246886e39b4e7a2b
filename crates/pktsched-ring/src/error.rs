/// Errors that can occur when constructing or addressing ring storage.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RingError {
    /// A memory or queue was requested with zero depth.
    #[error("ring depth must be non-zero")]
    ZeroDepth,

    /// A push was attempted on a full queue.
    #[error("queue full (depth {0})")]
    Full(usize),
}

pub type Result<T> = std::result::Result<T, RingError>;
