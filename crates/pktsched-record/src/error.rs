/// Errors that can occur while encoding or decoding word streams.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The stream header contains an invalid magic number.
    #[error("invalid stream magic (expected 0x5057 \"PW\")")]
    InvalidMagic,

    /// A word carries flag bits outside the defined set.
    #[error("invalid word flags 0x{0:02x}")]
    InvalidFlags(u8),

    /// An I/O error occurred while reading or writing words.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a word or stream header.
    #[error("stream closed (incomplete word)")]
    StreamClosed,
}

pub type Result<T> = std::result::Result<T, RecordError>;
