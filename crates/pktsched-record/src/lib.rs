//! Lane word format, record types and word-stream framing.
//!
//! Every lane speaks the same word format:
//! - A 32-bit data field
//! - A control flag marking reserved control symbols in the low byte
//! - A 3-bit error descriptor (hit, block, frame)
//!
//! Words group into records (Header, Subheader, Hit, Trailer), and records
//! group into frames. The same layout is used on egress.
//!
//! For replay and inspection, word streams are serialised with a short
//! stream header followed by fixed-size word records.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod record;
pub mod symbol;
pub mod word;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::WordCodec;
pub use codec::{
    decode_stream_header, decode_word, encode_stream_header, encode_word, EGRESS_LANE,
    STREAM_HEADER_SIZE, WORD_SIZE,
};
pub use error::{RecordError, Result};
pub use reader::WordReader;
pub use record::{
    to_words, Header, Record, RecordDecoder, Subheader, HEADER_WORDS, SUBHEADER_WORDS,
    TRAILER_WORDS,
};
pub use symbol::{classify, symbol_name, WordKind, K23_7, K28_4, K28_5, PREAMBLE, TRAILER};
pub use word::{ErrorFlags, StreamWord, Word};
pub use writer::WordWriter;
