use bytes::{Buf, BufMut, BytesMut};

use crate::error::{RecordError, Result};
use crate::word::{ErrorFlags, StreamWord, Word};

/// Stream header: magic (2) + lane (2) = 4 bytes.
pub const STREAM_HEADER_SIZE: usize = 4;

/// Serialised word: data (4) + flags (1) = 5 bytes.
pub const WORD_SIZE: usize = 5;

/// Magic bytes: "PW" (0x50 0x57).
pub const MAGIC: [u8; 2] = [0x50, 0x57];

/// Lane id used for the aggregated egress stream.
pub const EGRESS_LANE: u16 = 0xFFFF;

const FLAG_CTRL: u8 = 1 << 0;
const FLAG_ERR_SHIFT: u8 = 1;
const FLAG_SOP: u8 = 1 << 4;
const FLAG_EOP: u8 = 1 << 5;
const FLAG_RESERVED: u8 = 0b1100_0000;

/// Encode the stream header.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┐
/// │ Magic (2B)   │ Lane      │
/// │ 0x50 0x57    │ (2B LE)   │
/// │ "PW"         │           │
/// └──────────────┴───────────┘
/// ```
pub fn encode_stream_header(lane: u16, dst: &mut BytesMut) {
    dst.reserve(STREAM_HEADER_SIZE);
    dst.put_slice(&MAGIC);
    dst.put_u16_le(lane);
}

/// Decode the stream header.
///
/// Returns `Ok(None)` if the buffer doesn't hold the full header yet.
pub fn decode_stream_header(src: &mut BytesMut) -> Result<Option<u16>> {
    if src.len() < STREAM_HEADER_SIZE {
        return Ok(None);
    }
    if src[0..2] != MAGIC {
        return Err(RecordError::InvalidMagic);
    }
    src.advance(2);
    Ok(Some(src.get_u16_le()))
}

/// Encode one word.
///
/// Wire format:
/// ```text
/// ┌─────────────┬──────────────────────────────────────────────┐
/// │ Data (4B LE)│ Flags (1B)                                   │
/// │             │ b0 ctrl, b1-3 err (hit/block/frame),         │
/// │             │ b4 sop, b5 eop, b6-7 zero                    │
/// └─────────────┴──────────────────────────────────────────────┘
/// ```
pub fn encode_word(word: &StreamWord, dst: &mut BytesMut) {
    let mut flags = word.word.err.bits() << FLAG_ERR_SHIFT;
    if word.word.ctrl {
        flags |= FLAG_CTRL;
    }
    if word.sop {
        flags |= FLAG_SOP;
    }
    if word.eop {
        flags |= FLAG_EOP;
    }
    dst.reserve(WORD_SIZE);
    dst.put_u32_le(word.word.data);
    dst.put_u8(flags);
}

/// Decode one word from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete word yet.
/// On success, consumes the word bytes from the buffer.
pub fn decode_word(src: &mut BytesMut) -> Result<Option<StreamWord>> {
    if src.len() < WORD_SIZE {
        return Ok(None);
    }
    let flags = src[4];
    if flags & FLAG_RESERVED != 0 {
        return Err(RecordError::InvalidFlags(flags));
    }
    let data = src.get_u32_le();
    src.advance(1);

    Ok(Some(StreamWord {
        word: Word {
            data,
            ctrl: flags & FLAG_CTRL != 0,
            err: ErrorFlags::from_bits_truncate(flags >> FLAG_ERR_SHIFT),
        },
        sop: flags & FLAG_SOP != 0,
        eop: flags & FLAG_EOP != 0,
    }))
}
