//! Typed records and their word layout.
//!
//! ```text
//! Header    (5 words)  PREAMBLE | ts[47:16] | ts[15:0]<<16 | serial | shd_count<<16 | hit_count
//! Subheader (1 word)   slot<<24 | hit_count<<8 | K23.7          (control)
//! Hit       (1 word)   payload                                  (data)
//! Trailer   (1 word)   K28.4                                    (control)
//! ```

use crate::symbol::{classify, WordKind, K23_7, PREAMBLE, TRAILER};
use crate::word::Word;

/// Header length in words, preamble included.
pub const HEADER_WORDS: usize = 5;

/// Subheader length in words.
pub const SUBHEADER_WORDS: usize = 1;

/// Trailer length in words.
pub const TRAILER_WORDS: usize = 1;

const TIMESTAMP_MASK: u64 = (1 << 48) - 1;

/// Frame header fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    /// 48-bit frame timestamp, in subheader-slot units.
    pub timestamp: u64,
    pub serial: u32,
    pub subheader_count: u16,
    pub hit_count: u16,
}

impl Header {
    /// The four field words that follow the preamble.
    pub fn field_words(&self) -> [u32; HEADER_WORDS - 1] {
        let ts = self.timestamp & TIMESTAMP_MASK;
        [
            (ts >> 16) as u32,
            ((ts & 0xFFFF) as u32) << 16,
            self.serial,
            (u32::from(self.subheader_count) << 16) | u32::from(self.hit_count),
        ]
    }

    /// Rebuild a header from its four field words.
    pub fn from_field_words(fields: [u32; HEADER_WORDS - 1]) -> Self {
        Self {
            timestamp: (u64::from(fields[0]) << 16) | u64::from(fields[1] >> 16),
            serial: fields[2],
            subheader_count: (fields[3] >> 16) as u16,
            hit_count: (fields[3] & 0xFFFF) as u16,
        }
    }

    /// Full header as words, preamble first.
    pub fn to_words(&self) -> [Word; HEADER_WORDS] {
        let f = self.field_words();
        [
            Word::control(PREAMBLE),
            Word::data(f[0]),
            Word::data(f[1]),
            Word::data(f[2]),
            Word::data(f[3]),
        ]
    }
}

/// Block header: opens `hit_count` hits for one time slot of the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subheader {
    /// Slot index within the frame.
    pub slot: u8,
    pub hit_count: u16,
}

impl Subheader {
    pub fn to_word(&self) -> Word {
        Word::control((u32::from(self.slot) << 24) | (u32::from(self.hit_count) << 8) | u32::from(K23_7))
    }

    /// Decode the fields of a subheader word. The caller has already checked
    /// the symbol.
    pub fn from_data(data: u32) -> Self {
        Self {
            slot: (data >> 24) as u8,
            hit_count: ((data >> 8) & 0xFFFF) as u16,
        }
    }
}

/// One typed unit of lane data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Header(Header),
    Subheader(Subheader),
    Hit(u32),
    Trailer,
}

impl Record {
    /// Append this record's words to `out`.
    pub fn write_words(&self, out: &mut Vec<Word>) {
        match self {
            Record::Header(h) => out.extend_from_slice(&h.to_words()),
            Record::Subheader(s) => out.push(s.to_word()),
            Record::Hit(data) => out.push(Word::data(*data)),
            Record::Trailer => out.push(Word::control(TRAILER)),
        }
    }

    /// Number of words this record occupies.
    pub fn word_len(&self) -> usize {
        match self {
            Record::Header(_) => HEADER_WORDS,
            Record::Subheader(_) | Record::Hit(_) | Record::Trailer => 1,
        }
    }
}

/// Flatten a record sequence into words.
pub fn to_words(records: &[Record]) -> Vec<Word> {
    let mut out = Vec::with_capacity(records.iter().map(Record::word_len).sum());
    for record in records {
        record.write_words(&mut out);
    }
    out
}

/// Incremental word → record decoder.
///
/// Lenient: used by tooling to display streams, not by the scheduler's lane
/// parser. Words that cannot start a record are reported as
/// [`RecordDecoder::stray`] and skipped.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    fields: Option<(usize, [u32; HEADER_WORDS - 1])>,
    stray: u64,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one word; returns a record once one is complete.
    pub fn feed(&mut self, word: &Word) -> Option<Record> {
        if let Some((idx, mut fields)) = self.fields.take() {
            if classify(word) == WordKind::Data {
                fields[idx] = word.data;
                if idx + 1 == fields.len() {
                    return Some(Record::Header(Header::from_field_words(fields)));
                }
                self.fields = Some((idx + 1, fields));
                return None;
            }
            // Header cut short by a control word: drop it and decode the word.
            self.stray += 1;
        }

        match classify(word) {
            WordKind::Preamble => {
                self.fields = Some((0, [0; HEADER_WORDS - 1]));
                None
            }
            WordKind::Subheader => Some(Record::Subheader(Subheader::from_data(word.data))),
            WordKind::Trailer => Some(Record::Trailer),
            WordKind::Data => Some(Record::Hit(word.data)),
            WordKind::UnknownControl => {
                self.stray += 1;
                None
            }
        }
    }

    /// Words that were dropped because they could not be decoded.
    pub fn stray(&self) -> u64 {
        self.stray
    }

    /// Decode a complete word slice.
    pub fn decode_all(words: &[Word]) -> Vec<Record> {
        let mut decoder = Self::new();
        words.iter().filter_map(|w| decoder.feed(w)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_field_words_roundtrip() {
        let header = Header {
            timestamp: 0x1234_5678_9ABC,
            serial: 77,
            subheader_count: 128,
            hit_count: 513,
        };
        let back = Header::from_field_words(header.field_words());
        assert_eq!(back, header);
    }

    #[test]
    fn header_timestamp_truncated_to_48_bits() {
        let header = Header {
            timestamp: u64::MAX,
            ..Header::default()
        };
        let back = Header::from_field_words(header.field_words());
        assert_eq!(back.timestamp, TIMESTAMP_MASK);
    }

    #[test]
    fn subheader_word_layout() {
        let word = Subheader {
            slot: 3,
            hit_count: 2,
        }
        .to_word();
        assert!(word.ctrl);
        assert_eq!(word.data, 0x0300_02F7);
        assert_eq!(Subheader::from_data(word.data).hit_count, 2);
    }

    #[test]
    fn decode_frame_records() {
        let records = vec![
            Record::Header(Header {
                timestamp: 64,
                serial: 1,
                subheader_count: 1,
                hit_count: 2,
            }),
            Record::Subheader(Subheader {
                slot: 0,
                hit_count: 2,
            }),
            Record::Hit(0xAAAA),
            Record::Hit(0xBBBB),
            Record::Trailer,
        ];
        let words = to_words(&records);
        assert_eq!(words.len(), HEADER_WORDS + 1 + 2 + TRAILER_WORDS);
        assert_eq!(RecordDecoder::decode_all(&words), records);
    }

    #[test]
    fn truncated_header_counts_as_stray() {
        let mut decoder = RecordDecoder::new();
        assert!(decoder.feed(&Word::control(PREAMBLE)).is_none());
        assert!(decoder.feed(&Word::data(1)).is_none());
        assert_eq!(decoder.feed(&Word::control(TRAILER)), Some(Record::Trailer));
        assert_eq!(decoder.stray(), 1);
    }
}
