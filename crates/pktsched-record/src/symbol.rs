//! Reserved control symbols.
//!
//! A control word carries one of these in its low byte. Any other low byte
//! on a control word is an unknown symbol and is treated as malformed input.

use crate::word::Word;

/// K28.5: frame preamble, first header word.
pub const K28_5: u8 = 0xBC;

/// K23.7: subheader, opens a block of hits.
pub const K23_7: u8 = 0xF7;

/// K28.4: trailer, closes a frame.
pub const K28_4: u8 = 0x9C;

/// Full preamble word value.
pub const PREAMBLE: u32 = 0xE800_0000 | K28_5 as u32;

/// Full trailer word value.
pub const TRAILER: u32 = K28_4 as u32;

/// What a single word is, judged on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordKind {
    Preamble,
    Subheader,
    Trailer,
    /// Hit payload or a header field word.
    Data,
    /// Control flag set with a symbol outside the reserved set.
    UnknownControl,
}

/// Classify a word by its control flag and low byte.
pub fn classify(word: &Word) -> WordKind {
    if !word.ctrl {
        return WordKind::Data;
    }
    match word.symbol_byte() {
        K28_5 => WordKind::Preamble,
        K23_7 => WordKind::Subheader,
        K28_4 => WordKind::Trailer,
        _ => WordKind::UnknownControl,
    }
}

/// Returns a human-readable name for a control symbol.
pub fn symbol_name(symbol: u8) -> &'static str {
    match symbol {
        K28_5 => "K28.5",
        K23_7 => "K23.7",
        K28_4 => "K28.4",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_reserved_symbols() {
        assert_eq!(classify(&Word::control(PREAMBLE)), WordKind::Preamble);
        assert_eq!(classify(&Word::control(0x0102_03F7)), WordKind::Subheader);
        assert_eq!(classify(&Word::control(TRAILER)), WordKind::Trailer);
        assert_eq!(classify(&Word::control(0x1C)), WordKind::UnknownControl);
    }

    #[test]
    fn data_words_ignore_symbol_byte() {
        assert_eq!(classify(&Word::data(PREAMBLE)), WordKind::Data);
    }

    #[test]
    fn names() {
        assert_eq!(symbol_name(K28_5), "K28.5");
        assert_eq!(symbol_name(0x00), "UNKNOWN");
    }
}
