use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Out-of-band 3-bit error descriptor carried with every word.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    /// No error.
    pub const NONE: Self = Self(0);
    /// The current hit word is corrupted.
    pub const HIT: Self = Self(0b001);
    /// The enclosing block (subheader) is malformed.
    pub const BLOCK: Self = Self(0b010);
    /// The enclosing frame (header) is malformed.
    pub const FRAME: Self = Self(0b100);

    const MASK: u8 = 0b111;

    /// Build from raw bits; bits above the descriptor width are dropped.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::MASK)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for ErrorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ErrorFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("ErrorFlags(-)");
        }
        let mut names = Vec::with_capacity(3);
        if self.contains(Self::HIT) {
            names.push("hit");
        }
        if self.contains(Self::BLOCK) {
            names.push("block");
        }
        if self.contains(Self::FRAME) {
            names.push("frame");
        }
        write!(f, "ErrorFlags({})", names.join("|"))
    }
}

/// One lane or storage word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Word {
    /// Payload bits.
    pub data: u32,
    /// Set when the low byte of `data` is a reserved control symbol.
    pub ctrl: bool,
    /// Error descriptor accompanying the word.
    pub err: ErrorFlags,
}

impl Word {
    /// A plain data word.
    pub const fn data(data: u32) -> Self {
        Self {
            data,
            ctrl: false,
            err: ErrorFlags::NONE,
        }
    }

    /// A control word (reserved symbol in the low byte).
    pub const fn control(data: u32) -> Self {
        Self {
            data,
            ctrl: true,
            err: ErrorFlags::NONE,
        }
    }

    /// Same word with `err` added to its error descriptor.
    pub fn with_err(mut self, err: ErrorFlags) -> Self {
        self.err |= err;
        self
    }

    /// Low byte, where control symbols live.
    pub const fn symbol_byte(&self) -> u8 {
        (self.data & 0xFF) as u8
    }
}

/// A word as it travels on a serialised stream or on egress, with the
/// start-of-frame / end-of-frame markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamWord {
    pub word: Word,
    /// First word of a frame.
    pub sop: bool,
    /// Last word of a frame.
    pub eop: bool,
}

impl From<Word> for StreamWord {
    fn from(word: Word) -> Self {
        Self {
            word,
            sop: false,
            eop: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_contain() {
        let flags = ErrorFlags::HIT | ErrorFlags::FRAME;
        assert!(flags.contains(ErrorFlags::HIT));
        assert!(flags.contains(ErrorFlags::FRAME));
        assert!(!flags.contains(ErrorFlags::BLOCK));
        assert!(!flags.contains(ErrorFlags::NONE));
        assert_eq!(flags.bits(), 0b101);
    }

    #[test]
    fn from_bits_truncates_extra_bits() {
        assert_eq!(ErrorFlags::from_bits_truncate(0xFA).bits(), 0b010);
    }

    #[test]
    fn debug_lists_flag_names() {
        let text = format!("{:?}", ErrorFlags::BLOCK | ErrorFlags::HIT);
        assert_eq!(text, "ErrorFlags(hit|block)");
        assert_eq!(format!("{:?}", ErrorFlags::NONE), "ErrorFlags(-)");
    }

    #[test]
    fn word_constructors() {
        let w = Word::control(0x9C).with_err(ErrorFlags::FRAME);
        assert!(w.ctrl);
        assert_eq!(w.symbol_byte(), 0x9C);
        assert!(w.err.contains(ErrorFlags::FRAME));
        assert!(!Word::data(0x9C).ctrl);
    }
}
