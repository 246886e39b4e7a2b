use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_stream_header, encode_word, WORD_SIZE};
use crate::error::{RecordError, Result};
use crate::word::StreamWord;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes words to any `Write` stream.
///
/// The stream header is written before the first word (or on
/// [`finish`](WordWriter::finish) for an empty stream).
pub struct WordWriter<T> {
    inner: T,
    buf: BytesMut,
    lane: u16,
    header_written: bool,
    words_written: u64,
}

impl<T: Write> WordWriter<T> {
    pub fn new(inner: T, lane: u16) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            lane,
            header_written: false,
            words_written: 0,
        }
    }

    /// Buffer one word, flushing the buffer to the stream when it fills.
    pub fn write_word(&mut self, word: &StreamWord) -> Result<()> {
        self.ensure_header();
        encode_word(word, &mut self.buf);
        self.words_written += 1;
        if self.buf.len() + WORD_SIZE > INITIAL_BUFFER_CAPACITY {
            self.drain()?;
        }
        Ok(())
    }

    /// Write every word in `words`.
    pub fn write_words<'a>(&mut self, words: impl IntoIterator<Item = &'a StreamWord>) -> Result<()> {
        for word in words {
            self.write_word(word)?;
        }
        Ok(())
    }

    /// Write out everything buffered and flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.drain()?;
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(RecordError::Io(err)),
            }
        }
    }

    /// Flush, making sure the stream header exists even with no words.
    pub fn finish(mut self) -> Result<T> {
        self.ensure_header();
        self.flush()?;
        Ok(self.inner)
    }

    /// Words written so far.
    pub fn words_written(&self) -> u64 {
        self.words_written
    }

    fn ensure_header(&mut self) {
        if !self.header_written {
            encode_stream_header(self.lane, &mut self.buf);
            self.header_written = true;
        }
    }

    fn drain(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(RecordError::StreamClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(RecordError::Io(err)),
            }
        }
        self.buf.clear();
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::reader::WordReader;
    use crate::word::Word;

    #[test]
    fn write_then_read_back() {
        let mut writer = WordWriter::new(Cursor::new(Vec::<u8>::new()), 5);
        writer.write_word(&Word::data(1).into()).unwrap();
        writer
            .write_word(&StreamWord {
                word: Word::control(0x9C),
                sop: false,
                eop: true,
            })
            .unwrap();
        assert_eq!(writer.words_written(), 2);
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = WordReader::new(Cursor::new(bytes));
        assert_eq!(reader.lane().unwrap(), 5);
        let words = reader.read_to_end().unwrap();
        assert_eq!(words.len(), 2);
        assert!(words[1].eop);
    }

    #[test]
    fn empty_stream_still_has_header() {
        let writer = WordWriter::new(Cursor::new(Vec::<u8>::new()), 9);
        let bytes = writer.finish().unwrap().into_inner();
        let mut reader = WordReader::new(Cursor::new(bytes));
        assert_eq!(reader.lane().unwrap(), 9);
        assert!(reader.read_word().unwrap().is_none());
    }

    #[test]
    fn large_stream_spans_multiple_drains() {
        let mut writer = WordWriter::new(Cursor::new(Vec::<u8>::new()), 0);
        for i in 0..5000u32 {
            writer.write_word(&Word::data(i).into()).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        let words = WordReader::new(Cursor::new(bytes)).read_to_end().unwrap();
        assert_eq!(words.len(), 5000);
        assert_eq!(words[4999].word.data, 4999);
    }

    #[test]
    fn zero_length_write_is_stream_closed() {
        let mut writer = WordWriter::new(ZeroWriter, 0);
        writer.write_word(&Word::data(1).into()).unwrap();
        assert!(matches!(writer.flush(), Err(RecordError::StreamClosed)));
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
