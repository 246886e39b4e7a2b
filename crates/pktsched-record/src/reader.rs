use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_stream_header, decode_word};
use crate::error::{RecordError, Result};
use crate::word::StreamWord;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads words from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete words.
/// The stream header is consumed on the first read.
pub struct WordReader<T> {
    inner: T,
    buf: BytesMut,
    lane: Option<u16>,
    eof: bool,
}

impl<T: Read> WordReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            lane: None,
            eof: false,
        }
    }

    /// Lane id from the stream header, reading it if necessary.
    pub fn lane(&mut self) -> Result<u16> {
        if let Some(lane) = self.lane {
            return Ok(lane);
        }
        loop {
            if let Some(lane) = decode_stream_header(&mut self.buf)? {
                tracing::trace!(lane, "stream header read");
                self.lane = Some(lane);
                return Ok(lane);
            }
            if !self.fill()? {
                return Err(RecordError::StreamClosed);
            }
        }
    }

    /// Read the next word (blocking).
    ///
    /// Returns `Ok(None)` at a clean end of stream and
    /// `Err(RecordError::StreamClosed)` if the stream ends mid-word.
    pub fn read_word(&mut self) -> Result<Option<StreamWord>> {
        self.lane()?;
        loop {
            if let Some(word) = decode_word(&mut self.buf)? {
                return Ok(Some(word));
            }
            if !self.fill()? {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(RecordError::StreamClosed);
            }
        }
    }

    /// Read every remaining word.
    pub fn read_to_end(&mut self) -> Result<Vec<StreamWord>> {
        let mut out = Vec::new();
        while let Some(word) = self.read_word()? {
            out.push(word);
        }
        Ok(out)
    }

    /// Pull one chunk from the inner stream. Returns false at EOF.
    fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(RecordError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_stream_header, encode_word, MAGIC};
    use crate::word::Word;

    fn stream(lane: u16, words: &[u32]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        encode_stream_header(lane, &mut wire);
        for w in words {
            encode_word(&Word::data(*w).into(), &mut wire);
        }
        wire.to_vec()
    }

    #[test]
    fn read_lane_and_words() {
        let mut reader = WordReader::new(Cursor::new(stream(2, &[10, 20, 30])));
        assert_eq!(reader.lane().unwrap(), 2);
        let words: Vec<u32> = reader
            .read_to_end()
            .unwrap()
            .iter()
            .map(|w| w.word.data)
            .collect();
        assert_eq!(words, vec![10, 20, 30]);
    }

    #[test]
    fn empty_body_is_clean_eof() {
        let mut reader = WordReader::new(Cursor::new(stream(0, &[])));
        assert!(reader.read_word().unwrap().is_none());
    }

    #[test]
    fn missing_header_is_stream_closed() {
        let mut reader = WordReader::new(Cursor::new(vec![MAGIC[0]]));
        assert!(matches!(reader.lane(), Err(RecordError::StreamClosed)));
    }

    #[test]
    fn truncated_word_is_stream_closed() {
        let mut wire = BytesMut::from(stream(1, &[5]).as_slice());
        wire.put_u16_le(0xAAAA);
        let mut reader = WordReader::new(Cursor::new(wire.to_vec()));
        assert!(reader.read_word().unwrap().is_some());
        assert!(matches!(reader.read_word(), Err(RecordError::StreamClosed)));
    }

    #[test]
    fn partial_read_handling() {
        let bytes = stream(4, &[0xDEAD_BEEF]);
        let byte_reader = ByteByByteReader { bytes, pos: 0 };
        let mut reader = WordReader::new(byte_reader);
        let word = reader.read_word().unwrap().unwrap();
        assert_eq!(word.word.data, 0xDEAD_BEEF);
        assert_eq!(reader.lane().unwrap(), 4);
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: stream(8, &[1]),
            pos: 0,
        };
        let mut framed = WordReader::new(reader);
        assert_eq!(framed.read_word().unwrap().unwrap().word.data, 1);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
