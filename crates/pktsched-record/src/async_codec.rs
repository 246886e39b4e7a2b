use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_stream_header, decode_word, encode_stream_header, encode_word};
use crate::error::RecordError;
use crate::word::StreamWord;

/// `tokio_util` codec for word streams.
///
/// Decoding consumes the stream header before the first word and exposes
/// its lane id through [`WordCodec::lane`]. Encoding emits the header ahead
/// of the first word.
#[derive(Debug, Clone)]
pub struct WordCodec {
    lane: Option<u16>,
    header_sent: bool,
}

impl WordCodec {
    /// Codec for encoding a stream tagged with `lane`.
    pub fn new(lane: u16) -> Self {
        Self {
            lane: Some(lane),
            header_sent: false,
        }
    }

    /// Codec for decoding a stream whose lane is not yet known.
    pub fn decoder() -> Self {
        Self {
            lane: None,
            header_sent: false,
        }
    }

    /// Lane id, once known.
    pub fn lane(&self) -> Option<u16> {
        self.lane
    }
}

impl Decoder for WordCodec {
    type Item = StreamWord;
    type Error = RecordError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.lane.is_none() {
            match decode_stream_header(src)? {
                Some(lane) => self.lane = Some(lane),
                None => return Ok(None),
            }
        }
        decode_word(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(word) => Ok(Some(word)),
            None if src.is_empty() => Ok(None),
            None => Err(RecordError::StreamClosed),
        }
    }
}

impl Encoder<StreamWord> for WordCodec {
    type Error = RecordError;

    fn encode(&mut self, item: StreamWord, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if !self.header_sent {
            encode_stream_header(self.lane.unwrap_or(crate::codec::EGRESS_LANE), dst);
            self.header_sent = true;
        }
        encode_word(&item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::word::Word;

    #[tokio::test]
    async fn framed_roundtrip() {
        let mut sink = FramedWrite::new(Vec::<u8>::new(), WordCodec::new(7));
        sink.send(Word::data(42).into()).await.unwrap();
        sink.send(Word::control(0x9C).into()).await.unwrap();
        let bytes = sink.into_inner();

        let mut stream = FramedRead::new(bytes.as_slice(), WordCodec::decoder());
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.word.data, 42);
        assert!(second.word.ctrl);
        assert!(stream.next().await.is_none());
        assert_eq!(stream.decoder().lane(), Some(7));
    }

    #[tokio::test]
    async fn truncated_stream_errors() {
        let bytes = [0x50u8, 0x57, 0x00, 0x00, 0x01, 0x02];
        let mut stream = FramedRead::new(&bytes[..], WordCodec::decoder());
        let result = stream.next().await.unwrap();
        assert!(matches!(result, Err(RecordError::StreamClosed)));
    }
}
