//! Newline-delimited framing for [`tokio_util::codec::Framed`].
//!
//! Unlike `tokio_util::codec::LinesCodec`, decoding yields raw bytes so that a frame with
//! invalid UTF-8 is reported per frame by the caller instead of failing the whole stream.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const DELIMITER: u8 = b'\n';

/// Splits a byte stream into `\n`-terminated frames.
#[derive(Debug, Default, Clone)]
pub struct LineCodec {
    /// Bytes already scanned for a delimiter in the current buffer.
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineCodec {
    type Item = BytesMut;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(offset) = buf[self.next_index..].iter().position(|b| *b == DELIMITER) else {
            self.next_index = buf.len();
            return Ok(None);
        };

        let end = self.next_index + offset;
        self.next_index = 0;
        let mut line = buf.split_to(end + 1);
        line.truncate(end);
        Ok(Some(line))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(line) => Ok(Some(line)),
            None => {
                // An unterminated tail is never a complete frame.
                if !buf.is_empty() {
                    tracing::debug!("Discarding {} trailing bytes without delimiter", buf.len());
                    buf.clear();
                }
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: String, buf: &mut BytesMut) -> Result<(), Self::Error> {
        buf.reserve(frame.len() + 1);
        buf.put_slice(frame.as_bytes());
        if !frame.ends_with('\n') {
            buf.put_u8(DELIMITER);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_splits_on_delimiter() {
        // テスト項目: 区切り文字ごとにフレームが分割される
        // given (前提条件):
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"first\nsecond\nthi"[..]);

        // when (操作):
        let first = codec.decode(&mut buf).unwrap();
        let second = codec.decode(&mut buf).unwrap();
        let third = codec.decode(&mut buf).unwrap();

        // then (期待する結果):
        assert_eq!(first.as_deref(), Some(&b"first"[..]));
        assert_eq!(second.as_deref(), Some(&b"second"[..]));
        assert_eq!(third, None);
        assert_eq!(&buf[..], b"thi");
    }

    #[test]
    fn test_decode_resumes_partial_frame() {
        // テスト項目: 分割されて届いたフレームが結合される
        // given (前提条件):
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"{\"header\""[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        // when (操作):
        buf.extend_from_slice(b":0}\n");
        let frame = codec.decode(&mut buf).unwrap();

        // then (期待する結果):
        assert_eq!(frame.as_deref(), Some(&b"{\"header\":0}"[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_yields_empty_frame() {
        // テスト項目: 空行は空のフレームとして返される
        // given (前提条件):
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\n"[..]);

        // when (操作):
        let frame = codec.decode(&mut buf).unwrap();

        // then (期待する結果):
        assert_eq!(frame.as_deref(), Some(&b""[..]));
    }

    #[test]
    fn test_decode_eof_discards_unterminated_tail() {
        // テスト項目: EOF 時の未完了フレームは破棄される
        // given (前提条件):
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"partial"[..]);

        // when (操作):
        let frame = codec.decode_eof(&mut buf).unwrap();

        // then (期待する結果):
        assert_eq!(frame, None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_appends_single_delimiter() {
        // テスト項目: エンコード時に区切り文字が 1 つだけ付加される
        // given (前提条件):
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        // when (操作):
        codec.encode("a".to_string(), &mut buf).unwrap();
        codec.encode("b\n".to_string(), &mut buf).unwrap();

        // then (期待する結果):
        assert_eq!(&buf[..], b"a\nb\n");
    }
}
