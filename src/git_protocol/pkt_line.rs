use super::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;

/// Size of the hex length prefix; the encoded length counts it too.
const LEN_PREFIX_SIZE: usize = 4;

/// Largest payload a single pkt-line can carry.
pub const MAX_PKT_PAYLOAD: usize = 65516;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Flush,
    Data(Bytes),
}

impl PktLine {
    /// An empty payload is the flush packet.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Self::Flush
        } else {
            Self::Data(bytes)
        }
    }

    pub fn flush() -> Self {
        Self::Flush
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Flush => 0,
            Self::Data(bytes) => bytes.len() + LEN_PREFIX_SIZE,
        }
    }

    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    pub fn data(&self) -> Option<&Bytes> {
        match self {
            Self::Flush => None,
            Self::Data(bytes) => Some(bytes),
        }
    }

    pub fn split_first(&self) -> Option<(u8, &[u8])> {
        self.data()
            .and_then(|bytes| bytes.split_first())
            .map(|(first, rest)| (*first, rest))
    }

    /// Wire form of the line. Payloads over [`MAX_PKT_PAYLOAD`] cannot be
    /// framed and trip a debug assertion.
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(
            self.size() <= MAX_PKT_PAYLOAD + LEN_PREFIX_SIZE,
            "pkt-line payload of {} bytes exceeds {MAX_PKT_PAYLOAD}",
            self.size() - LEN_PREFIX_SIZE
        );
        let mut buf = format!("{:04x}", self.size()).into_bytes();
        if let Self::Data(bytes) = self {
            buf.extend_from_slice(bytes);
        }
        buf
    }
}

impl fmt::Display for PktLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload: &[u8] = self.data().map(|bytes| &bytes[..]).unwrap_or(&[]);
        write!(
            f,
            "{:04x}{}",
            self.size(),
            String::from_utf8_lossy(payload)
        )
    }
}

/// Encodes `payload` as a single pkt-line.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    PktLine::new(Bytes::copy_from_slice(payload)).encode()
}

/// Incremental pkt-line decoder.
///
/// Bytes arrive through [`push`](Self::push) in whatever chunks the transport
/// delivers. A frame is handed out only once every one of its bytes is
/// buffered; the unfinished tail, including a partial length prefix, stays in
/// the buffer for the next push.
#[derive(Debug, Default)]
pub struct PktLineDecoder {
    buf: BytesMut,
}

impl PktLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn take_buffered(&mut self) -> BytesMut {
        self.buf.split()
    }

    pub fn next_frame(&mut self) -> Result<Option<PktLine>> {
        if self.buf.len() < LEN_PREFIX_SIZE {
            return Ok(None);
        }

        let line_len = line_size(&self.buf[..LEN_PREFIX_SIZE])?;
        if line_len == 0 {
            self.buf.advance(LEN_PREFIX_SIZE);
            return Ok(Some(PktLine::Flush));
        }

        if line_len < LEN_PREFIX_SIZE {
            return Err(Error::protocol(format!(
                "pkt-line length {line_len} is shorter than its own prefix"
            )));
        }

        if self.buf.len() < line_len {
            return Ok(None);
        }

        let mut frame = self.buf.split_to(line_len).freeze();
        frame.advance(LEN_PREFIX_SIZE);
        Ok(Some(PktLine::Data(frame)))
    }

    /// Called at end of stream: a partially received frame is an error.
    pub fn finish(&self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(Error::protocol(format!(
                "stream ended inside a pkt-line ({} bytes pending)",
                self.buf.len()
            )))
        }
    }
}

/// The frames of a fully received body.
#[derive(Debug)]
pub struct PktLines {
    decoder: PktLineDecoder,
    done: bool,
}

impl PktLines {
    pub fn new(buf: &[u8]) -> Self {
        let mut decoder = PktLineDecoder::new();
        decoder.push(buf);
        Self {
            decoder,
            done: false,
        }
    }
}

impl From<Bytes> for PktLines {
    fn from(value: Bytes) -> Self {
        Self::new(&value)
    }
}

impl Iterator for PktLines {
    type Item = Result<PktLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.decoder.next_frame() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.done = true;
                self.decoder.finish().err().map(Err)
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn line_size(buf: &[u8]) -> Result<usize> {
    if !buf.iter().all(u8::is_ascii_hexdigit) {
        return Err(Error::protocol(format!(
            "invalid pkt-line length prefix {:?}",
            String::from_utf8_lossy(buf)
        )));
    }
    let len_str = String::from_utf8_lossy(buf);
    usize::from_str_radix(&len_str, 16)
        .map_err(|err| Error::protocol(format!("Cannot parse pkt line size. {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_all(bytes: &[u8]) -> Result<Vec<PktLine>> {
        PktLines::new(bytes).collect()
    }

    #[test]
    fn it_prints_to_pkt_line() {
        let line = PktLine::new(b"foobar\n".to_vec());
        assert_eq!(format!("{line}"), "000bfoobar\n");
        assert_eq!(line.encode(), b"000bfoobar\n");
    }

    #[test]
    fn it_creats_flush_line() {
        assert_eq!(format!("{}", PktLine::flush()), "0000");
        assert_eq!(encode(b""), b"0000");
        assert_eq!(PktLine::new(Bytes::new()), PktLine::Flush);
    }

    #[test]
    fn it_retrieves_pkt_lines() {
        let bytes = b"00ab3b1031798a00fdf9b574b5857b1721bc4b0e6bac HEAD\x00multi_ack thin-pack side-band side-band-64k ofs-delta shallow no-progress include-tag multi_ack_detailed agent=git/1.8.1\n003f3b1031798a00fdf9b574b5857b1721bc4b0e6bac refs/heads/master\n0048c4bf7555e2eb4a2b55c7404c742e7e95017ec850 refs/remotes/origin/master\n0000";
        let lines = decode_all(bytes).unwrap();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], PktLine::new(b"3b1031798a00fdf9b574b5857b1721bc4b0e6bac HEAD\x00multi_ack thin-pack side-band side-band-64k ofs-delta shallow no-progress include-tag multi_ack_detailed agent=git/1.8.1\n".to_vec()));
        assert_eq!(
            lines[1],
            PktLine::new(b"3b1031798a00fdf9b574b5857b1721bc4b0e6bac refs/heads/master\n".to_vec())
        );
        assert_eq!(
            lines[2],
            PktLine::new(
                b"c4bf7555e2eb4a2b55c7404c742e7e95017ec850 refs/remotes/origin/master\n".to_vec()
            )
        );
        assert_eq!(lines[3], PktLine::flush());
    }

    #[test]
    fn it_rejects_lengths_below_four() {
        for prefix in [&b"0001"[..], b"0002", b"0003"] {
            let err = decode_all(prefix).unwrap_err();
            assert!(matches!(err, Error::Protocol(_)), "{prefix:?}");
        }
    }

    #[test]
    fn it_rejects_non_hex_prefix() {
        assert!(matches!(decode_all(b"00zxabc"), Err(Error::Protocol(_))));
        assert!(matches!(decode_all(b"+00aabcdef"), Err(Error::Protocol(_))));
    }

    #[test]
    fn it_fails_on_truncated_frame() {
        assert!(matches!(decode_all(b"000bfoo"), Err(Error::Protocol(_))));
        assert!(matches!(decode_all(b"0000000"), Err(Error::Protocol(_))));
    }

    #[test]
    fn it_keeps_partial_frames_across_pushes() {
        let mut decoder = PktLineDecoder::new();
        decoder.push(b"00");
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.push(b"0bfoo");
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.push(b"bar\n0009");
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(PktLine::new(b"foobar\n".to_vec()))
        );
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert!(decoder.finish().is_err());
        decoder.push(b"done\n");
        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(PktLine::new(b"done\n".to_vec()))
        );
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn it_encodes_largest_payload_with_four_digit_prefix() {
        let encoded = encode(&vec![b'x'; MAX_PKT_PAYLOAD]);
        assert_eq!(&encoded[..LEN_PREFIX_SIZE], b"fff0");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "exceeds")]
    fn it_refuses_to_frame_oversized_payload() {
        encode(&vec![b'x'; MAX_PKT_PAYLOAD + 1]);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(payload in prop::collection::vec(any::<u8>(), 1..=MAX_PKT_PAYLOAD)) {
            let lines = decode_all(&encode(&payload)).unwrap();
            prop_assert_eq!(lines, vec![PktLine::Data(Bytes::from(payload))]);
        }

        #[test]
        fn prop_reassembles_split_frames(
            payload in prop::collection::vec(any::<u8>(), 1..512),
            split in any::<prop::sample::Index>(),
        ) {
            let mut encoded = encode(&payload);
            encoded.extend_from_slice(b"0000");
            let at = split.index(encoded.len() + 1);

            let mut decoder = PktLineDecoder::new();
            let mut frames = vec![];
            for chunk in [&encoded[..at], &encoded[at..]] {
                decoder.push(chunk);
                while let Some(frame) = decoder.next_frame().unwrap() {
                    frames.push(frame);
                }
            }

            decoder.finish().unwrap();
            prop_assert_eq!(frames, vec![PktLine::Data(Bytes::from(payload)), PktLine::Flush]);
        }
    }
}
