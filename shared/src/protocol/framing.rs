use crate::error::ProtocolError;
use crate::FRAME_TERMINATOR;
use log::warn;

/// Longest frame accepted from a peer, terminator excluded.
pub const MAX_FRAME_LEN: usize = 4096;

/// Appends the terminator to an outgoing message.
pub fn encode_frame(message: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(message.len() + 1);
    frame.extend_from_slice(message.as_bytes());
    frame.push(FRAME_TERMINATOR);
    frame
}

/// Splits a byte stream into messages at each `0xFF`.
///
/// Bytes after the last terminator are kept until more data arrives, up to
/// [`MAX_FRAME_LEN`]. A longer frame is reported as malformed and skipped
/// through its terminator. Invalid UTF-8 is decoded lossily and left for
/// the parser to reject.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    discarding: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds received bytes and returns every frame they complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Result<String, ProtocolError>> {
        let mut messages = Vec::new();
        for chunk in data.split_inclusive(|b| *b == FRAME_TERMINATOR) {
            let terminated = chunk.last() == Some(&FRAME_TERMINATOR);
            let body = if terminated {
                &chunk[..chunk.len() - 1]
            } else {
                chunk
            };

            if self.discarding {
                self.discarding = !terminated;
                continue;
            }
            if self.buffer.len() + body.len() > MAX_FRAME_LEN {
                warn!(
                    "Discarding frame longer than {} bytes",
                    MAX_FRAME_LEN
                );
                let head = String::from_utf8_lossy(&self.buffer[..self.buffer.len().min(32)])
                    .into_owned();
                messages.push(Err(ProtocolError::malformed(&head)));
                self.buffer.clear();
                self.discarding = !terminated;
                continue;
            }

            self.buffer.extend_from_slice(body);
            if terminated {
                let frame = std::mem::take(&mut self.buffer);
                messages.push(Ok(String::from_utf8_lossy(&frame).into_owned()));
            }
        }
        messages
    }

    /// Bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(frames: Vec<Result<String, ProtocolError>>) -> Vec<String> {
        frames.into_iter().map(|f| f.unwrap()).collect()
    }

    #[test]
    fn test_encode_appends_terminator() {
        assert_eq!(encode_frame("pline 0 hi"), b"pline 0 hi\xFF".to_vec());
        assert_eq!(encode_frame(""), vec![0xFF]);
    }

    #[test]
    fn test_split_across_reads() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"playerjoin 2 ").is_empty());
        assert_eq!(decoder.pending_len(), 13);
        let messages = texts(decoder.push(b"bob\xFFteam 2 red\xFFlvl"));
        assert_eq!(messages, vec!["playerjoin 2 bob", "team 2 red"]);
        assert_eq!(decoder.pending_len(), 3);
    }

    #[test]
    fn test_empty_frame_is_heartbeat_text() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(texts(decoder.push(&[0xFF, 0xFF])), vec!["", ""]);
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let mut decoder = FrameDecoder::new();
        let messages = texts(decoder.push(&[b'p', b'l', 0xC3, 0x28, 0xFF, b'o', b'k', 0xFF]));
        assert_eq!(messages, vec!["pl\u{FFFD}(".to_string(), "ok".to_string()]);
    }

    #[test]
    fn test_oversized_frame_is_reported_and_skipped() {
        let mut decoder = FrameDecoder::new();
        let junk = vec![b'x'; MAX_FRAME_LEN];
        assert!(decoder.push(&junk).is_empty());
        assert_eq!(decoder.pending_len(), MAX_FRAME_LEN);

        let frames = decoder.push(b"yy");
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Err(e) if e.is_malformed()));
        assert_eq!(decoder.pending_len(), 0);

        // The rest of the long frame is dropped up to its terminator
        assert!(decoder.push(&junk).is_empty());
        assert_eq!(decoder.pending_len(), 0);
        let frames = decoder.push(b"zz\xFFlvl 1 2\xFF");
        assert_eq!(texts(frames), vec!["lvl 1 2"]);
    }

    #[test]
    fn test_frame_at_the_limit_is_kept() {
        let mut decoder = FrameDecoder::new();
        let mut data = vec![b'a'; MAX_FRAME_LEN];
        data.push(FRAME_TERMINATOR);
        let frames = texts(decoder.push(&data));
        assert_eq!(frames[0].len(), MAX_FRAME_LEN);
    }
}
