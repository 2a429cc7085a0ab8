//! Inbound message framing.
//!
//! The controller terminates each message with `*` or `\n`. Reads may split
//! a message anywhere, so the undelimited tail of the buffer is carried over
//! to the next read.

use crate::domain::error::LinkError;

/// Upper bound on buffered bytes without a delimiter.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

fn is_delimiter(byte: u8) -> bool {
    byte == b'*' || byte == b'\n'
}

#[derive(Debug, Default)]
pub struct MessageBuffer {
    pending: Vec<u8>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every message it completed, trimmed and
    /// with empty segments dropped. An empty chunk yields nothing.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, LinkError> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.pending.extend_from_slice(chunk);

        let Some(last_delimiter) = self.pending.iter().rposition(|b| is_delimiter(*b)) else {
            if self.pending.len() > MAX_PENDING_BYTES {
                self.pending.clear();
                return Err(LinkError::FramingOverflow(MAX_PENDING_BYTES));
            }
            return Ok(Vec::new());
        };

        let tail = self.pending.split_off(last_delimiter + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        let messages = complete
            .split(|b| is_delimiter(*b))
            .filter_map(decode_segment)
            .collect();

        if self.pending.len() > MAX_PENDING_BYTES {
            self.pending.clear();
            return Err(LinkError::FramingOverflow(MAX_PENDING_BYTES));
        }
        Ok(messages)
    }

    /// Drain the undelimited tail, if it holds anything but whitespace.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode_segment(&rest)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_segment(segment: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(segment);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&str]) -> (Vec<String>, MessageBuffer) {
        let mut buffer = MessageBuffer::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(buffer.feed(chunk.as_bytes()).unwrap());
        }
        (out, buffer)
    }

    #[test]
    fn test_single_chunk_keeps_unterminated_tail() {
        let (messages, mut buffer) = feed_all(&["A*B*C"]);
        assert_eq!(messages, vec!["A", "B"]);
        assert_eq!(buffer.finish().as_deref(), Some("C"));
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_terminated_chunk_leaves_nothing_behind() {
        let (messages, mut buffer) = feed_all(&["A*B*C*"]);
        assert_eq!(messages, vec!["A", "B", "C"]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_message_split_across_reads() {
        let (messages, _) = feed_all(&["A*B", "*C*"]);
        assert_eq!(messages, vec!["A", "B", "C"]);

        let (messages, _) = feed_all(&["STAT", "US:OK*"]);
        assert_eq!(messages, vec!["STATUS:OK"]);
    }

    #[test]
    fn test_delimiter_runs_collapse() {
        let (messages, _) = feed_all(&["A**B*"]);
        assert_eq!(messages, vec!["A", "B"]);

        let (messages, _) = feed_all(&["*\n*A\n\n"]);
        assert_eq!(messages, vec!["A"]);
    }

    #[test]
    fn test_segments_are_trimmed() {
        let (messages, _) = feed_all(&["  ARM READY \r\n", " * "]);
        assert_eq!(messages, vec!["ARM READY"]);
    }

    #[test]
    fn test_empty_read_is_ignored() {
        let mut buffer = MessageBuffer::new();
        buffer.feed(b"PART").unwrap();
        assert!(buffer.feed(b"").unwrap().is_empty());
        assert_eq!(buffer.feed(b"IAL*").unwrap(), vec!["PARTIAL"]);
    }

    #[test]
    fn test_multibyte_split_across_reads() {
        let bytes = "température*".as_bytes();
        let mut buffer = MessageBuffer::new();
        assert!(buffer.feed(&bytes[..5]).unwrap().is_empty());
        assert_eq!(buffer.feed(&bytes[5..]).unwrap(), vec!["température"]);
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut buffer = MessageBuffer::new();
        let junk = vec![b'x'; MAX_PENDING_BYTES + 1];
        assert_eq!(
            buffer.feed(&junk),
            Err(LinkError::FramingOverflow(MAX_PENDING_BYTES))
        );
        assert_eq!(buffer.pending_len(), 0);
    }
}
