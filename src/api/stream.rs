use super::logging::emit_sse_parse_error;
use crate::types::StreamEvent;

/// Splits a raw byte stream into server-sent-event frames and parses the
/// `data:` payload of each into a [`StreamEvent`].
///
/// Frames arrive as `data: <json>\n\n`, optionally preceded by an `event:`
/// line. The buffer holds raw bytes, not text: network chunk boundaries are
/// arbitrary and can fall inside a multibyte UTF-8 character, so only
/// complete frames are decoded. A frame that fails to parse is logged and
/// skipped: a dropped display fragment is preferable to killing the whole
/// response. The `[DONE]` sentinel flips `is_done` and everything after it
/// is ignored.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk of bytes and return every complete event it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = find_frame_boundary(&self.buffer[start..]) {
            let frame_end = start + end + 2;
            if !self.done {
                let frame = String::from_utf8_lossy(&self.buffer[start..frame_end]);
                for line in frame.lines() {
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        self.done = true;
                        break;
                    }
                    match serde_json::from_str::<StreamEvent>(data) {
                        Ok(event) => events.push(event),
                        Err(error) => emit_sse_parse_error(data, &error),
                    }
                }
            }
            start = frame_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        events
    }
}

fn find_frame_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_split_across_chunks() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,");
        assert!(events.is_empty());

        let events = parser.push(b"\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n\n");
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::ContentBlockDelta { delta, .. } => {
                assert_eq!(delta.text.as_deref(), Some("hi"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_multibyte_character_split_across_chunks_survives() {
        let mut parser = SseParser::new();
        let frame = "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"café\"}}\n\n";
        let bytes = frame.as_bytes();
        // Cut between the two bytes of the encoded 'é'.
        let split = frame.find('é').expect("fixture contains the char") + 1;
        assert!(!frame.is_char_boundary(split));

        let events = parser.push(&bytes[..split]);
        assert!(events.is_empty());

        let events = parser.push(&bytes[split..]);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::ContentBlockDelta { delta, .. } => {
                assert_eq!(delta.text.as_deref(), Some("café"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frame_is_skipped_without_aborting() {
        let mut parser = SseParser::new();
        let events = parser.push(
            b"data: {not json}\n\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::MessageStop));
    }

    #[test]
    fn test_done_sentinel_ends_the_stream() {
        let mut parser = SseParser::new();
        let events =
            parser.push(b"data: [DONE]\n\ndata: {\"type\":\"message_stop\"}\n\n");
        assert!(events.is_empty());
        assert!(parser.is_done());
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: ping\n: keepalive comment\ndata: {\"type\":\"ping\"}\n\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Ping));
    }
}
