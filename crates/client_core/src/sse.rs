#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    // bytes of `buffer` already known to hold no event terminator
    scanned: usize,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_event_end(&self.buffer, self.scanned.saturating_sub(1)) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.scanned = 0;
            if let Some(data) = event_data(&block[..end]) {
                events.push(data);
            }
        }
        self.scanned = self.buffer.len();
        events
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        let block = std::mem::take(&mut self.buffer);
        event_data(&block)
    }
}

fn find_event_end(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|pair| pair == b"\n\n")
        .map(|offset| from + offset)
}

fn event_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let lines: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_events_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: {\"msg\":").is_empty());
        let events = decoder.feed(b"\"estimation\"}\n\ndata: {\"msg\":\"close_stream\"}\n\n");
        assert_eq!(
            events,
            vec![
                r#"{"msg":"estimation"}"#.to_string(),
                r#"{"msg":"close_stream"}"#.to_string(),
            ]
        );
    }

    #[test]
    fn ignores_comments_and_handles_crlf() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b": keepalive\r\n\r\nevent: message\r\ndata: a\r\ndata: b\r\n\r\n");
        assert_eq!(events, vec!["a\nb".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn terminator_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: one\n").is_empty());
        assert_eq!(decoder.feed(b"\ndata: two\n\n"), vec!["one", "two"]);
    }

    #[test]
    fn large_inline_event_in_small_chunks() {
        let payload = "A".repeat(8 * 1024 * 1024);
        let body = format!("data: {payload}\n\n");
        let mut decoder = SseDecoder::default();

        let started = std::time::Instant::now();
        let mut events = Vec::new();
        for chunk in body.as_bytes().chunks(16 * 1024) {
            events.extend(decoder.feed(chunk));
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].len(), payload.len());
        assert_eq!(decoder.scanned, 0);
        assert!(
            started.elapsed() < std::time::Duration::from_secs(10),
            "decoding took {:?}",
            started.elapsed()
        );
    }
}
