use bytes::BytesMut;

/// Incremental `text/event-stream` decoder. Only `data:` fields are kept;
/// multi-line data is joined with `\n` and emitted at the blank line that
/// ends the event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the data of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw = self.buffer.split_to(end + 1);
            let line = String::from_utf8_lossy(&raw[..end]).into_owned();
            if let Some(event) = self.feed_line(line.strip_suffix('\r').unwrap_or(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a final event the server did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let raw = self.buffer.split();
            let line = String::from_utf8_lossy(&raw).into_owned();
            if let Some(event) = self.feed_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}
