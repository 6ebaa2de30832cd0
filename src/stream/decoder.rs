//! Incremental frame decoder for the ask stream
//!
//! Network chunks are not aligned with frames, so input is accumulated and
//! only split on the `\n\n` boundary. Payloads are left untouched; turning
//! them into typed events is the dispatcher's job.

/// Event type used when a block carries no `event:` line
pub const DEFAULT_EVENT_TYPE: &str = "message";

const FRAME_BOUNDARY: &str = "\n\n";

/// One decoded block of the wire stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event_type: String,
    pub data: String,
}

impl Frame {
    /// Parse a complete block (boundary already removed)
    fn parse(block: &str) -> Self {
        let mut event_type = DEFAULT_EVENT_TYPE.to_string();
        let mut data_lines: Vec<&str> = Vec::new();

        for line in block.split('\n') {
            if let Some(value) = line.strip_prefix("event:") {
                event_type = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.strip_prefix(' ').unwrap_or(value));
            }
        }

        Self {
            event_type,
            data: data_lines.join("\n"),
        }
    }
}

/// Accumulates raw stream input and yields completed frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence split across chunks
    pending_utf8: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the frames completed so far
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.decode_utf8(bytes);
        Frames { decoder: self }
    }

    /// Feed already-decoded text; returns the frames completed so far
    #[allow(dead_code)] // Used by tests and text-only sources
    pub fn push_str(&mut self, text: &str) -> Frames<'_> {
        self.buffer.push_str(text);
        Frames { decoder: self }
    }

    /// Bytes still waiting for a frame boundary
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending_utf8.len()
    }

    /// Streaming UTF-8 decode: incomplete trailing sequences wait for the
    /// next chunk, invalid sequences become U+FFFD.
    fn decode_utf8(&mut self, bytes: &[u8]) {
        self.pending_utf8.extend_from_slice(bytes);

        loop {
            match std::str::from_utf8(&self.pending_utf8) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending_utf8.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    let prefix = String::from_utf8_lossy(&self.pending_utf8[..valid]).into_owned();
                    self.buffer.push_str(&prefix);
                    match e.error_len() {
                        None => {
                            self.pending_utf8.drain(..valid);
                            return;
                        }
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_utf8.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let idx = self.buffer.find(FRAME_BOUNDARY)?;
            let rest = self.buffer.split_off(idx + FRAME_BOUNDARY.len());
            let block = std::mem::replace(&mut self.buffer, rest);

            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            return Some(Frame::parse(block));
        }
    }
}

/// Lazy iterator over the frames completed by the last push
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.decoder.next_frame()
    }
}
