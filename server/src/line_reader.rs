//! Newline framing over an arbitrarily chunked byte stream
//!
//! A line is the byte run before each `\n`, with one trailing `\r` removed.
//! At most [`MAX_LINE`] bytes are kept per line; bytes past the limit are
//! discarded until the terminator arrives, and the truncated line is still
//! dispatched.

use shared::MAX_LINE;

#[derive(Debug)]
pub struct LineReader {
    buffer: Vec<u8>,
    limit: usize,
    overflowed: bool,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReader {
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(limit.min(MAX_LINE)),
            limit,
            overflowed: false,
        }
    }

    /// Feeds one chunk and returns every line it completes, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for segment in chunk.split_inclusive(|&b| b == b'\n') {
            let (body, complete) = match segment.split_last() {
                Some((b'\n', body)) => (body, true),
                _ => (segment, false),
            };

            let room = self.limit.saturating_sub(self.buffer.len());
            if body.len() > room {
                self.overflowed = true;
            }
            self.buffer.extend_from_slice(&body[..body.len().min(room)]);

            if complete {
                lines.push(self.take_line());
            }
        }

        lines
    }

    /// True when the line currently being accumulated lost bytes to the limit
    pub fn is_truncating(&self) -> bool {
        self.overflowed
    }

    /// Bytes of the incomplete line held so far
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn take_line(&mut self) -> String {
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        self.overflowed = false;
        line
    }
}
