//! Line framing for the sensor byte stream
//!
//! The link delivers arbitrary chunks. A chunk may hold part of a line,
//! one line, or several. `LineBuffer` accumulates chunks and hands back
//! complete lines in arrival order.

use bytes::BytesMut;
use tracing::{trace, warn};

use crate::constants::MAX_LINE_LENGTH;

/// Accumulates bytes and yields newline-terminated lines
///
/// # Examples
///
/// ```
/// use thumbid_core::LineBuffer;
///
/// let mut lines = LineBuffer::new();
///
/// lines.feed(b"Image ta");
/// assert!(lines.next_line().is_none());
///
/// lines.feed(b"ken\r\nRemove finger\n");
/// assert_eq!(lines.next_line().as_deref(), Some("Image taken"));
/// assert_eq!(lines.next_line().as_deref(), Some("Remove finger"));
/// assert!(lines.next_line().is_none());
/// ```
#[derive(Debug)]
pub struct LineBuffer {
    buffer: BytesMut,
    max_line_length: usize,

    /// Dropping the rest of an overlong line until its newline
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Cap the unterminated tail; anything longer is discarded
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            max_line_length,
            discarding: false,
        }
    }

    /// Append a chunk from the link
    pub fn feed(&mut self, data: &[u8]) {
        let data = if self.discarding {
            match data.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    trace!("Dropped {} more bytes of an overlong line", pos);
                    self.discarding = false;
                    &data[pos + 1..]
                }
                None => return,
            }
        } else {
            data
        };

        self.buffer.extend_from_slice(data);

        let complete = self
            .buffer
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        let tail = self.buffer.len() - complete;

        if tail > self.max_line_length {
            warn!(
                "Discarding {} bytes of unterminated input (max line length {})",
                tail, self.max_line_length
            );
            self.buffer.truncate(complete);
            self.discarding = true;
        }
    }

    /// Next complete, non-blank line without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self.buffer.iter().position(|&b| b == b'\n')?;
            let raw = self.buffer.split_to(pos + 1);

            let mut end = raw.len() - 1;
            if end > 0 && raw[end - 1] == b'\r' {
                end -= 1;
            }

            let line = String::from_utf8_lossy(&raw[..end]).into_owned();
            if line.trim().is_empty() {
                continue;
            }

            trace!("Line: {:?}", line);
            return Some(line);
        }
    }

    /// All complete lines currently buffered
    pub fn drain_lines(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Buffered bytes not yet returned as lines
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop everything, including any partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
