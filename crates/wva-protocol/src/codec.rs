//! Event channel framing.
//!
//! The device writes one JSON object per message onto a plain TCP socket.
//! There is no length prefix and no reliable delimiter, and a freshly
//! opened socket may start in the middle of a message. [`FrameExtractor`]
//! accumulates text chunks, skips anything before the next `{` and yields
//! every complete object as soon as its closing brace arrives.

use serde_json::{Map, Value};
use wva_core::config::DEFAULT_MAX_FRAME_LENGTH;

/// One complete JSON object read from the event channel.
pub type Frame = Map<String, Value>;

/// Result of trying to read one frame from the start of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The buffer is a plausible prefix of an object; wait for more data.
    Incomplete,
    /// An object was read from the first `consumed` bytes.
    Complete { frame: Frame, consumed: usize },
    /// The buffer cannot start with an object, whatever follows.
    Invalid,
}

/// Try to read one JSON object from the start of `text`.
pub fn parse_frame(text: &str) -> ParseOutcome {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(Value::Object(frame))) => ParseOutcome::Complete {
            frame,
            consumed: stream.byte_offset(),
        },
        Some(Ok(_)) => ParseOutcome::Invalid,
        Some(Err(e)) if e.is_eof() => ParseOutcome::Incomplete,
        Some(Err(_)) => ParseOutcome::Invalid,
        None => ParseOutcome::Incomplete,
    }
}

/// Incremental JSON object extractor.
///
/// Feed chunks with [`push`](Self::push) and drain frames by iterating. The
/// iterator returns `None` once the buffered text holds no complete object
/// and picks up again after the next push.
///
/// ```
/// use wva_protocol::FrameExtractor;
///
/// let mut extractor = FrameExtractor::new();
/// extractor.push("garbage {\"data\":");
/// assert!(extractor.next().is_none());
/// extractor.push(" {}}{\"alarm\": {}}");
/// assert_eq!(extractor.by_ref().count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence from the last raw chunk
    pending: Vec<u8>,
    max_length: usize,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Create an extractor that drops frames longer than `max_length`
    /// characters.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
            max_length: max_length.max(1),
        }
    }

    /// Append a chunk of text read from the socket.
    pub fn push(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
        self.skip_to_open_brace();
    }

    /// Append raw bytes read from the socket.
    ///
    /// A multi-byte character split across two reads is held back until its
    /// remaining bytes arrive. Invalid sequences become U+FFFD.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    let valid = std::str::from_utf8(&self.pending[..valid_up_to]);
                    text.push_str(valid.unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + bad);
                        }
                        None => {
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }
        self.push(&text);
    }

    /// Extract the next complete frame, if the buffer holds one.
    ///
    /// An object must close within `max_length` characters of its opening
    /// brace. Longer candidates lose those characters and scanning resumes
    /// after them, so the frames produced depend only on the text received.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            self.skip_to_open_brace();
            if self.buffer.is_empty() {
                return None;
            }

            let (window, full) = self.window();
            match parse_frame(&self.buffer[..window]) {
                ParseOutcome::Complete { frame, consumed } => {
                    self.buffer.drain(..consumed);
                    return Some(frame);
                }
                ParseOutcome::Incomplete if full => {
                    self.buffer.drain(..window);
                }
                ParseOutcome::Incomplete => return None,
                // This brace opens nothing; resume at the next one.
                ParseOutcome::Invalid => {
                    self.buffer.drain(..1);
                }
            }
        }
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially received frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending.clear();
    }

    fn skip_to_open_brace(&mut self) {
        match self.buffer.find('{') {
            Some(0) => {}
            Some(i) => {
                self.buffer.drain(..i);
            }
            None => self.buffer.clear(),
        }
    }

    /// Byte length of the first `max_length` characters, and whether the
    /// buffer holds that many.
    fn window(&self) -> (usize, bool) {
        match self.buffer.char_indices().nth(self.max_length) {
            Some((end, _)) => (end, true),
            None => (self.buffer.len(), self.buffer.chars().count() == self.max_length),
        }
    }
}

impl Iterator for FrameExtractor {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.next_frame()
    }
}
