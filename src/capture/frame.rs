//! Recognition results delivered by the frame source

use std::time::{Duration, Instant};

/// Text recognized on one forwarded camera frame
#[derive(Debug, Clone)]
pub struct RecognitionBatch {
    /// Recognized lines in reading order
    pub lines: Vec<String>,
    /// When the underlying frame was captured
    pub captured_at: Instant,
    /// Time spent recognizing the frame; diagnostic only
    pub latency: Duration,
}

impl RecognitionBatch {
    /// Create a batch captured now
    pub fn new<I, S>(lines: I, latency: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            captured_at: Instant::now(),
            latency,
        }
    }

    /// A batch carrying no text, as produced by a failed recognition
    pub fn empty() -> Self {
        Self::new(Vec::<String>::new(), Duration::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// All lines joined by a single space
    pub fn joined_text(&self) -> String {
        self.lines.join(" ")
    }
}
