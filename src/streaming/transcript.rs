//! Transcript accumulation for a live session.
//!
//! Fragments arrive as the backend emits them and are appended verbatim
//! with a separating space. No deduplication, truncation, or
//! punctuation cleanup happens here; the log is a pure append.

/// Accumulated transcript text for one session.
#[derive(Debug, Clone, Default)]
pub struct TranscriptLog {
    text: String,
    fragment_count: u64,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fragment, preceded by a space separator.
    ///
    /// Empty fragments are ignored. Returns the accumulated text.
    pub fn append_fragment(&mut self, fragment: &str) -> &str {
        if !fragment.is_empty() {
            self.text.push(' ');
            self.text.push_str(fragment);
            self.fragment_count += 1;

            if self.fragment_count % 25 == 0 {
                log::debug!(
                    "Transcript: {} fragments, {} chars accumulated",
                    self.fragment_count,
                    self.text.len()
                );
            }
        }
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn fragment_count(&self) -> u64 {
        self.fragment_count
    }

    /// Reset for a new session.
    pub fn clear(&mut self) {
        self.text.clear();
        self.fragment_count = 0;
    }
}
