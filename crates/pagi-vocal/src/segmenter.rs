//! **Text Segmenter** - groups streamed LLM tokens into speakable units.
//!
//! A unit is flushed when the incoming fragment carries a strong delimiter
//! (`.`, `!`, `?`, newline) and the accumulated text is long enough to sound
//! like a sentence. A newline always flushes. This keeps abbreviations such as
//! "Mr." or "approx." from being spoken as clipped one-word utterances.

use tracing::debug;

const SENTENCE_DELIMITERS: &[char] = &['.', '!', '?', '\n'];

/// A flush-ready run of accumulated fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    /// Raw text exactly as accumulated (markup is cleaned later, at synthesis).
    pub text: String,
}

impl TextUnit {
    /// Accumulated length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Accumulates fragments until a flush condition is met.
#[derive(Debug, Clone)]
pub struct TextSegmenter {
    buffer: String,
    min_chars: usize,
}

impl TextSegmenter {
    /// `min_chars`: trimmed length a unit must exceed before a sentence
    /// delimiter (other than newline) flushes it.
    pub fn new(min_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            min_chars,
        }
    }

    /// Append `fragment`; return the completed unit if this fragment closes one.
    ///
    /// At most one unit is emitted per call, and it contains the whole buffer
    /// including any text following the delimiter in the same fragment.
    pub fn ingest(&mut self, fragment: &str) -> Option<TextUnit> {
        if fragment.is_empty() {
            return None;
        }
        self.buffer.push_str(fragment);

        if !fragment.contains(SENTENCE_DELIMITERS) {
            return None;
        }
        let hard_break = fragment.contains('\n');
        let trimmed_len = self.buffer.trim().chars().count();
        if trimmed_len > self.min_chars || hard_break {
            return self.take();
        }
        debug!(
            "segmenter: holding short unit ({} chars <= {})",
            trimmed_len, self.min_chars
        );
        None
    }

    /// End of stream: flush whatever is left, unless it is only whitespace.
    pub fn finish(&mut self) -> Option<TextUnit> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return None;
        }
        self.take()
    }

    /// Drop the residual buffer (new speech request or interruption).
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    fn take(&mut self) -> Option<TextUnit> {
        let text = std::mem::take(&mut self.buffer);
        if text.trim().is_empty() {
            return None;
        }
        Some(TextUnit { text })
    }
}
