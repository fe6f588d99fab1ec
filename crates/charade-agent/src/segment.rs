//! Incremental segmentation of a streamed completion into outgoing messages.
//!
//! The assembler accumulates text fragments and cuts a segment whenever the
//! newest fragment ends on sentence-terminal punctuation while no quote or
//! bracket opened earlier is still unmatched. A cooperative skip sentinel
//! anywhere at the start of the response suppresses all emission for the
//! stream.

/// Sentinel the model outputs to decline responding.
pub const SKIP_SENTINEL: &str = "[skip]";

/// Sentence-terminal punctuation that may close a segment.
fn is_terminal_mark(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '!' | '?')
}

/// Opening half of a tracked quote/bracket pair.
///
/// The ASCII double quote is not tracked: the same character opens and
/// closes, which a depth counter cannot represent.
fn is_open_mark(c: char) -> bool {
    matches!(c, '（' | '(' | '[' | '【' | '「' | '『' | '《' | '“' | '‘')
}

/// Closing half of a tracked quote/bracket pair.
fn is_close_mark(c: char) -> bool {
    matches!(c, '）' | ')' | ']' | '】' | '」' | '』' | '》' | '”' | '’')
}

/// Per-stream segmentation state; discarded when the stream ends.
#[derive(Debug)]
pub struct SegmentAssembler {
    buffer: String,
    open_depth: u32,
    skipped: bool,
    persona_name: String,
}

impl SegmentAssembler {
    pub fn new(persona_name: &str) -> Self {
        Self {
            buffer: String::new(),
            open_depth: 0,
            skipped: false,
            persona_name: persona_name.to_string(),
        }
    }

    /// Whether the stream declared a cooperative skip.
    pub fn skipped(&self) -> bool {
        self.skipped
    }

    /// Feed one streamed fragment; returns a completed segment when the
    /// newest fragment closes a sentence at zero open-mark depth.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if self.skipped || fragment.is_empty() {
            return None;
        }

        self.buffer.push_str(fragment);
        for c in fragment.chars() {
            if is_open_mark(c) {
                self.open_depth += 1;
            } else if is_close_mark(c) {
                self.open_depth = self.open_depth.saturating_sub(1);
            }
        }

        if self.detect_skip() {
            self.skipped = true;
            self.buffer.clear();
            return None;
        }

        let last = fragment.chars().last()?;
        if is_terminal_mark(last) && self.open_depth == 0 {
            let mut segment = std::mem::take(&mut self.buffer);
            segment.pop(); // strip the terminal mark
            if segment.is_empty() {
                return None;
            }
            return Some(segment);
        }

        None
    }

    /// Flush whatever is still buffered when the terminal sentinel arrives.
    pub fn finish(self) -> Option<String> {
        if self.skipped || self.buffer.trim().is_empty() {
            return None;
        }
        Some(self.buffer)
    }

    /// The skip sentinel counts whether or not the model prefixed its own
    /// speaker tag.
    fn detect_skip(&self) -> bool {
        let text = self.buffer.trim_start();
        let text = strip_speaker_tag(text, &self.persona_name);
        text.trim_start().starts_with(SKIP_SENTINEL)
    }
}

fn strip_speaker_tag<'a>(text: &'a str, persona: &str) -> &'a str {
    for sep in ["::", "：", ":"] {
        if let Some(rest) = text
            .strip_prefix(persona)
            .and_then(|r| r.strip_prefix(sep))
        {
            return rest;
        }
    }
    text
}
