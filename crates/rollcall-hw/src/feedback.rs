//! Feedback-sink contract for the attendance LCD/buzzer surface.
//!
//! The physical 16x2 LCD and GPIO buzzer live behind this trait. Every
//! method is total: a broken device must degrade to a log line, never
//! abort the recognition pipeline.

/// Width of one LCD line; longer text is truncated by implementations.
pub const DISPLAY_COLS: usize = 16;

/// Sink for human-visible attendance feedback events.
pub trait FeedbackSink: Send + Sync {
    /// Attendance recorded for `name`.
    fn success(&self, name: &str, confidence: f32);

    /// `name` was already marked present today.
    fn duplicate(&self, name: &str);

    /// Face not recognized (or no face found).
    fn unknown(&self);

    /// Generic two-line status message ("System Online" etc.).
    fn system_message(&self, line1: &str, line2: &str);
}

fn clip(line: &str) -> &str {
    let end = line
        .char_indices()
        .map(|(i, _)| i)
        .nth(DISPLAY_COLS)
        .unwrap_or(line.len());
    &line[..end]
}

/// Terminal-mode sink used when no display hardware is attached.
/// Mirrors what the LCD would show, via structured logs.
pub struct TerminalFeedback;

impl FeedbackSink for TerminalFeedback {
    fn success(&self, name: &str, confidence: f32) {
        tracing::info!(line1 = clip(name), line2 = "Attendance OK", confidence, "feedback: success");
    }

    fn duplicate(&self, name: &str) {
        tracing::info!(line1 = clip(name), line2 = "Already Marked", "feedback: duplicate");
    }

    fn unknown(&self) {
        tracing::info!(line1 = "Unknown Face", "feedback: unknown");
    }

    fn system_message(&self, line1: &str, line2: &str) {
        tracing::info!(line1 = clip(line1), line2 = clip(line2), "feedback: system message");
    }
}

/// Discards all feedback. Useful for headless test rigs.
pub struct NullFeedback;

impl FeedbackSink for NullFeedback {
    fn success(&self, _name: &str, _confidence: f32) {}
    fn duplicate(&self, _name: &str) {}
    fn unknown(&self) {}
    fn system_message(&self, _line1: &str, _line2: &str) {}
}
