//! rollcall-hw — Hardware abstraction for frame acquisition and feedback.
//!
//! Provides capture-helper based camera access with hard timeouts and
//! guaranteed helper reaping, plus the LCD/buzzer feedback-sink contract.

pub mod capture;
pub mod feedback;
pub mod frame;

pub use capture::{AcquisitionError, CaptureStrategy, FrameAcquirer, FrameSource};
pub use feedback::{FeedbackSink, NullFeedback, TerminalFeedback};
pub use frame::Frame;
