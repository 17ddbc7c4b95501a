//! Session memory
//!
//! Calculation history and conversation transcript, both bounded ring buffers.

pub mod history;
pub mod transcript;

pub use history::CalculationHistory;
pub use transcript::{MessageRole, Transcript, TranscriptMessage};
