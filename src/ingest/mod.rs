//! Audio ingestion: inbox scanning and transcription.

pub mod inbox;
pub mod transcriber;

pub use inbox::{content_hash, scan, InboxItem};
pub use transcriber::{OpenAiTranscriber, Transcriber, TranscriptResult};
