//! Clients for the external speech and language services.
//!
//! - `SpeechToText`: audio/video file in, time-aligned transcript out
//!   (Whisper-compatible `verbose_json` API)
//! - `ContentGenerator`: transcript in, short headline out (Gemini)

pub mod error;
pub mod generation;
mod retry;
pub mod speech;

pub use error::{MlError, MlResult};
pub use generation::{clean_headline, ContentGenerator, GeminiClient, GeminiConfig};
pub use speech::{SpeechClientConfig, SpeechToText, TranscribeOptions, WhisperClient};
