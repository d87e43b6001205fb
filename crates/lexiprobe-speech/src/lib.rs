//! lexiprobe-speech: Speech recognizer and transcription fallback integrations.
//!
//! Implements `TranscriptionFallback` for an HTTP transcription service,
//! provides scriptable mocks of both collaborator traits, and loads the
//! lexiprobe configuration file.

pub mod config;
pub mod disabled;
pub mod http;
pub mod mock;

pub use config::{
    build_verifier, create_fallback, load_config, load_config_from, FallbackConfig,
    LexiprobeConfig,
};
pub use disabled::DisabledFallback;
pub use http::HttpTranscriber;
pub use lexiprobe_core::error::{RecognitionError, TranscriptionError};
