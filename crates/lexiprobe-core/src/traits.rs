//! Collaborator traits for speech recognition and fallback transcription.
//!
//! These async traits are implemented by the `lexiprobe-speech` crate (and by
//! platform bindings outside this workspace). The verifier only talks to them
//! through these seams.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{RecognitionError, TranscriptionError};
use crate::model::WordId;

// ---------------------------------------------------------------------------
// On-device recognition
// ---------------------------------------------------------------------------

/// Audio captured while recognising, kept for the network fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    /// MIME type of `data` (e.g. "audio/wav").
    pub mime_type: String,
    /// Encoded audio bytes.
    pub data: Vec<u8>,
}

impl AudioClip {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Streaming output of a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A provisional transcript that may still change.
    Interim(String),
    /// A settled transcript segment.
    Final(String),
    /// The audio recorded so far.
    Audio(AudioClip),
    /// A recognizer-side failure. Usually followed by `End`.
    Error(RecognitionError),
    /// The recognizer stopped producing events.
    End,
}

/// Parameters for starting a recognition session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionRequest {
    /// BCP 47 locale, e.g. "en-US".
    pub locale: String,
    /// The expected word, for recognizers that support contextual biasing.
    #[serde(default)]
    pub hint: String,
}

/// An on-device speech recognition capability.
#[async_trait]
pub trait SpeechRecognizer: Send {
    /// Human-readable recognizer name (e.g. "android-speech").
    fn name(&self) -> &str;

    /// Whether this device can recognise speech at all.
    async fn is_supported(&self) -> bool;

    /// Ask for (or confirm) microphone and recognition permission.
    async fn check_permission(&mut self) -> Result<(), RecognitionError>;

    /// Start recognising. Resolves once the recognizer confirms it is
    /// listening; events then arrive on the returned channel until `End`
    /// or until the channel closes.
    async fn start(
        &mut self,
        request: &RecognitionRequest,
    ) -> Result<mpsc::Receiver<RecognitionEvent>, RecognitionError>;

    /// Stop listening and request a final result. A final result is not
    /// guaranteed.
    fn stop(&mut self);

    /// Stop listening and discard anything in flight.
    fn abort(&mut self);
}

// ---------------------------------------------------------------------------
// Network fallback
// ---------------------------------------------------------------------------

/// Request to re-transcribe captured audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscribeRequest {
    pub audio: AudioClip,
    /// The word the learner was asked to say.
    pub word_id: WordId,
    /// Whatever the on-device recognizer produced, possibly empty.
    #[serde(default)]
    pub native_hint: String,
}

/// Result of a fallback transcription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Round-trip latency in milliseconds.
    #[serde(default)]
    pub latency_ms: u64,
}

/// A network-backed transcription service used when on-device recognition
/// hears nothing.
#[async_trait]
pub trait TranscriptionFallback: Send + Sync {
    /// Human-readable backend name (e.g. "http").
    fn name(&self) -> &str;

    /// Transcribe the captured audio.
    async fn transcribe(&self, request: &TranscribeRequest)
        -> Result<Transcript, TranscriptionError>;
}
