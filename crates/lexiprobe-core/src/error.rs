//! Error types shared across lexiprobe.
//!
//! Defined in `lexiprobe-core` so the verifier can classify recognition and
//! fallback failures without string matching, and so collaborator crates
//! return the same types the core consumes.

use thiserror::Error;

/// Misuse of the placement engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// The bootstrap self-assessment answer was not in 1..=4.
    #[error("invalid bootstrap selection {0}, expected 1..=4")]
    InvalidSelection(u8),

    /// An answer reported a level outside 1..=8.
    #[error("invalid level {0}, expected 1..=8")]
    InvalidLevel(u8),

    /// The operation is not valid in the engine's current phase.
    #[error("{operation} is not valid in the {phase} phase")]
    InvalidPhase {
        operation: &'static str,
        phase: &'static str,
    },
}

/// Failures reported by an on-device speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionError {
    /// The user denied microphone or recognition access.
    #[error("speech recognition permission denied")]
    PermissionDenied,

    /// The device has no recognition capability.
    #[error("speech recognition is not supported on this device")]
    Unsupported,

    /// The recognizer heard nothing.
    #[error("no speech detected")]
    NoSpeech,

    /// Recognition was cancelled on purpose.
    #[error("speech recognition aborted")]
    Aborted,

    /// The recognizer never confirmed that it started.
    #[error("speech recognition did not start within {0}ms")]
    StartTimeout(u64),

    /// Recording was requested while the answer options were not showing.
    #[error("answer options are not showing")]
    OptionsNotShown,

    /// Any other engine-level failure.
    #[error("speech recognition failed: {0}")]
    Engine(String),
}

impl RecognitionError {
    /// Returns `true` if this error should be surfaced to the caller.
    ///
    /// `Aborted` results from intentional cancellation and `NoSpeech` is an
    /// ordinary outcome handled by the fallback path.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, RecognitionError::Aborted | RecognitionError::NoSpeech)
    }

    /// Returns `true` if recording cannot start at all on this device.
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            RecognitionError::PermissionDenied
                | RecognitionError::Unsupported
                | RecognitionError::StartTimeout(_)
        )
    }
}

/// Failures from the network transcription fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptionError {
    /// The service returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The service returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The captured audio contained nothing transcribable.
    #[error("no usable audio")]
    NoUsableAudio,

    /// No fallback is configured.
    #[error("transcription fallback is disabled")]
    Disabled,
}

impl TranscriptionError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TranscriptionError::AuthenticationFailed(_) | TranscriptionError::Disabled
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            TranscriptionError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
