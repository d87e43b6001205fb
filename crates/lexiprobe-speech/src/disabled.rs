//! Fallback used when no transcription service is configured.

use async_trait::async_trait;

use lexiprobe_core::error::TranscriptionError;
use lexiprobe_core::traits::{TranscribeRequest, Transcript, TranscriptionFallback};

/// Always fails with [`TranscriptionError::Disabled`], so silent answers
/// degrade straight to incorrect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledFallback;

#[async_trait]
impl TranscriptionFallback for DisabledFallback {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn transcribe(
        &self,
        _request: &TranscribeRequest,
    ) -> Result<Transcript, TranscriptionError> {
        Err(TranscriptionError::Disabled)
    }
}
