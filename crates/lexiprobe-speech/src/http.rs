//! HTTP transcription service client.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::instrument;

use lexiprobe_core::error::TranscriptionError;
use lexiprobe_core::traits::{TranscribeRequest, Transcript, TranscriptionFallback};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Sends captured audio to `{base_url}/v1/transcriptions`.
pub struct HttpTranscriber {
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout_ms,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    no_speech: bool,
}

#[async_trait]
impl TranscriptionFallback for HttpTranscriber {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, request), fields(word_id = %request.word_id, bytes = request.audio.data.len()))]
    async fn transcribe(
        &self,
        request: &TranscribeRequest,
    ) -> Result<Transcript, TranscriptionError> {
        let start = Instant::now();

        let mut req = self
            .client
            .post(format!("{}/v1/transcriptions", self.base_url))
            .query(&[
                ("word_id", request.word_id.as_str()),
                ("hint", request.native_hint.as_str()),
            ])
            .header(CONTENT_TYPE, request.audio.mime_type.as_str())
            .body(request.audio.data.clone());

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                TranscriptionError::Timeout(self.timeout_ms)
            } else {
                TranscriptionError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                * 1000;
            return Err(TranscriptionError::RateLimited {
                retry_after_ms: retry_after,
            });
        }
        if status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::AuthenticationFailed(body));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api {
                status,
                message: body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TranscriptionError::Timeout(self.timeout_ms)
            } else {
                TranscriptionError::Network(e.to_string())
            }
        })?;
        let body: TranscriptionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        if body.no_speech {
            return Err(TranscriptionError::NoUsableAudio);
        }

        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(latency_ms, "fallback transcription received");

        Ok(Transcript {
            text: body.text.trim().to_string(),
            latency_ms,
        })
    }
}
