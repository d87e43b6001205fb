//! Mock recognizer and transcriber for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use lexiprobe_core::error::{RecognitionError, TranscriptionError};
use lexiprobe_core::traits::{
    RecognitionEvent, RecognitionRequest, SpeechRecognizer, TranscribeRequest, Transcript,
    TranscriptionFallback,
};

const EVENT_BUFFER: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Counters shared between a [`MockRecognizer`] and the test that owns it.
#[derive(Debug, Default)]
pub struct RecognizerStats {
    starts: AtomicU32,
    stops: AtomicU32,
    aborts: AtomicU32,
    last_request: Mutex<Option<RecognitionRequest>>,
}

impl RecognizerStats {
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::Relaxed)
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::Relaxed)
    }

    pub fn aborts(&self) -> u32 {
        self.aborts.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<RecognitionRequest> {
        lock(&self.last_request).clone()
    }
}

/// A scripted speech recognizer.
///
/// Each `start` replays the next queued session script. The event stream
/// stays open until `stop` or `abort`, so the options countdown decides when
/// the recording ends unless the script itself contains `End`.
pub struct MockRecognizer {
    sessions: VecDeque<Vec<RecognitionEvent>>,
    on_stop: Vec<RecognitionEvent>,
    supported: bool,
    permission: Result<(), RecognitionError>,
    start_delay: Option<Duration>,
    live: Option<mpsc::Sender<RecognitionEvent>>,
    stats: Arc<RecognizerStats>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            sessions: VecDeque::new(),
            on_stop: Vec::new(),
            supported: true,
            permission: Ok(()),
            start_delay: None,
            live: None,
            stats: Arc::new(RecognizerStats::default()),
        }
    }

    /// Queue the events emitted by the next recording session.
    pub fn with_session(mut self, events: Vec<RecognitionEvent>) -> Self {
        self.sessions.push_back(events);
        self
    }

    /// Events emitted when the recording is stopped, before the stream closes.
    pub fn with_events_on_stop(mut self, events: Vec<RecognitionEvent>) -> Self {
        self.on_stop = events;
        self
    }

    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    pub fn with_permission(mut self, permission: Result<(), RecognitionError>) -> Self {
        self.permission = permission;
        self
    }

    /// Delay before `start` confirms.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn stats(&self) -> Arc<RecognizerStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_supported(&self) -> bool {
        self.supported
    }

    async fn check_permission(&mut self) -> Result<(), RecognitionError> {
        self.permission.clone()
    }

    async fn start(
        &mut self,
        request: &RecognitionRequest,
    ) -> Result<mpsc::Receiver<RecognitionEvent>, RecognitionError> {
        self.stats.starts.fetch_add(1, Ordering::Relaxed);
        *lock(&self.stats.last_request) = Some(request.clone());

        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        for event in self.sessions.pop_front().unwrap_or_default() {
            if tx.try_send(event).is_err() {
                tracing::warn!("mock recognizer script exceeds {EVENT_BUFFER} events");
                break;
            }
        }
        self.live = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        self.stats.stops.fetch_add(1, Ordering::Relaxed);
        if let Some(tx) = self.live.take() {
            for event in self.on_stop.iter().cloned() {
                let _ = tx.try_send(event);
            }
        }
    }

    fn abort(&mut self) {
        self.stats.aborts.fetch_add(1, Ordering::Relaxed);
        self.live = None;
    }
}

/// A mock transcription service.
///
/// Returns configurable transcripts keyed by word ID.
pub struct MockTranscriber {
    /// Map of word ID → transcript.
    responses: HashMap<String, String>,
    default_response: Result<String, TranscriptionError>,
    delay: Duration,
    call_count: AtomicU32,
    last_request: Mutex<Option<TranscribeRequest>>,
}

impl MockTranscriber {
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: Ok(String::new()),
            delay: Duration::ZERO,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A transcriber that always returns the same text.
    pub fn with_fixed_transcript(text: &str) -> Self {
        Self {
            default_response: Ok(text.to_string()),
            ..Self::new(HashMap::new())
        }
    }

    /// A transcriber that always fails.
    pub fn failing(error: TranscriptionError) -> Self {
        Self {
            default_response: Err(error),
            ..Self::new(HashMap::new())
        }
    }

    /// Simulated network latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<TranscribeRequest> {
        lock(&self.last_request).clone()
    }
}

#[async_trait]
impl TranscriptionFallback for MockTranscriber {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcribe(
        &self,
        request: &TranscribeRequest,
    ) -> Result<Transcript, TranscriptionError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_request) = Some(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let text = match self.responses.get(request.word_id.as_str()) {
            Some(text) => text.clone(),
            None => self.default_response.clone()?,
        };

        Ok(Transcript {
            text,
            latency_ms: self.delay.as_millis() as u64,
        })
    }
}
