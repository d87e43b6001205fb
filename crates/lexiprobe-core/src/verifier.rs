//! Spoken answer verification.
//!
//! While a spoken question shows its options, the verifier records the learner
//! through a [`SpeechRecognizer`] and turns the transcript into a verdict:
//!
//! 1. A non-empty on-device transcript that matches the target is correct.
//! 2. A non-empty on-device transcript that does not match is incorrect. The
//!    fallback is not consulted.
//! 3. An empty transcript sends the captured audio to the
//!    [`TranscriptionFallback`]. Any fallback failure degrades to incorrect.
//!
//! Every verdict is tagged with the [`VerdictKey`] of the recording session
//! that produced it and goes through [`SpokenAnswerVerifier::apply_verdict`],
//! which drops verdicts whose session is no longer current or whose question
//! cycle the [`PhaseController`] has already left.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::RecognitionError;
use crate::matching::AnswerMatcher;
use crate::model::{Question, Selection, WordId};
use crate::phase::{OptionsTimeout, Phase, PhaseController, PhaseTransition};
use crate::traits::{
    AudioClip, RecognitionEvent, RecognitionRequest, SpeechRecognizer, TranscribeRequest,
    TranscriptionFallback,
};

/// The spoken question currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpokenTarget {
    pub word_id: WordId,
    /// The word the learner should say.
    pub word: String,
    /// Alternative spellings or forms that also count as correct.
    #[serde(default)]
    pub accepted_forms: Vec<String>,
}

impl SpokenTarget {
    pub fn new(word_id: WordId, word: impl Into<String>) -> Self {
        Self {
            word_id,
            word: word.into(),
            accepted_forms: Vec::new(),
        }
    }

    pub fn with_accepted_forms(mut self, forms: impl IntoIterator<Item = String>) -> Self {
        self.accepted_forms.extend(forms);
        self
    }
}

impl From<&Question> for SpokenTarget {
    fn from(question: &Question) -> Self {
        Self::new(question.word_id.clone(), question.word.clone())
    }
}

/// Verifier timeouts and recognizer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// How long the recognizer has to confirm it started listening.
    pub start_timeout_ms: u64,
    /// How long to wait for a final transcript after asking the recognizer to stop.
    pub final_result_grace_ms: u64,
    /// Upper bound on a fallback transcription call.
    pub fallback_timeout_ms: u64,
    pub locale: String,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 3000,
            final_result_grace_ms: 750,
            fallback_timeout_ms: 10_000,
            locale: "en-US".into(),
        }
    }
}

impl VerifierConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn final_result_grace(&self) -> Duration {
        Duration::from_millis(self.final_result_grace_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }
}

/// Identity of one recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which question, recording session and phase cycle a verdict belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerdictKey {
    pub word_id: WordId,
    pub session: SessionId,
    /// [`PhaseController::cycle`] when recording started.
    pub cycle: u64,
}

/// Where a verdict's transcript came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Native,
    Fallback,
    /// The fallback failed or was unusable; the verdict is incorrect.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub correct: bool,
    pub transcript: String,
    pub source: VerdictSource,
}

impl Verdict {
    fn degraded(native: String) -> Self {
        Self {
            correct: false,
            transcript: native,
            source: VerdictSource::Degraded,
        }
    }

    /// The selection recorded for this verdict: option 0 stands for "said it
    /// correctly", no answer for anything else.
    pub fn selection(&self) -> Selection {
        if self.correct {
            Selection::Choice(0)
        } else {
            Selection::NoAnswer
        }
    }
}

/// A verdict delivered by a background fallback task.
#[derive(Debug, Clone)]
pub struct VerdictMessage {
    pub key: VerdictKey,
    pub verdict: Verdict,
}

/// Outcome of stopping a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStage {
    /// A verdict was applied to the phase controller.
    Resolved(Verdict),
    /// The fallback is running; see [`SpokenAnswerVerifier::await_fallback`].
    PendingFallback,
    /// Nothing to do: no current session, already stopped, or stale.
    Ignored,
}

/// State of the current recording.
#[derive(Debug)]
struct RecognitionSession {
    id: SessionId,
    cycle: u64,
    is_recording: bool,
    interim_text: String,
    final_text: String,
    captured_audio: Option<AudioClip>,
}

impl RecognitionSession {
    fn new(cycle: u64) -> Self {
        Self {
            id: SessionId::new(),
            cycle,
            is_recording: true,
            interim_text: String::new(),
            final_text: String::new(),
            captured_audio: None,
        }
    }

    /// Final text if any arrived, otherwise the last interim text.
    fn transcript(&self) -> String {
        let text = if self.final_text.trim().is_empty() {
            &self.interim_text
        } else {
            &self.final_text
        };
        text.trim().to_string()
    }
}

enum Wake {
    Phase(Option<PhaseTransition>),
    Recognition(Option<RecognitionEvent>),
}

/// Records a spoken answer and decides whether it was correct.
pub struct SpokenAnswerVerifier {
    recognizer: Box<dyn SpeechRecognizer>,
    fallback: Arc<dyn TranscriptionFallback>,
    matcher: AnswerMatcher,
    config: VerifierConfig,
    current: Option<SpokenTarget>,
    session: Option<RecognitionSession>,
    events: Option<mpsc::Receiver<RecognitionEvent>>,
    pending: Option<VerdictKey>,
    verdict_tx: mpsc::UnboundedSender<VerdictMessage>,
    verdict_rx: mpsc::UnboundedReceiver<VerdictMessage>,
    recognized_text: String,
    is_correct: Option<bool>,
    last_error: Option<RecognitionError>,
}

impl SpokenAnswerVerifier {
    pub fn new(
        recognizer: Box<dyn SpeechRecognizer>,
        fallback: Arc<dyn TranscriptionFallback>,
    ) -> Self {
        let (verdict_tx, verdict_rx) = mpsc::unbounded_channel();
        Self {
            recognizer,
            fallback,
            matcher: AnswerMatcher::default(),
            config: VerifierConfig::default(),
            current: None,
            session: None,
            events: None,
            pending: None,
            verdict_tx,
            verdict_rx,
            recognized_text: String::new(),
            is_correct: None,
            last_error: None,
        }
    }

    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_matcher(mut self, matcher: AnswerMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Live transcript while recording, then the transcript behind the verdict.
    pub fn recognized_text(&self) -> &str {
        &self.recognized_text
    }

    pub fn is_recording(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_recording)
    }

    /// `None` until a verdict has been applied for the current question.
    pub fn is_correct(&self) -> Option<bool> {
        self.is_correct
    }

    pub fn is_pending_fallback(&self) -> bool {
        self.pending.is_some()
    }

    pub fn current_target(&self) -> Option<&SpokenTarget> {
        self.current.as_ref()
    }

    /// The last reportable recognizer error for the current question.
    pub fn last_error(&self) -> Option<&RecognitionError> {
        self.last_error.as_ref()
    }

    /// Key of the session whose verdicts are currently accepted.
    pub fn current_key(&self) -> Option<VerdictKey> {
        let target = self.current.as_ref()?;
        let session = self.session.as_ref()?;
        Some(VerdictKey {
            word_id: target.word_id.clone(),
            session: session.id,
            cycle: session.cycle,
        })
    }

    /// Start recording an answer for `target`.
    ///
    /// `phase` must be showing the options of a question started with a
    /// delayed options countdown. On success the countdown is armed so that
    /// expiry enters processing. On failure, including a call before the
    /// options are showing, the question is recorded as unanswered and the
    /// error is returned.
    pub async fn start_recording(
        &mut self,
        target: SpokenTarget,
        phase: &mut PhaseController,
    ) -> Result<(), RecognitionError> {
        self.reset_speaking();
        let word_id = target.word_id.clone();
        let hint = target.word.clone();
        self.current = Some(target);

        if phase.phase() != Phase::Options || phase.selected_index().is_some() {
            return Err(self.fail_start(&word_id, RecognitionError::OptionsNotShown, phase));
        }

        match self.open_session(hint).await {
            Ok(events) => {
                if !phase.start_options_countdown(OptionsTimeout::EnterProcessing) {
                    self.recognizer.abort();
                    let error = RecognitionError::OptionsNotShown;
                    return Err(self.fail_start(&word_id, error, phase));
                }
                let session = RecognitionSession::new(phase.cycle());
                tracing::debug!(%word_id, session = %session.id, recognizer = self.recognizer.name(), "recording started");
                self.session = Some(session);
                self.events = Some(events);
                Ok(())
            }
            Err(e) => Err(self.fail_start(&word_id, e, phase)),
        }
    }

    /// Record the question as unanswered after recording could not start.
    fn fail_start(
        &mut self,
        word_id: &WordId,
        error: RecognitionError,
        phase: &mut PhaseController,
    ) -> RecognitionError {
        tracing::warn!(%word_id, "could not start recording: {error}");
        self.last_error = Some(error.clone());
        if !phase.select(Selection::NoAnswer, false) {
            phase.enter_result(Selection::NoAnswer, false);
        }
        error
    }

    async fn open_session(
        &mut self,
        hint: String,
    ) -> Result<mpsc::Receiver<RecognitionEvent>, RecognitionError> {
        if !self.recognizer.is_supported().await {
            return Err(RecognitionError::Unsupported);
        }
        self.recognizer.check_permission().await?;

        let request = RecognitionRequest {
            locale: self.config.locale.clone(),
            hint,
        };
        let limit = self.config.start_timeout();
        match tokio::time::timeout(limit, self.recognizer.start(&request)).await {
            Ok(started) => started,
            Err(_) => {
                self.recognizer.abort();
                Err(RecognitionError::StartTimeout(self.config.start_timeout_ms))
            }
        }
    }

    /// Follow the recording until the options countdown expires or the
    /// recognizer ends, then stop and verify.
    pub async fn await_answer(&mut self, phase: &mut PhaseController) -> VerificationStage {
        if !self.is_recording() {
            return VerificationStage::Ignored;
        }

        loop {
            let wake = match self.events.as_mut() {
                Some(events) => tokio::select! {
                    transition = phase.next_transition() => Wake::Phase(transition),
                    event = events.recv() => Wake::Recognition(event),
                },
                None => Wake::Phase(phase.next_transition().await),
            };

            match wake {
                Wake::Recognition(Some(event)) => {
                    if self.apply_event(event) {
                        return self.handle_stop_recording(phase).await;
                    }
                }
                Wake::Recognition(None) => {
                    self.events = None;
                    return self.handle_stop_recording(phase).await;
                }
                Wake::Phase(Some(PhaseTransition::ProcessingEntered)) => {
                    return self.handle_stop_recording(phase).await;
                }
                Wake::Phase(Some(PhaseTransition::OptionsOpened)) => {}
                Wake::Phase(other) => {
                    tracing::debug!(transition = ?other, phase = ?phase.phase(), "question ended without a spoken answer");
                    self.abandon_recording();
                    return VerificationStage::Ignored;
                }
            }
        }
    }

    /// Stop recording and produce a verdict, or start the fallback when the
    /// recognizer heard nothing. Calling this again for the same session is a
    /// no-op.
    pub async fn handle_stop_recording(
        &mut self,
        phase: &mut PhaseController,
    ) -> VerificationStage {
        let (Some(key), Some(target)) = (self.current_key(), self.current.clone()) else {
            return VerificationStage::Ignored;
        };
        if !self.is_recording() {
            tracing::debug!(word_id = %key.word_id, "stop ignored, not recording");
            return VerificationStage::Ignored;
        }

        phase.enter_processing();
        self.recognizer.stop();
        self.drain_events().await;

        let Some(session) = self.session.as_mut() else {
            return VerificationStage::Ignored;
        };
        session.is_recording = false;
        let native = session.transcript();
        let audio = session.captured_audio.take();

        if !native.is_empty() {
            let correct = self
                .matcher
                .matches(&native, &target.word, &target.accepted_forms);
            let verdict = Verdict {
                correct,
                transcript: native,
                source: VerdictSource::Native,
            };
            return self.resolve(&key, verdict, phase);
        }

        match audio.filter(|clip| !clip.is_empty()) {
            Some(audio) => {
                self.spawn_fallback(key, target, audio, native);
                VerificationStage::PendingFallback
            }
            None => {
                tracing::debug!(word_id = %key.word_id, "no speech and no audio captured");
                self.resolve(&key, Verdict::degraded(native), phase)
            }
        }
    }

    /// Apply a verdict if it belongs to the current session, the phase is
    /// still in the question cycle that session was recorded in and waiting
    /// for an answer, and no verdict has been applied yet. Returns whether it
    /// was applied.
    pub fn apply_verdict(
        &mut self,
        key: &VerdictKey,
        verdict: &Verdict,
        phase: &mut PhaseController,
    ) -> bool {
        // A verdict is delivered at most once per key.
        if self.pending.as_ref() == Some(key) {
            self.pending = None;
        }

        if self.current_key().as_ref() != Some(key) {
            tracing::debug!(word_id = %key.word_id, session = %key.session, "discarding stale verdict");
            return false;
        }
        if self.is_correct.is_some() {
            tracing::debug!(word_id = %key.word_id, "verdict already applied");
            return false;
        }
        let awaiting = matches!(phase.phase(), Phase::Options | Phase::Processing)
            && phase.selected_index().is_none();
        if key.cycle != phase.cycle() || !awaiting {
            tracing::debug!(
                word_id = %key.word_id,
                phase = ?phase.phase(),
                "discarding verdict, the question has moved on"
            );
            return false;
        }

        self.recognized_text = verdict.transcript.clone();
        self.is_correct = Some(verdict.correct);
        phase.enter_result(verdict.selection(), true);
        phase.start_result_timeout();

        tracing::info!(
            word_id = %key.word_id,
            correct = verdict.correct,
            source = ?verdict.source,
            "spoken answer verified"
        );
        true
    }

    /// Wait for the pending fallback verdict and apply it. Stale verdicts that
    /// arrive first are discarded. Returns `None` if nothing is pending.
    pub async fn await_fallback(&mut self, phase: &mut PhaseController) -> Option<Verdict> {
        let limit = self.config.fallback_timeout() + self.config.final_result_grace();

        while let Some(key) = self.pending.clone() {
            match tokio::time::timeout(limit, self.verdict_rx.recv()).await {
                Ok(Some(message)) => {
                    if self.apply_verdict(&message.key, &message.verdict, phase) {
                        return Some(message.verdict);
                    }
                }
                Ok(None) => return None,
                Err(_) => {
                    tracing::warn!(word_id = %key.word_id, "fallback verdict never arrived");
                    let verdict = Verdict::degraded(String::new());
                    return self
                        .apply_verdict(&key, &verdict, phase)
                        .then_some(verdict);
                }
            }
        }
        None
    }

    /// Apply any verdicts already delivered, without waiting. Returns how many
    /// were applied.
    pub fn poll_verdicts(&mut self, phase: &mut PhaseController) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.verdict_rx.try_recv() {
            if self.apply_verdict(&message.key, &message.verdict, phase) {
                applied += 1;
            }
        }
        applied
    }

    /// Abort any recording and forget the current question. Verdicts for it
    /// that arrive later are discarded.
    pub fn reset_speaking(&mut self) {
        if self.is_recording() {
            self.recognizer.abort();
        }
        self.session = None;
        self.events = None;
        self.current = None;
        self.pending = None;
        self.recognized_text.clear();
        self.is_correct = None;
        self.last_error = None;
    }

    /// Abort a recording whose question ended without an answer.
    fn abandon_recording(&mut self) {
        if self.is_recording() {
            self.recognizer.abort();
        }
        if let Some(session) = self.session.as_mut() {
            session.is_recording = false;
        }
        self.events = None;
    }

    /// Returns `true` once the recognizer has ended.
    fn apply_event(&mut self, event: RecognitionEvent) -> bool {
        let Some(session) = self.session.as_mut() else {
            return true;
        };

        match event {
            RecognitionEvent::Interim(text) => {
                session.interim_text = text;
                if session.final_text.is_empty() {
                    self.recognized_text = session.interim_text.clone();
                }
            }
            RecognitionEvent::Final(text) => {
                if !session.final_text.is_empty() {
                    session.final_text.push(' ');
                }
                session.final_text.push_str(text.trim());
                self.recognized_text = session.final_text.clone();
            }
            RecognitionEvent::Audio(clip) => session.captured_audio = Some(clip),
            RecognitionEvent::Error(e) => {
                if e.is_reportable() {
                    tracing::warn!("recognizer error: {e}");
                    self.last_error = Some(e);
                } else {
                    tracing::debug!("recognizer: {e}");
                }
            }
            RecognitionEvent::End => return true,
        }
        false
    }

    /// Collect events the recognizer emits after being asked to stop.
    async fn drain_events(&mut self) {
        let Some(mut events) = self.events.take() else {
            return;
        };
        let grace = self.config.final_result_grace();
        let drain = async {
            while let Some(event) = events.recv().await {
                if self.apply_event(event) {
                    break;
                }
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::debug!("no final result within {}ms", grace.as_millis());
        }
    }

    fn resolve(
        &mut self,
        key: &VerdictKey,
        verdict: Verdict,
        phase: &mut PhaseController,
    ) -> VerificationStage {
        if self.apply_verdict(key, &verdict, phase) {
            VerificationStage::Resolved(verdict)
        } else {
            VerificationStage::Ignored
        }
    }

    fn spawn_fallback(
        &mut self,
        key: VerdictKey,
        target: SpokenTarget,
        audio: AudioClip,
        native: String,
    ) {
        let request = TranscribeRequest {
            audio,
            word_id: key.word_id.clone(),
            native_hint: native,
        };
        let fallback = Arc::clone(&self.fallback);
        let matcher = self.matcher.clone();
        let limit = self.config.fallback_timeout();
        let tx = self.verdict_tx.clone();

        tracing::info!(word_id = %key.word_id, fallback = fallback.name(), "no speech recognised, trying fallback");
        self.pending = Some(key.clone());

        tokio::spawn(async move {
            let verdict = run_fallback(fallback.as_ref(), &request, &target, &matcher, limit).await;
            // The verifier may already be gone.
            let _ = tx.send(VerdictMessage { key, verdict });
        });
    }
}

impl Drop for SpokenAnswerVerifier {
    fn drop(&mut self) {
        if self.is_recording() {
            self.recognizer.abort();
        }
    }
}

async fn run_fallback(
    fallback: &dyn TranscriptionFallback,
    request: &TranscribeRequest,
    target: &SpokenTarget,
    matcher: &AnswerMatcher,
    limit: Duration,
) -> Verdict {
    let degraded = || Verdict::degraded(request.native_hint.clone());

    match tokio::time::timeout(limit, fallback.transcribe(request)).await {
        Ok(Ok(transcript)) if !transcript.text.trim().is_empty() => {
            let correct = matcher.matches(&transcript.text, &target.word, &target.accepted_forms);
            Verdict {
                correct,
                transcript: transcript.text.trim().to_string(),
                source: VerdictSource::Fallback,
            }
        }
        Ok(Ok(_)) => {
            tracing::debug!(word_id = %request.word_id, "fallback returned an empty transcript");
            degraded()
        }
        Ok(Err(e)) => {
            tracing::debug!(word_id = %request.word_id, "fallback failed: {e}");
            degraded()
        }
        Err(_) => {
            tracing::debug!(word_id = %request.word_id, "fallback timed out after {}ms", limit.as_millis());
            degraded()
        }
    }
}
