//! Per-question timing state machine.
//!
//! `idle → question → options → [processing] → result → (reset) → idle`
//!
//! At most one countdown is active at a time; arming a new one replaces the
//! old. Remaining time is always derived from the countdown's deadline, never
//! from counting ticks, so scheduling jitter does not accumulate.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::model::Selection;

/// Phase of the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Question,
    Options,
    Processing,
    Result,
}

/// Countdown durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTimings {
    /// How long the prompt is shown before the options appear.
    pub question_ms: u64,
    /// How long the learner has to answer.
    pub options_ms: u64,
    /// How long the result is shown before auto-advancing.
    pub result_ms: u64,
    /// Refresh interval for `remaining_ms` while waiting.
    pub tick_ms: u64,
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self {
            question_ms: 1000,
            options_ms: 4000,
            result_ms: 1500,
            tick_ms: 50,
        }
    }
}

impl PhaseTimings {
    pub fn question(&self) -> Duration {
        Duration::from_millis(self.question_ms)
    }

    pub fn options(&self) -> Duration {
        Duration::from_millis(self.options_ms)
    }

    pub fn result(&self) -> Duration {
        Duration::from_millis(self.result_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// What happens when the options countdown runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionsTimeout {
    /// Record `Selection::NoAnswer` and show the result.
    #[default]
    SelectNone,
    /// Move to `processing`; an asynchronous verdict will finish the question.
    EnterProcessing,
}

/// A transition fired by a countdown expiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTransition {
    OptionsOpened,
    TimedOut,
    ProcessingEntered,
    ResultElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownKind {
    Question,
    Options(OptionsTimeout),
    Result,
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    kind: CountdownKind,
    deadline: Instant,
}

/// Observable state of one question cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseState {
    pub phase: Phase,
    pub remaining_ms: u64,
    /// Write-once per question cycle.
    pub selected_index: Option<Selection>,
    pub response_time_ms: Option<u64>,
}

impl PhaseState {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            remaining_ms: 0,
            selected_index: None,
            response_time_ms: None,
        }
    }
}

/// Drives the timed lifecycle of a single question.
pub struct PhaseController {
    timings: PhaseTimings,
    state: PhaseState,
    countdown: Option<Countdown>,
    delay_options_countdown: bool,
    options_started_at: Option<Instant>,
    cycle: u64,
}

impl PhaseController {
    pub fn new(timings: PhaseTimings) -> Self {
        Self {
            timings,
            state: PhaseState::idle(),
            countdown: None,
            delay_options_countdown: false,
            options_started_at: None,
            cycle: 0,
        }
    }

    pub fn timings(&self) -> &PhaseTimings {
        &self.timings
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn remaining_ms(&self) -> u64 {
        self.state.remaining_ms
    }

    pub fn selected_index(&self) -> Option<Selection> {
        self.state.selected_index
    }

    /// The response time captured for this question, if any.
    pub fn response_time_ms(&self) -> Option<u64> {
        self.state.response_time_ms
    }

    pub fn snapshot(&self) -> PhaseState {
        self.state.clone()
    }

    pub fn has_active_countdown(&self) -> bool {
        self.countdown.is_some()
    }

    /// Identifies the current question cycle. Changes on every `start` and
    /// `reset`.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Begin a new question cycle.
    ///
    /// With `delay_options_countdown`, the options phase opens without a
    /// countdown and the caller must arm one via
    /// [`start_options_countdown`](Self::start_options_countdown).
    pub fn start(&mut self, delay_options_countdown: bool) {
        self.countdown = None;
        self.cycle = self.cycle.wrapping_add(1);
        self.state = PhaseState::idle();
        self.state.phase = Phase::Question;
        self.options_started_at = None;
        self.delay_options_countdown = delay_options_countdown;
        self.arm(CountdownKind::Question, self.timings.question());
        tracing::debug!(delay_options_countdown, "question started");
    }

    /// Arm the options countdown. Only valid while the options are shown and
    /// nothing has been selected. Response time is measured from here.
    pub fn start_options_countdown(&mut self, on_timeout: OptionsTimeout) -> bool {
        if self.state.phase != Phase::Options || self.state.selected_index.is_some() {
            return false;
        }
        self.options_started_at = Some(Instant::now());
        self.arm(CountdownKind::Options(on_timeout), self.timings.options());
        true
    }

    /// Record the learner's choice. Ignored outside the options phase or once
    /// a selection exists.
    pub fn select(&mut self, selection: Selection, skip_auto_advance: bool) -> bool {
        if self.state.phase != Phase::Options || self.state.selected_index.is_some() {
            tracing::debug!(?selection, phase = ?self.state.phase, "selection ignored");
            return false;
        }
        self.finish(selection, skip_auto_advance);
        true
    }

    /// Stop the clock while an asynchronous verification step runs.
    pub fn enter_processing(&mut self) -> bool {
        if self.state.phase != Phase::Options {
            return false;
        }
        self.countdown = None;
        self.capture_response_time();
        self.state.phase = Phase::Processing;
        tracing::debug!(response_time_ms = ?self.state.response_time_ms, "processing answer");
        true
    }

    /// Show the result for `selection` from any non-idle phase.
    pub fn enter_result(&mut self, selection: Selection, skip_auto_advance: bool) -> bool {
        if self.state.phase == Phase::Idle || self.state.selected_index.is_some() {
            return false;
        }
        self.finish(selection, skip_auto_advance);
        true
    }

    /// Arm the auto-advance countdown for a result entered without one.
    pub fn start_result_timeout(&mut self) -> bool {
        if self.state.phase != Phase::Result || self.countdown.is_some() {
            return false;
        }
        self.arm(CountdownKind::Result, self.timings.result());
        true
    }

    /// Cancel the active countdown, leaving the phase unchanged.
    ///
    /// Unlike [`reset`](Self::reset) this does not return to idle: the
    /// question stays where it is and nothing fires until the caller selects,
    /// enters a result, or arms a new countdown.
    pub fn clear_timer(&mut self) {
        self.countdown = None;
    }

    /// Cancel everything and return to idle.
    pub fn reset(&mut self) {
        self.clear_timer();
        self.cycle = self.cycle.wrapping_add(1);
        self.state = PhaseState::idle();
        self.options_started_at = None;
        self.delay_options_countdown = false;
    }

    /// Refresh `remaining_ms` and fire the countdown if its deadline passed.
    pub fn tick(&mut self) -> Option<PhaseTransition> {
        let countdown = self.countdown?;
        let now = Instant::now();
        let remaining = countdown.deadline.saturating_duration_since(now).as_millis() as u64;
        self.state.remaining_ms = remaining.min(self.state.remaining_ms);

        if now < countdown.deadline {
            return None;
        }
        self.countdown = None;

        let transition = match countdown.kind {
            CountdownKind::Question => {
                self.state.phase = Phase::Options;
                if !self.delay_options_countdown {
                    self.start_options_countdown(OptionsTimeout::SelectNone);
                }
                PhaseTransition::OptionsOpened
            }
            CountdownKind::Options(OptionsTimeout::SelectNone) => {
                self.finish(Selection::NoAnswer, false);
                PhaseTransition::TimedOut
            }
            CountdownKind::Options(OptionsTimeout::EnterProcessing) => {
                self.enter_processing();
                PhaseTransition::ProcessingEntered
            }
            CountdownKind::Result => PhaseTransition::ResultElapsed,
        };
        tracing::debug!(?transition, phase = ?self.state.phase, "countdown fired");
        Some(transition)
    }

    /// Wait for the active countdown to fire, refreshing `remaining_ms`
    /// every tick. Returns `None` if no countdown is active.
    pub async fn next_transition(&mut self) -> Option<PhaseTransition> {
        loop {
            let deadline = self.countdown?.deadline;
            let refresh = Instant::now() + self.timings.tick();
            tokio::time::sleep_until(deadline.min(refresh)).await;
            if let Some(transition) = self.tick() {
                return Some(transition);
            }
        }
    }

    fn arm(&mut self, kind: CountdownKind, duration: Duration) {
        self.countdown = Some(Countdown {
            kind,
            deadline: Instant::now() + duration,
        });
        self.state.remaining_ms = duration.as_millis() as u64;
    }

    fn finish(&mut self, selection: Selection, skip_auto_advance: bool) {
        self.countdown = None;
        self.capture_response_time();
        self.state.selected_index = Some(selection);
        self.state.phase = Phase::Result;
        if !skip_auto_advance {
            self.arm(CountdownKind::Result, self.timings.result());
        }
    }

    fn capture_response_time(&mut self) {
        if self.state.response_time_ms.is_some() {
            return;
        }
        if let Some(started) = self.options_started_at {
            self.state.response_time_ms = Some(started.elapsed().as_millis() as u64);
        }
    }
}

impl Default for PhaseController {
    fn default() -> Self {
        Self::new(PhaseTimings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    async fn advance_ms(ms: u64) {
        advance(Duration::from_millis(ms)).await;
    }

    /// A controller already showing its options with the default countdown.
    async fn options_open(delay: bool) -> PhaseController {
        let mut phase = PhaseController::default();
        phase.start(delay);
        advance_ms(1000).await;
        assert_eq!(phase.tick(), Some(PhaseTransition::OptionsOpened));
        phase
    }

    #[tokio::test(start_paused = true)]
    async fn question_countdown_opens_options() {
        let mut phase = PhaseController::default();
        assert_eq!(phase.phase(), Phase::Idle);

        phase.start(false);
        assert_eq!(phase.phase(), Phase::Question);
        assert_eq!(phase.remaining_ms(), 1000);

        advance_ms(400).await;
        assert_eq!(phase.tick(), None);
        assert_eq!(phase.remaining_ms(), 600);

        advance_ms(600).await;
        assert_eq!(phase.tick(), Some(PhaseTransition::OptionsOpened));
        assert_eq!(phase.phase(), Phase::Options);
        assert_eq!(phase.remaining_ms(), 4000);
        assert!(phase.has_active_countdown());
    }

    #[tokio::test(start_paused = true)]
    async fn options_timeout_selects_no_answer() {
        let mut phase = options_open(false).await;
        advance_ms(4000).await;
        assert_eq!(phase.tick(), Some(PhaseTransition::TimedOut));

        assert_eq!(phase.phase(), Phase::Result);
        assert_eq!(phase.selected_index(), Some(Selection::NoAnswer));
        assert_eq!(phase.selected_index().map(Selection::index), Some(-1));
        assert_eq!(phase.response_time_ms(), Some(4000));
        assert_eq!(phase.remaining_ms(), 1500);

        advance_ms(1500).await;
        assert_eq!(phase.tick(), Some(PhaseTransition::ResultElapsed));
        assert_eq!(phase.phase(), Phase::Result);
        assert!(!phase.has_active_countdown());
    }

    #[tokio::test(start_paused = true)]
    async fn selection_is_write_once() {
        let mut phase = options_open(false).await;
        advance_ms(1200).await;

        assert!(phase.select(Selection::Choice(2), false));
        assert!(!phase.select(Selection::Choice(1), false));
        assert!(!phase.enter_result(Selection::Choice(3), false));

        assert_eq!(phase.selected_index(), Some(Selection::Choice(2)));
        assert_eq!(phase.response_time_ms(), Some(1200));
        assert_eq!(phase.phase(), Phase::Result);
    }

    #[tokio::test(start_paused = true)]
    async fn select_outside_options_is_ignored() {
        let mut phase = PhaseController::default();
        assert!(!phase.select(Selection::Choice(0), false));
        phase.start(false);
        assert!(!phase.select(Selection::Choice(0), false));
        assert_eq!(phase.selected_index(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn select_can_suppress_auto_advance() {
        let mut phase = options_open(false).await;
        assert!(phase.select(Selection::Choice(0), true));
        assert!(!phase.has_active_countdown());
        assert!(phase.start_result_timeout());
        assert!(!phase.start_result_timeout(), "already running");
        assert_eq!(phase.remaining_ms(), 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_options_wait_for_explicit_countdown() {
        let mut phase = options_open(true).await;
        assert_eq!(phase.phase(), Phase::Options);
        assert!(!phase.has_active_countdown());
        assert_eq!(phase.remaining_ms(), 0);
        assert_eq!(phase.next_transition().await, None);

        // Arming the microphone took a while; response time starts now.
        advance_ms(700).await;
        assert!(phase.start_options_countdown(OptionsTimeout::EnterProcessing));
        assert_eq!(phase.remaining_ms(), 4000);

        advance_ms(4000).await;
        assert_eq!(phase.tick(), Some(PhaseTransition::ProcessingEntered));
        assert_eq!(phase.phase(), Phase::Processing);
        assert_eq!(phase.response_time_ms(), Some(4000));
        assert_eq!(phase.selected_index(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn processing_captures_response_time_once() {
        let mut phase = options_open(false).await;
        advance_ms(1000).await;
        assert!(phase.enter_processing());
        assert!(!phase.enter_processing());
        assert_eq!(phase.response_time_ms(), Some(1000));
        assert!(!phase.has_active_countdown());

        advance_ms(2500).await;
        assert!(phase.enter_result(Selection::Choice(0), true));
        assert_eq!(phase.response_time_ms(), Some(1000));
        assert_eq!(phase.phase(), Phase::Result);
        assert!(!phase.has_active_countdown());

        assert!(phase.start_result_timeout());
        assert_eq!(phase.next_transition().await, Some(PhaseTransition::ResultElapsed));
    }

    #[tokio::test(start_paused = true)]
    async fn enter_processing_requires_options() {
        let mut phase = PhaseController::default();
        phase.start(false);
        assert!(!phase.enter_processing());
        assert_eq!(phase.phase(), Phase::Question);
    }

    #[tokio::test(start_paused = true)]
    async fn enter_result_requires_non_idle() {
        let mut phase = PhaseController::default();
        assert!(!phase.enter_result(Selection::Choice(1), false));
        assert_eq!(phase.phase(), Phase::Idle);

        phase.start(false);
        assert!(phase.enter_result(Selection::NoAnswer, false));
        assert_eq!(phase.phase(), Phase::Result);
        // No options were shown, so there is no response time.
        assert_eq!(phase.response_time_ms(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_time_never_increases_within_a_countdown() {
        let mut phase = options_open(false).await;
        let mut last = phase.remaining_ms();
        for _ in 0..79 {
            advance_ms(50).await;
            assert_eq!(phase.tick(), None);
            let remaining = phase.remaining_ms();
            assert!(remaining <= last);
            last = remaining;
        }
        assert_eq!(last, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn next_transition_walks_full_lifecycle() {
        let mut phase = PhaseController::default();
        phase.start(false);
        let started = Instant::now();

        assert_eq!(phase.next_transition().await, Some(PhaseTransition::OptionsOpened));
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        assert_eq!(phase.next_transition().await, Some(PhaseTransition::TimedOut));
        assert_eq!(started.elapsed(), Duration::from_millis(5000));
        assert_eq!(phase.next_transition().await, Some(PhaseTransition::ResultElapsed));
        assert_eq!(started.elapsed(), Duration::from_millis(6500));
        assert_eq!(phase.next_transition().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_the_active_countdown() {
        let mut phase = options_open(false).await;
        advance_ms(3000).await;
        phase.start(false);
        assert_eq!(phase.phase(), Phase::Question);
        assert_eq!(phase.selected_index(), None);
        advance_ms(1000).await;
        // The old options deadline would have fired here; only the new
        // question countdown does.
        assert_eq!(phase.tick(), Some(PhaseTransition::OptionsOpened));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_timer_keeps_phase_and_reset_goes_idle() {
        let mut phase = options_open(false).await;
        phase.clear_timer();
        assert_eq!(phase.phase(), Phase::Options);
        advance_ms(10_000).await;
        assert_eq!(phase.tick(), None);

        phase.select(Selection::Choice(1), false);
        phase.reset();
        let state = phase.snapshot();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.selected_index, None);
        assert_eq!(state.response_time_ms, None);
        assert!(!phase.has_active_countdown());
    }

    #[tokio::test(start_paused = true)]
    async fn every_start_and_reset_begins_a_new_cycle() {
        let mut phase = PhaseController::default();
        let idle = phase.cycle();

        phase.start(false);
        let first = phase.cycle();
        assert_ne!(first, idle);

        advance_ms(1000).await;
        phase.tick();
        phase.clear_timer();
        assert_eq!(phase.cycle(), first);

        phase.reset();
        let after_reset = phase.cycle();
        assert_ne!(after_reset, first);

        phase.start(true);
        assert_ne!(phase.cycle(), after_reset);
    }
}
