//! Adaptive placement engine.
//!
//! Estimates a learner's level in 1..=8 from a bootstrap self-assessment
//! followed by at most ten adaptive questions: three coarse routing questions
//! that binary-search `[lower_bound, upper_bound]`, then targeted probes around
//! a pivot level until one of the early-exit rules fires.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::PlacementError;
use crate::model::{Confidence, Level, Question, QuestionBank, WordId};

/// Maximum number of adaptive questions in one session.
pub const MAX_QUESTIONS: u32 = 10;

/// Number of routing answers before the targeted phase begins.
pub const ROUTING_QUESTIONS: u32 = 3;

/// Offsets scanned around a target level, in order.
const NEIGHBOUR_OFFSETS: [i32; 5] = [0, -1, 1, -2, 2];

/// Phase of an ability estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatePhase {
    Q0,
    Routing,
    Targeted,
    Result,
}

impl EstimatePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            EstimatePhase::Q0 => "q0",
            EstimatePhase::Routing => "routing",
            EstimatePhase::Targeted => "targeted",
            EstimatePhase::Result => "result",
        }
    }
}

/// One answered adaptive question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub level: Level,
    pub correct: bool,
}

/// Snapshot of the engine's estimator state.
///
/// Obtained through [`PlacementEngine::state`]; always a copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub phase: EstimatePhase,
    pub lower_bound: Level,
    pub upper_bound: Level,
    /// Level under refinement during the targeted phase.
    pub pivot: Level,
    /// Adaptive questions answered, excluding the bootstrap question.
    pub question_count: u32,
    /// Answers in the order they were given.
    pub history: Vec<AnswerRecord>,
    pub pivot_asked: u32,
    pub pivot_correct: u32,
    pub up_asked: u32,
    pub up_correct: u32,
    pub down_asked: u32,
    pub down_correct: u32,
    pub final_level: Option<Level>,
    pub confidence: Option<Confidence>,
    pub used_word_ids: BTreeSet<WordId>,
}

impl AbilityEstimate {
    fn new() -> Self {
        Self {
            phase: EstimatePhase::Q0,
            lower_bound: Level::MIN,
            upper_bound: Level::MAX,
            pivot: Level::MIN,
            question_count: 0,
            history: Vec::new(),
            pivot_asked: 0,
            pivot_correct: 0,
            up_asked: 0,
            up_correct: 0,
            down_asked: 0,
            down_correct: 0,
            final_level: None,
            confidence: None,
            used_word_ids: BTreeSet::new(),
        }
    }

    /// Answers given after routing, in order (T1, T2, T3, ...).
    pub fn targeted_history(&self) -> &[AnswerRecord] {
        let start = (ROUTING_QUESTIONS as usize).min(self.history.len());
        match self.phase {
            EstimatePhase::Targeted | EstimatePhase::Result => &self.history[start..],
            _ => &[],
        }
    }

    pub fn up_level(&self) -> Level {
        self.pivot.up()
    }

    pub fn down_level(&self) -> Level {
        self.pivot.down()
    }

    fn routing_target(&self) -> Level {
        let sum = self.lower_bound.get() as i32 + self.upper_bound.get() as i32;
        Level::clamped((sum + 1) / 2)
    }
}

/// Result of the bootstrap self-assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Q0Outcome {
    pub finished: bool,
    #[serde(default)]
    pub level: Option<Level>,
}

/// The finished placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementOutcome {
    pub level: Level,
    pub confidence: Confidence,
    pub questions_asked: u32,
}

/// Adaptive placement over a fixed question bank.
pub struct PlacementEngine {
    bank: QuestionBank,
    state: AbilityEstimate,
    rng: StdRng,
}

impl PlacementEngine {
    pub fn new(bank: impl Into<QuestionBank>) -> Self {
        Self::with_rng(bank.into(), StdRng::from_os_rng())
    }

    /// Create an engine whose question choice is reproducible.
    pub fn with_seed(bank: impl Into<QuestionBank>, seed: u64) -> Self {
        Self::with_rng(bank.into(), StdRng::seed_from_u64(seed))
    }

    fn with_rng(bank: QuestionBank, rng: StdRng) -> Self {
        Self {
            bank,
            state: AbilityEstimate::new(),
            rng,
        }
    }

    /// A copy of the current estimator state.
    pub fn state(&self) -> AbilityEstimate {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state.phase == EstimatePhase::Result
    }

    /// The final placement, once a level has been set.
    pub fn outcome(&self) -> Option<PlacementOutcome> {
        Some(PlacementOutcome {
            level: self.state.final_level?,
            confidence: self.state.confidence?,
            questions_asked: self.state.question_count,
        })
    }

    /// Apply the bootstrap self-assessment answer (1..=4).
    ///
    /// Selection 1 places the learner at level 1 immediately. Selections 2, 3
    /// and 4 seed routing around levels 2, 4 and 7.
    pub fn handle_q0(&mut self, selection: u8) -> Result<Q0Outcome, PlacementError> {
        self.expect_phase("handle_q0", &[EstimatePhase::Q0])?;

        let seed = match selection {
            1 => {
                self.finalize(Level::MIN, Confidence::High);
                return Ok(Q0Outcome {
                    finished: true,
                    level: Some(Level::MIN),
                });
            }
            2 => 2,
            3 => 4,
            4 => 7,
            other => return Err(PlacementError::InvalidSelection(other)),
        };

        let state = &mut self.state;
        state.lower_bound = Level::clamped(seed - 3);
        state.upper_bound = Level::clamped(seed + 3);
        state.pivot = Level::clamped(seed);
        state.phase = EstimatePhase::Routing;
        tracing::debug!(
            selection,
            lower = %state.lower_bound,
            upper = %state.upper_bound,
            "placement routing started"
        );

        Ok(Q0Outcome {
            finished: false,
            level: None,
        })
    }

    /// Choose the next unused question, or `None` when the session cannot
    /// continue (finished, not started, or the bank is exhausted around the
    /// target level).
    pub fn next_question(&mut self) -> Option<Question> {
        let target = match self.state.phase {
            EstimatePhase::Routing => self.state.routing_target(),
            EstimatePhase::Targeted => self.targeted_target(),
            EstimatePhase::Q0 | EstimatePhase::Result => return None,
        };

        let question = self.pick_near(target);
        if question.is_none() {
            tracing::warn!(target = %target, "question bank exhausted around target level");
        }
        question
    }

    /// Record an answer to an adaptive question. Returns `true` once the
    /// session has produced a final level.
    pub fn handle_answer(&mut self, level: Level, correct: bool) -> Result<bool, PlacementError> {
        self.expect_phase(
            "handle_answer",
            &[EstimatePhase::Routing, EstimatePhase::Targeted],
        )?;

        self.state.history.push(AnswerRecord { level, correct });
        self.state.question_count += 1;

        if self.state.phase == EstimatePhase::Routing {
            self.apply_routing_answer(level, correct);
            return Ok(false);
        }

        self.apply_targeted_answer(level, correct);
        if let Some((final_level, confidence)) = self.evaluate_exit() {
            self.finalize(final_level, confidence);
        }
        Ok(self.is_finished())
    }

    /// Finalize a session that cannot continue because `next_question`
    /// returned `None`. Confidence is always low.
    pub fn force_finish(&mut self) -> Result<PlacementOutcome, PlacementError> {
        let level = match self.state.phase {
            EstimatePhase::Routing => self.state.routing_target(),
            EstimatePhase::Targeted => self.state.pivot,
            EstimatePhase::Result => {
                return self.outcome().ok_or(PlacementError::InvalidPhase {
                    operation: "force_finish",
                    phase: EstimatePhase::Result.as_str(),
                })
            }
            EstimatePhase::Q0 => {
                return Err(PlacementError::InvalidPhase {
                    operation: "force_finish",
                    phase: EstimatePhase::Q0.as_str(),
                })
            }
        };

        self.finalize(level, Confidence::Low);
        self.outcome().ok_or(PlacementError::InvalidPhase {
            operation: "force_finish",
            phase: self.state.phase.as_str(),
        })
    }

    fn expect_phase(
        &self,
        operation: &'static str,
        allowed: &[EstimatePhase],
    ) -> Result<(), PlacementError> {
        if allowed.contains(&self.state.phase) {
            Ok(())
        } else {
            Err(PlacementError::InvalidPhase {
                operation,
                phase: self.state.phase.as_str(),
            })
        }
    }

    fn apply_routing_answer(&mut self, level: Level, correct: bool) {
        let state = &mut self.state;
        if correct {
            state.lower_bound = level.max(state.lower_bound).min(state.upper_bound);
        } else {
            let lowered = Level::clamped(level.get() as i32 - 1);
            state.upper_bound = lowered.min(state.upper_bound).max(state.lower_bound);
        }

        tracing::debug!(
            level = %level,
            correct,
            lower = %state.lower_bound,
            upper = %state.upper_bound,
            "routing answer"
        );

        if state.question_count >= ROUTING_QUESTIONS {
            state.pivot = state.lower_bound;
            state.phase = EstimatePhase::Targeted;
            tracing::debug!(pivot = %state.pivot, "placement targeting started");
        }
    }

    fn apply_targeted_answer(&mut self, level: Level, correct: bool) {
        let state = &mut self.state;
        let hit = u32::from(correct);
        if level == state.pivot {
            state.pivot_asked += 1;
            state.pivot_correct += hit;
        } else if level == state.up_level() {
            state.up_asked += 1;
            state.up_correct += hit;
        } else if level == state.down_level() {
            state.down_asked += 1;
            state.down_correct += hit;
        }

        tracing::debug!(
            level = %level,
            correct,
            pivot = %state.pivot,
            pivot_correct = state.pivot_correct,
            up_correct = state.up_correct,
            down_correct = state.down_correct,
            "targeted answer"
        );
    }

    /// Target level for the next targeted probe.
    fn targeted_target(&self) -> Level {
        let state = &self.state;
        let targeted = state.targeted_history();
        let (pivot, up, down) = (state.pivot, state.up_level(), state.down_level());

        match targeted {
            [] => pivot,
            [t1] if t1.correct => up,
            [_] => down,
            [t1, _] if t1.correct => up,
            [_, t2] if t2.correct => pivot,
            // T1 and T2 both failed; the fail-fail rule has already ended the session.
            [_, _] => pivot,
            _ if self.reinforcement_pending() => up,
            _ => pivot,
        }
    }

    /// Whether the single extra up-level probe after T3 is still owed.
    fn reinforcement_pending(&self) -> bool {
        let state = &self.state;
        let up = state.up_level();
        let already_probed = state
            .targeted_history()
            .iter()
            .skip(3)
            .any(|record| record.level == up);

        state.up_correct >= 2
            && state.pivot_correct >= 1
            && up != state.pivot
            && state.up_correct < 3
            && !already_probed
    }

    /// Early-exit rules in precedence order. The first match wins.
    fn evaluate_exit(&self) -> Option<(Level, Confidence)> {
        let state = &self.state;
        let targeted = state.targeted_history();
        let (pivot, up, down) = (state.pivot, state.up_level(), state.down_level());

        // Fail-fail.
        if state.pivot_asked == 1
            && state.pivot_correct == 0
            && matches!(targeted, [t1, t2] if !t1.correct && !t2.correct)
        {
            return Some((down, Confidence::High));
        }

        // Fail-pass-fail.
        if matches!(targeted, [t1, t2, t3] if !t1.correct && t2.correct && !t3.correct) {
            return Some((down, Confidence::Medium));
        }

        // Upgrade.
        if state.up_correct >= 2 && state.pivot_correct >= 1 {
            if state.question_count < MAX_QUESTIONS && self.reinforcement_pending() {
                return None;
            }
            let confidence = if state.up_correct == 3 {
                Confidence::High
            } else {
                Confidence::Medium
            };
            return Some((up, confidence));
        }

        // Downgrade.
        if state.pivot_asked >= 2 && state.pivot_correct == 0 {
            return Some((down, Confidence::Medium));
        }

        if state.question_count >= MAX_QUESTIONS {
            return Some((pivot, self.max_questions_confidence()));
        }

        None
    }

    fn max_questions_confidence(&self) -> Confidence {
        let state = &self.state;
        let (pc, uc, dc) = (state.pivot_correct, state.up_correct, state.down_correct);

        if pc == 2 && dc >= 1 && uc <= 1 {
            Confidence::High
        } else if (uc >= 2 && pc == 0) || (dc == 0 && pc == 0) {
            Confidence::Low
        } else if pc >= 1 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Pick a random unused question at the target level, widening to
    /// neighbouring levels in the order target, -1, +1, -2, +2.
    fn pick_near(&mut self, target: Level) -> Option<Question> {
        for offset in NEIGHBOUR_OFFSETS {
            let Some(level) = u8::try_from(target.get() as i32 + offset)
                .ok()
                .and_then(Level::new)
            else {
                continue;
            };

            let candidates: Vec<&Question> = self
                .bank
                .at(level)
                .iter()
                .filter(|q| !self.state.used_word_ids.contains(&q.word_id))
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let question = candidates[self.rng.random_range(0..candidates.len())].clone();
            self.state.used_word_ids.insert(question.word_id.clone());
            return Some(question);
        }
        None
    }

    fn finalize(&mut self, level: Level, confidence: Confidence) {
        let state = &mut self.state;
        if state.final_level.is_some() {
            return;
        }
        state.final_level = Some(level);
        state.confidence = Some(confidence);
        state.phase = EstimatePhase::Result;
        tracing::info!(
            level = %level,
            confidence = %confidence,
            questions = state.question_count,
            "placement finished"
        );
    }
}
