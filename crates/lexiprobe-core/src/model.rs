//! Core data model types for lexiprobe.
//!
//! These are the fundamental types shared by the placement engine, the phase
//! controller, and the spoken-answer verifier.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlacementError;

/// A difficulty level in 1..=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const MIN: Level = Level(1);
    pub const MAX: Level = Level(8);

    /// Create a level, returning `None` outside 1..=8.
    pub const fn new(value: u8) -> Option<Level> {
        if value >= Self::MIN.0 && value <= Self::MAX.0 {
            Some(Level(value))
        } else {
            None
        }
    }

    /// Create a level, clamping into 1..=8.
    pub fn clamped(value: i32) -> Level {
        Level(value.clamp(Self::MIN.0 as i32, Self::MAX.0 as i32) as u8)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// The next level up, saturating at 8.
    pub fn up(self) -> Level {
        Level(self.0.saturating_add(1).min(Self::MAX.0))
    }

    /// The next level down, saturating at 1.
    pub fn down(self) -> Level {
        Level(self.0.saturating_sub(1).max(Self::MIN.0))
    }

    /// Iterate every level from 1 to 8.
    pub fn all() -> impl Iterator<Item = Level> {
        (Self::MIN.0..=Self::MAX.0).map(Level)
    }
}

impl TryFrom<u8> for Level {
    type Error = PlacementError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Level::new(value).ok_or(PlacementError::InvalidLevel(value))
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        level.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a vocabulary item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordId(pub String);

impl WordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single multiple-choice vocabulary question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Identifier of the vocabulary item this question tests.
    pub word_id: WordId,
    /// Difficulty level.
    pub level: Level,
    /// The prompt word. Also the target for spoken-answer questions.
    #[serde(default)]
    pub word: String,
    /// Exactly four answer options.
    pub options: [String; 4],
    /// Index of the correct option in `options`.
    pub correct_index: usize,
}

impl Question {
    /// Whether the given selection picks the correct option.
    pub fn is_correct(&self, selection: Selection) -> bool {
        selection.choice() == Some(self.correct_index)
    }
}

/// A named pool of questions as loaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPool {
    /// Unique identifier for this pool.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description of this pool.
    #[serde(default)]
    pub description: String,
    /// The questions in this pool.
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Questions indexed by level, preserving pool order within each level.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    by_level: BTreeMap<Level, Vec<Question>>,
}

impl QuestionBank {
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Self {
        let mut by_level: BTreeMap<Level, Vec<Question>> = BTreeMap::new();
        for question in questions {
            by_level.entry(question.level).or_default().push(question);
        }
        Self { by_level }
    }

    /// Questions at the given level, in pool order.
    pub fn at(&self, level: Level) -> &[Question] {
        self.by_level.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_level.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_level.values().all(Vec::is_empty)
    }

    /// Number of questions for every level 1..=8, including empty ones.
    pub fn level_counts(&self) -> Vec<(Level, usize)> {
        Level::all().map(|l| (l, self.at(l).len())).collect()
    }
}

impl From<QuestionPool> for QuestionBank {
    fn from(pool: QuestionPool) -> Self {
        QuestionBank::new(pool.questions)
    }
}

impl From<Vec<Question>> for QuestionBank {
    fn from(questions: Vec<Question>) -> Self {
        QuestionBank::new(questions)
    }
}

/// The answer recorded for one question cycle.
///
/// Converts to the wire integer used by callers: the option index, or `-1`
/// for no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Selection {
    Choice(usize),
    NoAnswer,
}

impl Selection {
    pub const NO_ANSWER_INDEX: i32 = -1;

    pub fn choice(self) -> Option<usize> {
        match self {
            Selection::Choice(i) => Some(i),
            Selection::NoAnswer => None,
        }
    }

    pub fn index(self) -> i32 {
        i32::from(self)
    }
}

impl From<i32> for Selection {
    fn from(index: i32) -> Self {
        usize::try_from(index)
            .map(Selection::Choice)
            .unwrap_or(Selection::NoAnswer)
    }
}

impl From<Selection> for i32 {
    fn from(selection: Selection) -> i32 {
        match selection {
            Selection::Choice(i) => i32::try_from(i).unwrap_or(i32::MAX),
            Selection::NoAnswer => Selection::NO_ANSWER_INDEX,
        }
    }
}

/// How sure the placement engine is about its final level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Confidence::High),
            "medium" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            other => Err(format!("unknown confidence: {other}")),
        }
    }
}
