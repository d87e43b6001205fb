//! lexiprobe-core: Placement, question timing, and spoken-answer verification.
//!
//! This crate holds the quiz-side logic of lexiprobe: the adaptive
//! [`placement::PlacementEngine`] that estimates a learner's level, the
//! [`phase::PhaseController`] that times each question, and the
//! [`verifier::SpokenAnswerVerifier`] that checks answers given aloud.
//! Speech recognition and network transcription are reached only through
//! the traits in [`traits`].

pub mod error;
pub mod matching;
pub mod model;
pub mod parser;
pub mod phase;
pub mod placement;
pub mod traits;
pub mod verifier;
