//! End-to-end flows through the verifier, phase controller and mocks.

use std::sync::Arc;
use std::time::Duration;

use lexiprobe_core::model::{Level, Question, Selection, WordId};
use lexiprobe_core::phase::{Phase, PhaseController, PhaseTransition};
use lexiprobe_core::placement::PlacementEngine;
use lexiprobe_core::traits::{AudioClip, RecognitionEvent};
use lexiprobe_core::verifier::{
    SpokenAnswerVerifier, SpokenTarget, VerdictSource, VerificationStage,
};
use lexiprobe_speech::mock::{MockRecognizer, MockTranscriber};
use lexiprobe_speech::{build_verifier, LexiprobeConfig};

fn clip() -> AudioClip {
    AudioClip::new("audio/wav", b"RIFF....WAVEfmt ".to_vec())
}

fn target(word: &str) -> SpokenTarget {
    SpokenTarget::new(WordId::new(format!("w-{word}")), word)
}

/// Start a question with a delayed options countdown and wait for the options.
async fn open_options(phase: &mut PhaseController) {
    phase.reset();
    phase.start(true);
    assert_eq!(
        phase.next_transition().await,
        Some(PhaseTransition::OptionsOpened)
    );
}

#[tokio::test(start_paused = true)]
async fn silent_answer_is_rescued_by_fallback() {
    let recognizer =
        MockRecognizer::new().with_session(vec![RecognitionEvent::Audio(clip())]);
    let stats = recognizer.stats();
    let transcriber =
        Arc::new(MockTranscriber::with_fixed_transcript("apple").with_delay(Duration::from_millis(300)));
    let mut verifier = SpokenAnswerVerifier::new(Box::new(recognizer), transcriber.clone());
    let mut phase = PhaseController::default();

    open_options(&mut phase).await;
    verifier
        .start_recording(target("apple"), &mut phase)
        .await
        .unwrap();
    assert_eq!(stats.last_request().unwrap().hint, "apple");

    // Nothing recognised: the countdown expires into processing.
    let stage = verifier.await_answer(&mut phase).await;
    assert_eq!(stage, VerificationStage::PendingFallback);
    assert_eq!(phase.phase(), Phase::Processing);
    assert_eq!(stats.stops(), 1);

    let verdict = verifier.await_fallback(&mut phase).await.unwrap();
    assert!(verdict.correct);
    assert_eq!(verdict.source, VerdictSource::Fallback);

    let request = transcriber.last_request().unwrap();
    assert_eq!(request.word_id.as_str(), "w-apple");
    assert_eq!(request.native_hint, "");
    assert_eq!(request.audio, clip());

    assert_eq!(phase.phase(), Phase::Result);
    assert_eq!(phase.selected_index(), Some(Selection::Choice(0)));
    assert_eq!(verifier.is_correct(), Some(true));
    assert_eq!(verifier.recognized_text(), "apple");
    assert_eq!(
        phase.next_transition().await,
        Some(PhaseTransition::ResultElapsed)
    );
}

#[tokio::test(start_paused = true)]
async fn fallback_for_abandoned_question_is_discarded() {
    let recognizer = MockRecognizer::new()
        .with_session(vec![RecognitionEvent::Audio(clip())])
        .with_session(vec![
            RecognitionEvent::Interim("riv".into()),
            RecognitionEvent::Final("river".into()),
            RecognitionEvent::End,
        ]);
    let transcriber = Arc::new(
        MockTranscriber::with_fixed_transcript("apple").with_delay(Duration::from_secs(2)),
    );
    let mut verifier = SpokenAnswerVerifier::new(Box::new(recognizer), transcriber.clone());
    let mut phase = PhaseController::default();

    // Question A goes to the fallback.
    open_options(&mut phase).await;
    verifier
        .start_recording(target("apple"), &mut phase)
        .await
        .unwrap();
    assert_eq!(
        verifier.await_answer(&mut phase).await,
        VerificationStage::PendingFallback
    );

    // Question B starts and is answered before A's fallback returns.
    open_options(&mut phase).await;
    verifier
        .start_recording(target("river"), &mut phase)
        .await
        .unwrap();
    let stage = verifier.await_answer(&mut phase).await;
    assert!(matches!(stage, VerificationStage::Resolved(ref v) if v.correct));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transcriber.call_count(), 1);
    assert_eq!(verifier.poll_verdicts(&mut phase), 0);

    assert_eq!(phase.selected_index(), Some(Selection::Choice(0)));
    assert_eq!(verifier.recognized_text(), "river");
    assert_eq!(verifier.is_correct(), Some(true));
    assert_eq!(
        verifier.current_target().map(|t| t.word.as_str()),
        Some("river")
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_fallback_degrades_silent_answers() {
    let recognizer =
        MockRecognizer::new().with_session(vec![RecognitionEvent::Audio(clip())]);
    let mut verifier =
        build_verifier(&LexiprobeConfig::default(), Box::new(recognizer)).unwrap();
    let mut phase = PhaseController::default();

    open_options(&mut phase).await;
    verifier
        .start_recording(target("apple"), &mut phase)
        .await
        .unwrap();
    assert_eq!(
        verifier.await_answer(&mut phase).await,
        VerificationStage::PendingFallback
    );

    let verdict = verifier.await_fallback(&mut phase).await.unwrap();
    assert!(!verdict.correct);
    assert_eq!(verdict.source, VerdictSource::Degraded);
    assert_eq!(phase.selected_index(), Some(Selection::NoAnswer));
}

#[tokio::test(start_paused = true)]
async fn unsupported_device_records_no_answer() {
    let recognizer = MockRecognizer::new().unsupported();
    let stats = recognizer.stats();
    let transcriber = Arc::new(MockTranscriber::with_fixed_transcript("apple"));
    let mut verifier = SpokenAnswerVerifier::new(Box::new(recognizer), transcriber);
    let mut phase = PhaseController::default();

    open_options(&mut phase).await;
    let err = verifier
        .start_recording(target("apple"), &mut phase)
        .await
        .unwrap_err();

    assert!(err.is_start_failure());
    assert_eq!(stats.starts(), 0);
    assert_eq!(phase.selected_index(), Some(Selection::NoAnswer));
    assert_eq!(
        phase.next_transition().await,
        Some(PhaseTransition::ResultElapsed)
    );
}

#[tokio::test(start_paused = true)]
async fn slow_recognizer_start_times_out() {
    let recognizer = MockRecognizer::new().with_start_delay(Duration::from_secs(10));
    let stats = recognizer.stats();
    let transcriber = Arc::new(MockTranscriber::with_fixed_transcript("apple"));
    let mut verifier = SpokenAnswerVerifier::new(Box::new(recognizer), transcriber);
    let mut phase = PhaseController::default();

    open_options(&mut phase).await;
    let err = verifier
        .start_recording(target("apple"), &mut phase)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("3000ms"));
    assert_eq!(stats.aborts(), 1);
    assert!(!verifier.is_recording());
}

/// A full spoken placement session: the learner can say every word up to
/// level 4 and nothing above.
#[tokio::test(start_paused = true)]
async fn spoken_placement_session() {
    let pool: Vec<Question> = Level::all()
        .flat_map(|level| {
            (0..3).map(move |i| Question {
                word_id: WordId::new(format!("l{}-{i}", level.get())),
                level,
                word: if level.get() <= 4 { "apple" } else { "zebra" }.to_string(),
                options: ["a".into(), "b".into(), "c".into(), "d".into()],
                correct_index: 0,
            })
        })
        .collect();

    let mut recognizer = MockRecognizer::new();
    for _ in 0..10 {
        recognizer = recognizer.with_session(vec![
            RecognitionEvent::Final("apple".into()),
            RecognitionEvent::End,
        ]);
    }
    let transcriber = Arc::new(MockTranscriber::with_fixed_transcript(""));
    let mut verifier = SpokenAnswerVerifier::new(Box::new(recognizer), transcriber.clone());
    let mut phase = PhaseController::default();
    let mut engine = PlacementEngine::with_seed(pool, 11);

    assert!(!engine.handle_q0(3).unwrap().finished);
    while !engine.is_finished() {
        let Some(question) = engine.next_question() else {
            engine.force_finish().unwrap();
            break;
        };

        open_options(&mut phase).await;
        verifier
            .start_recording(SpokenTarget::from(&question), &mut phase)
            .await
            .unwrap();
        let correct = match verifier.await_answer(&mut phase).await {
            VerificationStage::Resolved(verdict) => verdict.correct,
            other => panic!("expected a native verdict, got {other:?}"),
        };
        assert_eq!(correct, question.level.get() <= 4);
        assert_eq!(
            phase.next_transition().await,
            Some(PhaseTransition::ResultElapsed)
        );

        engine.handle_answer(question.level, correct).unwrap();
    }

    let outcome = engine.outcome().unwrap();
    assert!((2..=6).contains(&outcome.level.get()));
    assert!(outcome.questions_asked <= 10);
    assert_eq!(transcriber.call_count(), 0);
}
