//! The `lexiprobe simulate` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

use lexiprobe_core::model::{Level, WordId};
use lexiprobe_core::parser;
use lexiprobe_core::placement::{EstimatePhase, PlacementEngine, PlacementOutcome};

pub struct SimulateArgs {
    pub pool: PathBuf,
    pub q0: u8,
    pub ability: u8,
    pub seed: Option<u64>,
    pub slip: f64,
    pub format: String,
    pub output: Option<PathBuf>,
}

/// One answered question in a simulated session.
#[derive(Debug, Serialize)]
struct SimulationStep {
    number: u32,
    phase: EstimatePhase,
    word_id: WordId,
    level: Level,
    correct: bool,
    lower_bound: Level,
    upper_bound: Level,
    pivot: Level,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    id: Uuid,
    created_at: DateTime<Utc>,
    pool_id: String,
    seed: u64,
    q0: u8,
    ability: Level,
    slip: f64,
    steps: Vec<SimulationStep>,
    /// `true` when the bank ran out and the session was cut short.
    forced: bool,
    outcome: PlacementOutcome,
}

pub fn execute(args: SimulateArgs) -> Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.slip),
        "slip must be between 0.0 and 1.0"
    );
    anyhow::ensure!(
        matches!(args.format.as_str(), "text" | "json"),
        "unknown format '{}', expected text or json",
        args.format
    );
    let ability = Level::try_from(args.ability).context("invalid --ability")?;

    let pool = parser::parse_pool(&args.pool)?;
    anyhow::ensure!(!pool.questions.is_empty(), "pool '{}' has no questions", pool.id);

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut engine = PlacementEngine::with_seed(pool.questions.clone(), seed);
    let mut learner = StdRng::seed_from_u64(seed.wrapping_add(1));

    engine
        .handle_q0(args.q0)
        .context("invalid self-assessment answer")?;

    let mut steps = Vec::new();
    let mut forced = false;
    while !engine.is_finished() {
        let Some(question) = engine.next_question() else {
            tracing::warn!("question bank exhausted, finishing early");
            engine.force_finish()?;
            forced = true;
            break;
        };

        let phase = engine.state().phase;
        let knows = question.level <= ability;
        let correct = if learner.random_bool(args.slip) {
            !knows
        } else {
            knows
        };
        engine.handle_answer(question.level, correct)?;

        let state = engine.state();
        steps.push(SimulationStep {
            number: state.question_count,
            phase,
            word_id: question.word_id,
            level: question.level,
            correct,
            lower_bound: state.lower_bound,
            upper_bound: state.upper_bound,
            pivot: state.pivot,
        });
    }

    let outcome = engine
        .outcome()
        .context("placement finished without a level")?;

    let report = SimulationReport {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        pool_id: pool.id.clone(),
        seed,
        q0: args.q0,
        ability,
        slip: args.slip,
        steps,
        forced,
        outcome,
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pool: {} ({}), seed {}", pool.name, pool.id, seed);
        print_trace(&report);
        println!(
            "Placed at level {} ({} confidence) after {} question(s){}",
            report.outcome.level,
            report.outcome.confidence,
            report.outcome.questions_asked,
            if report.forced { ", bank exhausted" } else { "" }
        );
    }

    if let Some(path) = &args.output {
        save_report(&report, path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

fn save_report(report: &SimulationReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report: {}", path.display()))
}

fn print_trace(report: &SimulationReport) {
    use comfy_table::{Cell, Table};

    if report.steps.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Phase", "Word", "Level", "Answer", "Bounds", "Pivot"]);

    for step in &report.steps {
        table.add_row(vec![
            Cell::new(step.number),
            Cell::new(step.phase.as_str()),
            Cell::new(&step.word_id),
            Cell::new(step.level),
            Cell::new(if step.correct { "correct" } else { "wrong" }),
            Cell::new(format!("{}..{}", step.lower_bound, step.upper_bound)),
            Cell::new(step.pivot),
        ]);
    }

    println!("{table}");
}
