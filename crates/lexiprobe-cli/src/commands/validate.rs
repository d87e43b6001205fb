//! The `lexiprobe validate` command.

use std::path::PathBuf;

use anyhow::Result;

use lexiprobe_core::model::QuestionBank;
use lexiprobe_core::parser;

pub fn execute(pool_path: PathBuf) -> Result<()> {
    let pools = if pool_path.is_dir() {
        parser::load_pool_directory(&pool_path)?
    } else {
        vec![parser::parse_pool(&pool_path)?]
    };

    let mut total_warnings = 0;

    for pool in &pools {
        println!("Pool: {} ({} questions)", pool.name, pool.questions.len());

        let bank = QuestionBank::new(pool.questions.iter().cloned());
        let counts: Vec<String> = bank
            .level_counts()
            .into_iter()
            .map(|(level, count)| format!("L{level} {count}"))
            .collect();
        println!("  levels: {}", counts.join(", "));

        let warnings = parser::validate_pool(pool);
        for w in &warnings {
            let prefix = w
                .word_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if pools.is_empty() {
        println!("No pools found.");
    } else if total_warnings == 0 {
        println!("All pools valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
