//! Question pool parser.
//!
//! Loads question pools from TOML or JSON files and directories, and
//! validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{Level, Question, QuestionBank, QuestionPool, WordId};

/// Intermediate structure shared by the TOML and JSON pool formats.
#[derive(Debug, Deserialize)]
struct PoolFile {
    pool: PoolHeader,
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct PoolHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    word_id: String,
    level: u8,
    #[serde(default)]
    word: String,
    options: Vec<String>,
    correct_index: usize,
}

/// Parse a single pool file. `.json` files are read as JSON, anything else as TOML.
pub fn parse_pool(path: &Path) -> Result<QuestionPool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question pool: {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "json") {
        parse_pool_json(&content, path)
    } else {
        parse_pool_str(&content, path)
    }
}

/// Parse a TOML string into a `QuestionPool` (useful for testing).
pub fn parse_pool_str(content: &str, source_path: &Path) -> Result<QuestionPool> {
    let parsed: PoolFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    into_pool(parsed)
}

/// Parse a JSON string into a `QuestionPool`.
pub fn parse_pool_json(content: &str, source_path: &Path) -> Result<QuestionPool> {
    let parsed: PoolFile = serde_json::from_str(content)
        .with_context(|| format!("failed to parse JSON: {}", source_path.display()))?;
    into_pool(parsed)
}

fn into_pool(parsed: PoolFile) -> Result<QuestionPool> {
    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let level = Level::try_from(q.level)
                .with_context(|| format!("question '{}'", q.word_id))?;
            let options: [String; 4] = q.options.try_into().map_err(|opts: Vec<String>| {
                anyhow::anyhow!(
                    "question '{}' has {} options, expected 4",
                    q.word_id,
                    opts.len()
                )
            })?;
            anyhow::ensure!(
                q.correct_index < options.len(),
                "question '{}' has correct_index {} outside 0..4",
                q.word_id,
                q.correct_index
            );

            Ok(Question {
                word_id: WordId(q.word_id),
                level,
                word: q.word,
                options,
                correct_index: q.correct_index,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QuestionPool {
        id: parsed.pool.id,
        name: parsed.pool.name,
        description: parsed.pool.description,
        questions,
    })
}

/// Recursively load all `.toml` and `.json` pools from a directory.
pub fn load_pool_directory(dir: &Path) -> Result<Vec<QuestionPool>> {
    let mut pools = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            pools.extend(load_pool_directory(&path)?);
        } else if path
            .extension()
            .is_some_and(|ext| ext == "toml" || ext == "json")
        {
            match parse_pool(&path) {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(pools)
}

/// A warning from pool validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The word ID (if applicable).
    pub word_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a question pool for common issues.
pub fn validate_pool(pool: &QuestionPool) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for q in &pool.questions {
        if !seen_ids.insert(&q.word_id) {
            warnings.push(ValidationWarning {
                word_id: Some(q.word_id.to_string()),
                message: format!("duplicate word ID: {}", q.word_id),
            });
        }
    }

    for q in &pool.questions {
        if q.word.trim().is_empty() {
            warnings.push(ValidationWarning {
                word_id: Some(q.word_id.to_string()),
                message: "word is empty".into(),
            });
        }

        if q.options.iter().any(|o| o.trim().is_empty()) {
            warnings.push(ValidationWarning {
                word_id: Some(q.word_id.to_string()),
                message: "question has a blank option".into(),
            });
        }

        let distinct: HashSet<String> = q.options.iter().map(|o| o.trim().to_lowercase()).collect();
        if distinct.len() < q.options.len() {
            warnings.push(ValidationWarning {
                word_id: Some(q.word_id.to_string()),
                message: "question has duplicate options".into(),
            });
        }
    }

    // Empty levels only reduce coverage; the neighbour search still works.
    let bank = QuestionBank::new(pool.questions.iter().cloned());
    for (level, count) in bank.level_counts() {
        if count == 0 {
            warnings.push(ValidationWarning {
                word_id: None,
                message: format!("level {level} has no questions"),
            });
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[pool]
id = "starter"
name = "Starter Pool"
description = "A tiny pool"

[[questions]]
word_id = "w-apple"
level = 1
word = "apple"
options = ["manzana", "pera", "uva", "limón"]
correct_index = 0

[[questions]]
word_id = "w-ephemeral"
level = 7
word = "ephemeral"
options = ["lasting", "brief", "heavy", "loud"]
correct_index = 1
"#;

    #[test]
    fn parse_valid_toml() {
        let pool = parse_pool_str(VALID_TOML, &PathBuf::from("pool.toml")).unwrap();
        assert_eq!(pool.id, "starter");
        assert_eq!(pool.name, "Starter Pool");
        assert_eq!(pool.questions.len(), 2);
        assert_eq!(pool.questions[1].word, "ephemeral");
        assert_eq!(pool.questions[1].level, Level::new(7).unwrap());
        assert_eq!(pool.questions[1].correct_index, 1);
    }

    #[test]
    fn parse_json_pool() {
        let json = r#"{
            "pool": {"id": "j", "name": "JSON Pool"},
            "questions": [
                {"word_id": "w1", "level": 4, "word": "river",
                 "options": ["a", "b", "c", "d"], "correct_index": 3}
            ]
        }"#;
        let pool = parse_pool_json(json, &PathBuf::from("pool.json")).unwrap();
        assert_eq!(pool.questions[0].word_id.as_str(), "w1");
        assert!(pool.description.is_empty());
    }

    #[test]
    fn rejects_out_of_range_level() {
        let toml = r#"
[pool]
id = "bad"
name = "Bad"

[[questions]]
word_id = "w1"
level = 9
options = ["a", "b", "c", "d"]
correct_index = 0
"#;
        let err = parse_pool_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("invalid level 9"));
    }

    #[test]
    fn rejects_wrong_option_count() {
        let toml = r#"
[pool]
id = "bad"
name = "Bad"

[[questions]]
word_id = "w1"
level = 2
options = ["a", "b", "c"]
correct_index = 0
"#;
        let err = parse_pool_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("3 options"));
    }

    #[test]
    fn rejects_correct_index_out_of_range() {
        let toml = r#"
[pool]
id = "bad"
name = "Bad"

[[questions]]
word_id = "w1"
level = 2
options = ["a", "b", "c", "d"]
correct_index = 4
"#;
        assert!(parse_pool_str(toml, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_pool_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn validate_reports_duplicates_and_gaps() {
        let toml = r#"
[pool]
id = "dupes"
name = "Dupes"

[[questions]]
word_id = "same"
level = 1
word = "cat"
options = ["gato", "perro", "gato", "pez"]
correct_index = 0

[[questions]]
word_id = "same"
level = 2
word = ""
options = ["a", "b", " ", "d"]
correct_index = 0
"#;
        let pool = parse_pool_str(toml, &PathBuf::from("dupes.toml")).unwrap();
        let warnings = validate_pool(&pool);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate word ID")));
        assert!(warnings.iter().any(|w| w.message.contains("duplicate options")));
        assert!(warnings.iter().any(|w| w.message.contains("blank option")));
        assert!(warnings.iter().any(|w| w.message.contains("word is empty")));
        assert!(warnings.iter().any(|w| w.message == "level 8 has no questions"));
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pool.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not [toml").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let pools = load_pool_directory(dir.path()).unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].id, "starter");
    }
}
