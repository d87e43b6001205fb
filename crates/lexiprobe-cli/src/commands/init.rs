//! The `lexiprobe init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("lexiprobe.toml").exists() {
        println!("lexiprobe.toml already exists, skipping.");
    } else {
        std::fs::write("lexiprobe.toml", SAMPLE_CONFIG)?;
        println!("Created lexiprobe.toml");
    }

    std::fs::create_dir_all("pools")?;
    let sample_path = Path::new("pools/sample.toml");
    if sample_path.exists() {
        println!("pools/sample.toml already exists, skipping.");
    } else {
        std::fs::write(sample_path, SAMPLE_POOL)?;
        println!("Created pools/sample.toml");
    }

    println!("\nNext steps:");
    println!("  1. Point [fallback] in lexiprobe.toml at your transcription service");
    println!("  2. Run: lexiprobe validate --pool pools/sample.toml");
    println!("  3. Run: lexiprobe simulate --pool pools/sample.toml --q0 3 --ability 4");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# lexiprobe configuration

[timing]
question_ms = 1000
options_ms = 4000
result_ms = 1500
tick_ms = 50

[speech]
locale = "en-US"
start_timeout_ms = 3000
final_result_grace_ms = 750
fallback_timeout_ms = 10000

[matching]
min_similarity = 0.8
phonetic = true

# Set type = "http" and a base_url to enable the network fallback.
[fallback]
type = "disabled"
# type = "http"
# base_url = "https://speech.example.com"
# api_key = "${LEXIPROBE_TRANSCRIBE_KEY}"
# timeout_ms = 10000
"#;

const SAMPLE_POOL: &str = r#"[pool]
id = "sample"
name = "Sample Pool"
description = "One question per level to get started"

[[questions]]
word_id = "sample-1"
level = 1
word = "apple"
options = ["manzana", "pera", "uva", "naranja"]
correct_index = 0

[[questions]]
word_id = "sample-2"
level = 2
word = "river"
options = ["montaña", "río", "playa", "bosque"]
correct_index = 1

[[questions]]
word_id = "sample-3"
level = 3
word = "journey"
options = ["viaje", "cena", "puerta", "carta"]
correct_index = 0

[[questions]]
word_id = "sample-4"
level = 4
word = "achieve"
options = ["perder", "olvidar", "lograr", "esperar"]
correct_index = 2

[[questions]]
word_id = "sample-5"
level = 5
word = "reluctant"
options = ["ansioso", "reacio", "alegre", "rápido"]
correct_index = 1

[[questions]]
word_id = "sample-6"
level = 6
word = "meticulous"
options = ["descuidado", "ruidoso", "meticuloso", "breve"]
correct_index = 2

[[questions]]
word_id = "sample-7"
level = 7
word = "ubiquitous"
options = ["escaso", "ubicuo", "antiguo", "oculto"]
correct_index = 1

[[questions]]
word_id = "sample-8"
level = 8
word = "perspicacious"
options = ["torpe", "tímido", "perspicaz", "generoso"]
correct_index = 2
"#;
