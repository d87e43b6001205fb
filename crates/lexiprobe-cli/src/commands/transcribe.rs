//! The `lexiprobe transcribe` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use lexiprobe_core::model::WordId;
use lexiprobe_core::traits::{AudioClip, TranscribeRequest};
use lexiprobe_speech::config::load_config_from;
use lexiprobe_speech::create_fallback;

pub async fn execute(
    audio_path: PathBuf,
    word_id: String,
    hint: String,
    mime: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let fallback = create_fallback(&config.fallback)?;

    let data = std::fs::read(&audio_path)
        .with_context(|| format!("failed to read audio: {}", audio_path.display()))?;
    anyhow::ensure!(!data.is_empty(), "audio file is empty: {}", audio_path.display());

    let mime_type = mime.unwrap_or_else(|| mime_for(&audio_path).to_string());
    let request = TranscribeRequest {
        audio: AudioClip::new(mime_type, data),
        word_id: WordId::new(word_id),
        native_hint: hint,
    };

    let transcript = fallback
        .transcribe(&request)
        .await
        .with_context(|| format!("transcription via {} failed", fallback.name()))?;

    println!("{}", transcript.text);
    eprintln!("({}ms via {})", transcript.latency_ms, fallback.name());

    Ok(())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}
