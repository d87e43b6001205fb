//! Configuration loading and fallback factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use lexiprobe_core::matching::{AnswerMatcher, MatchConfig};
use lexiprobe_core::phase::PhaseTimings;
use lexiprobe_core::traits::{SpeechRecognizer, TranscriptionFallback};
use lexiprobe_core::verifier::{SpokenAnswerVerifier, VerifierConfig};

use crate::disabled::DisabledFallback;
use crate::http::{HttpTranscriber, DEFAULT_TIMEOUT_MS};

const KEY_ENV_VAR: &str = "LEXIPROBE_TRANSCRIBE_KEY";
const MASK: &str = "***";

/// Configuration for the network transcription fallback.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FallbackConfig {
    Http {
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    #[default]
    Disabled,
}

impl std::fmt::Debug for FallbackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackConfig::Http {
                base_url,
                api_key,
                timeout_ms,
            } => f
                .debug_struct("Http")
                .field("base_url", base_url)
                .field("api_key", &api_key.as_ref().map(|_| MASK))
                .field("timeout_ms", timeout_ms)
                .finish(),
            FallbackConfig::Disabled => f.write_str("Disabled"),
        }
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Top-level lexiprobe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LexiprobeConfig {
    #[serde(default)]
    pub timing: PhaseTimings,
    #[serde(default)]
    pub speech: VerifierConfig,
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl LexiprobeConfig {
    /// A copy safe to print: the API key, if any, is replaced by a mask.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let FallbackConfig::Http {
            api_key: Some(key), ..
        } = &mut copy.fallback
        {
            *key = MASK.to_string();
        }
        copy
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn resolve_fallback_config(config: &FallbackConfig) -> FallbackConfig {
    match config {
        FallbackConfig::Http {
            base_url,
            api_key,
            timeout_ms,
        } => FallbackConfig::Http {
            base_url: resolve_env_vars(base_url),
            api_key: api_key.as_deref().map(resolve_env_vars),
            timeout_ms: *timeout_ms,
        },
        FallbackConfig::Disabled => FallbackConfig::Disabled,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `lexiprobe.toml` in the current directory
/// 2. `~/.config/lexiprobe/config.toml`
///
/// Environment variable override: `LEXIPROBE_TRANSCRIBE_KEY`.
pub fn load_config() -> Result<LexiprobeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<LexiprobeConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("lexiprobe.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<LexiprobeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => LexiprobeConfig::default(),
    };

    config.fallback = resolve_fallback_config(&config.fallback);

    if let Ok(key) = std::env::var(KEY_ENV_VAR) {
        match &mut config.fallback {
            FallbackConfig::Http { api_key, .. } => *api_key = Some(key),
            FallbackConfig::Disabled => {
                tracing::debug!("{KEY_ENV_VAR} is set but the fallback is disabled");
            }
        }
    }

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("lexiprobe"))
}

/// Create the configured transcription fallback.
pub fn create_fallback(config: &FallbackConfig) -> Result<Arc<dyn TranscriptionFallback>> {
    match config {
        FallbackConfig::Http {
            base_url,
            api_key,
            timeout_ms,
        } => {
            anyhow::ensure!(!base_url.is_empty(), "fallback base_url is empty");
            Ok(Arc::new(HttpTranscriber::new(
                base_url,
                api_key.clone(),
                *timeout_ms,
            )?))
        }
        FallbackConfig::Disabled => Ok(Arc::new(DisabledFallback)),
    }
}

/// Build a verifier for `recognizer` from the loaded configuration.
pub fn build_verifier(
    config: &LexiprobeConfig,
    recognizer: Box<dyn SpeechRecognizer>,
) -> Result<SpokenAnswerVerifier> {
    let fallback = create_fallback(&config.fallback)?;
    Ok(SpokenAnswerVerifier::new(recognizer, fallback)
        .with_config(config.speech.clone())
        .with_matcher(AnswerMatcher::new(config.matching.clone())))
}
