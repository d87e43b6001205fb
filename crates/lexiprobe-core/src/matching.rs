//! Transcript matching for spoken answers.
//!
//! A transcript matches a target word when, after normalisation, it is the
//! word itself, contains it as a whole-word phrase, contains a token span that
//! is close enough by edit distance, or contains a token that sounds alike.

use serde::{Deserialize, Serialize};

/// Tokens below this similarity never match phonetically, even with equal codes.
const PHONETIC_FLOOR: f64 = 0.5;

/// Tokens shorter than this are too short for a phonetic comparison.
const PHONETIC_MIN_LEN: usize = 3;

/// Matching thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum normalised Levenshtein similarity for a fuzzy match.
    pub min_similarity: f64,
    /// Whether Soundex-equal tokens count as a match.
    pub phonetic: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.8,
            phonetic: true,
        }
    }
}

/// Why a transcript was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Phrase,
    Similar,
    Phonetic,
}

#[derive(Debug, Clone, Default)]
pub struct AnswerMatcher {
    config: MatchConfig,
}

impl AnswerMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Whether `transcript` matches `target` or any accepted form.
    pub fn matches(&self, transcript: &str, target: &str, accepted: &[String]) -> bool {
        self.match_kind(transcript, target, accepted).is_some()
    }

    pub fn match_kind(
        &self,
        transcript: &str,
        target: &str,
        accepted: &[String],
    ) -> Option<MatchKind> {
        let heard = tokens(transcript);
        if heard.is_empty() {
            return None;
        }

        std::iter::once(target)
            .chain(accepted.iter().map(String::as_str))
            .find_map(|candidate| self.match_candidate(&heard, &tokens(candidate)))
    }

    fn match_candidate(&self, heard: &[String], expected: &[String]) -> Option<MatchKind> {
        if expected.is_empty() {
            return None;
        }
        if heard == expected {
            return Some(MatchKind::Exact);
        }
        if heard.windows(expected.len()).any(|w| w == expected) {
            return Some(MatchKind::Phrase);
        }

        let expected_joined = expected.join(" ");
        let similar = heard.windows(expected.len()).any(|w| {
            strsim::normalized_levenshtein(&w.join(" "), &expected_joined)
                >= self.config.min_similarity
        });
        if similar {
            return Some(MatchKind::Similar);
        }

        if self.config.phonetic {
            if let [word] = expected {
                let code = soundex(word)?;
                let sounds_alike = heard.iter().any(|token| {
                    token.chars().count() >= PHONETIC_MIN_LEN
                        && soundex(token).as_deref() == Some(code.as_str())
                        && strsim::normalized_levenshtein(token, word) >= PHONETIC_FLOOR
                });
                if sounds_alike {
                    return Some(MatchKind::Phonetic);
                }
            }
        }

        None
    }
}

/// Lowercase, strip punctuation, split on whitespace.
pub fn tokens(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .map(|t| t.trim_matches('\'').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Normalised form of a transcript: its tokens joined by single spaces.
pub fn normalize(text: &str) -> String {
    tokens(text).join(" ")
}

/// American Soundex code of the ASCII letters in `word`.
pub fn soundex(word: &str) -> Option<String> {
    let letters: Vec<char> = word
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let (&first, rest) = letters.split_first()?;

    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());
    let mut last = soundex_digit(first);

    for &c in rest {
        let digit = soundex_digit(c);
        if let Some(d) = digit {
            if digit != last {
                code.push(d);
                if code.len() == 4 {
                    break;
                }
            }
        }
        // h and w do not separate letters with the same code.
        if !matches!(c, 'h' | 'w') {
            last = digit;
        }
    }

    while code.len() < 4 {
        code.push('0');
    }
    Some(code)
}

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'b' | 'f' | 'p' | 'v' => Some('1'),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
        'd' | 't' => Some('3'),
        'l' => Some('4'),
        'm' | 'n' => Some('5'),
        'r' => Some('6'),
        _ => None,
    }
}
