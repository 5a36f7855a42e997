//! Text normalization + lexicon-based sentiment scoring.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bankpulse_core::SentimentLabel;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const CRATE_NAME: &str = "bankpulse-analysis";

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"http\S+").expect("valid url pattern"));

/// Canonicalize a raw review body for fingerprint-independent analysis.
///
/// Lowercase, strip URL spans, replace anything outside `[a-z0-9 ]` with a
/// space, collapse whitespace, trim. Pure and locale-independent; input that
/// normalizes away yields the empty string, which upstream treats as a
/// drop-the-row signal.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped = URL_PATTERN.replace_all(&lowered, " ");
    let cleaned: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("reading lexicon {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing lexicon: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("lexicon contains no entries")]
    Empty,
}

/// Word valence table backing the scorer.
///
/// Loaded once at construction so a malformed model fails the run at startup
/// rather than per row.
#[derive(Debug, Clone)]
pub struct Lexicon {
    valences: HashMap<String, f64>,
}

impl Lexicon {
    /// The lexicon bundled with the crate, tuned for banking-app reviews.
    pub fn embedded() -> Result<Self, LexiconError> {
        Self::from_json_str(include_str!("../lexicon.json"))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LexiconError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, LexiconError> {
        let valences: HashMap<String, f64> = serde_json::from_str(raw)?;
        if valences.is_empty() {
            return Err(LexiconError::Empty);
        }
        Ok(Self { valences })
    }

    #[inline]
    fn valence(&self, word: &str) -> f64 {
        self.valences.get(word).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.valences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valences.is_empty()
    }
}

/// Label cutoffs applied to the compound score. Explicit configuration, never
/// process-wide state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentThresholds {
    pub positive: f64,
    pub negative: f64,
}

impl Default for SentimentThresholds {
    fn default() -> Self {
        Self {
            positive: 0.05,
            negative: -0.05,
        }
    }
}

/// Normalization constant for the compound score; keeps it in (-1, 1).
const COMPOUND_ALPHA: f64 = 15.0;

/// How many preceding tokens a negator flips.
const NEGATION_WINDOW: usize = 3;

pub struct SentimentScorer {
    lexicon: Lexicon,
    thresholds: SentimentThresholds,
}

impl SentimentScorer {
    pub fn new(lexicon: Lexicon, thresholds: SentimentThresholds) -> Self {
        Self { lexicon, thresholds }
    }

    /// Embedded lexicon + default thresholds.
    pub fn with_defaults() -> Result<Self, LexiconError> {
        Ok(Self::new(Lexicon::embedded()?, SentimentThresholds::default()))
    }

    /// Score canonical text to a `(label, compound)` pair, compound in [-1, 1].
    ///
    /// Token valences are summed with negation inversion inside a
    /// three-token lookback window, then squashed with
    /// `s / sqrt(s^2 + alpha)`. Deterministic for a fixed lexicon.
    pub fn score(&self, canonical_text: &str) -> (SentimentLabel, f64) {
        let tokens: Vec<String> = tokenize(canonical_text).collect();
        let mut sum = 0.0f64;

        for i in 0..tokens.len() {
            let base = self.lexicon.valence(&tokens[i]);
            if base == 0.0 {
                continue;
            }
            let negated =
                (1..=NEGATION_WINDOW).any(|k| i >= k && is_negator(&tokens[i - k]));
            sum += if negated { -base } else { base };
        }

        let compound = if sum == 0.0 {
            0.0
        } else {
            sum / (sum * sum + COMPOUND_ALPHA).sqrt()
        };
        (self.classify(compound), compound)
    }

    /// Threshold a compound score into a label.
    pub fn classify(&self, compound: f64) -> SentimentLabel {
        if compound > self.thresholds.positive {
            SentimentLabel::Positive
        } else if compound < self.thresholds.negative {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn thresholds(&self) -> SentimentThresholds {
        self.thresholds
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

/// Normalized text loses apostrophes, so contraction stems ("doesn t")
/// count as negators alongside the full words.
fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "cannot"
            | "without"
            | "isn"
            | "wasn"
            | "aren"
            | "won"
            | "don"
            | "doesn"
            | "didn"
            | "couldn"
            | "wouldn"
            | "shouldn"
    )
}
