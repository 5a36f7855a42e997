//! Core domain model and content fingerprinting for bankpulse.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const CRATE_NAME: &str = "bankpulse-core";

/// Sentiment class assigned to a review after scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    /// Lenient parse for sentiment columns carried by re-ingested data.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" => Some(SentimentLabel::Positive),
            "neutral" | "neu" => Some(SentimentLabel::Neutral),
            "negative" | "neg" => Some(SentimentLabel::Negative),
            _ => None,
        }
    }
}

/// Canonical per-review unit the pipeline operates on after assembly.
///
/// `text` is the verbatim review body and is what gets persisted and
/// fingerprinted; `canonical_text` is the normalized form used for scoring.
/// Rows only exist in this shape when `canonical_text` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub bank_tag: String,
    pub text: String,
    pub canonical_text: String,
    pub rating: Option<i32>,
    pub review_timestamp: Option<NaiveDateTime>,
    pub sentiment_label: Option<SentimentLabel>,
    pub sentiment_score: Option<f64>,
    pub source: String,
}

impl CanonicalRow {
    /// Dedup fingerprint of this row's verbatim text.
    pub fn fingerprint(&self) -> String {
        content_fingerprint(&self.text)
    }
}

/// Lowercase sha256 hex over the verbatim review text.
///
/// Computed app-side rather than inside the storage engine so a caller can
/// recompute it offline and check for duplicates before inserting. Together
/// with `(bank_id, review_timestamp)` it forms the natural dedup key.
pub fn content_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
