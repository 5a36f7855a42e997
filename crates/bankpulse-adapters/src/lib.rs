//! Schema-flexible raw review records and assembly into canonical rows.

use std::path::{Path, PathBuf};

use bankpulse_analysis::normalize;
use bankpulse_core::{CanonicalRow, SentimentLabel};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

pub const CRATE_NAME: &str = "bankpulse-adapters";

/// Source literal applied when a record carries no origin of its own.
pub const DEFAULT_SOURCE: &str = "Google Play";

/// Ordered candidate names per logical attribute; first present wins.
const TEXT_FIELDS: &[&str] = &["content", "review_text", "text"];
const RATING_FIELDS: &[&str] = &["score", "rating"];
const TIMESTAMP_FIELDS: &[&str] = &["at", "date", "review_date"];
const LABEL_FIELDS: &[&str] = &["sentiment", "sentiment_label"];
const SCORE_FIELDS: &[&str] = &["compound", "sentiment_score"];
const SOURCE_FIELDS: &[&str] = &["source"];

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("reading raw reviews {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing raw reviews {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("raw reviews {} is not a JSON array", path.display())]
    NotAnArray { path: PathBuf },
}

/// One externally supplied review record: a bag of named JSON fields with no
/// guaranteed schema. Consumed once by the assembler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    fn first_value(&self, candidates: &[&str]) -> Option<&Value> {
        candidates
            .iter()
            .find_map(|name| self.fields.get(*name))
            .filter(|v| !v.is_null())
    }

    fn first_str(&self, candidates: &[&str]) -> Option<&str> {
        self.first_value(candidates).and_then(Value::as_str)
    }
}

/// Load one bank's raw reviews: a JSON array of objects on disk, the drop
/// format of the acquisition collaborator. Non-object entries are skipped
/// with a warning rather than failing the file.
pub fn read_raw_records(path: impl AsRef<Path>) -> Result<Vec<RawRecord>, AdapterError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| AdapterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| AdapterError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Array(entries) = value else {
        return Err(AdapterError::NotAnArray {
            path: path.to_path_buf(),
        });
    };

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::Object(fields) => records.push(RawRecord::new(fields)),
            other => warn!(path = %path.display(), "skipping non-object raw entry: {other}"),
        }
    }
    Ok(records)
}

/// Best-effort review timestamp parse. The `None` case is a first-class
/// outcome: unparseable or absent dates load as null, never as an error.
pub fn parse_review_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Maps raw records into canonical rows, resolving alternate field names via
/// the ordered candidate lists above.
#[derive(Debug, Clone)]
pub struct RecordAssembler {
    source_default: String,
}

impl Default for RecordAssembler {
    fn default() -> Self {
        Self {
            source_default: DEFAULT_SOURCE.to_string(),
        }
    }
}

impl RecordAssembler {
    pub fn new(source_default: impl Into<String>) -> Self {
        Self {
            source_default: source_default.into(),
        }
    }

    /// Assemble one raw record for the given partition tag.
    ///
    /// Returns `None` when the resolved body normalizes to nothing — a
    /// filtering outcome counted by the caller, not a failure. Sentiment
    /// fields already present on the record are carried through so scored
    /// data can be re-ingested without re-scoring.
    pub fn assemble(&self, bank_tag: &str, raw: &RawRecord) -> Option<CanonicalRow> {
        let text = raw.first_str(TEXT_FIELDS).unwrap_or_default().to_string();
        let canonical_text = normalize(&text);
        if canonical_text.is_empty() {
            return None;
        }

        let rating = raw.first_value(RATING_FIELDS).and_then(rating_from);
        let review_timestamp = raw
            .first_str(TIMESTAMP_FIELDS)
            .and_then(parse_review_timestamp);
        let sentiment_label = raw
            .first_str(LABEL_FIELDS)
            .and_then(SentimentLabel::parse);
        let sentiment_score = raw.first_value(SCORE_FIELDS).and_then(score_from);
        let source = raw
            .first_str(SOURCE_FIELDS)
            .map(str::to_string)
            .unwrap_or_else(|| self.source_default.clone());

        Some(CanonicalRow {
            bank_tag: bank_tag.to_string(),
            text,
            canonical_text,
            rating,
            review_timestamp,
            sentiment_label,
            sentiment_score,
            source,
        })
    }
}

fn rating_from(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(|v| v as i32),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i32),
        _ => None,
    }
}

fn score_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(fields) => RawRecord::new(fields),
            _ => panic!("test records must be objects"),
        }
    }

    #[test]
    fn first_present_candidate_wins() {
        let assembler = RecordAssembler::default();
        let raw = record(json!({
            "content": "Great app",
            "text": "shadowed body",
            "score": 5
        }));
        let row = assembler.assemble("CBE", &raw).expect("assembled");
        assert_eq!(row.text, "Great app");
        assert_eq!(row.rating, Some(5));
        assert_eq!(row.source, DEFAULT_SOURCE);
    }

    #[test]
    fn fallback_text_field_is_used() {
        let assembler = RecordAssembler::default();
        let raw = record(json!({ "review_text": "Transfers keep failing" }));
        let row = assembler.assemble("BOA", &raw).expect("assembled");
        assert_eq!(row.text, "Transfers keep failing");
        assert_eq!(row.bank_tag, "BOA");
    }

    #[test]
    fn empty_after_normalization_is_dropped() {
        let assembler = RecordAssembler::default();
        assert!(assembler.assemble("CBE", &record(json!({ "content": "!!! :)" }))).is_none());
        assert!(assembler.assemble("CBE", &record(json!({ "score": 4 }))).is_none());
    }

    #[test]
    fn missing_date_yields_null_timestamp_not_a_drop() {
        let assembler = RecordAssembler::default();
        let raw = record(json!({ "content": "Works fine", "score": 4 }));
        let row = assembler.assemble("CBE", &raw).expect("assembled");
        assert_eq!(row.review_timestamp, None);
    }

    #[test]
    fn unparseable_date_yields_null_timestamp() {
        let assembler = RecordAssembler::default();
        let raw = record(json!({ "content": "Works fine", "at": "last tuesday" }));
        let row = assembler.assemble("CBE", &raw).expect("assembled");
        assert_eq!(row.review_timestamp, None);
    }

    #[test]
    fn timestamp_formats_parse() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_review_timestamp("2024-03-05"), Some(expected));
        assert_eq!(parse_review_timestamp("03/05/2024"), Some(expected));
        assert_eq!(
            parse_review_timestamp("2024-03-05 10:30:00"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(10, 30, 0)
        );
        assert!(parse_review_timestamp("2024-03-05T10:30:00Z").is_some());
        assert_eq!(parse_review_timestamp(""), None);
    }

    #[test]
    fn rating_variants_resolve_or_null() {
        let assembler = RecordAssembler::default();
        let with = |v: Value| {
            assembler
                .assemble("CBE", &record(json!({ "content": "ok app", "score": v })))
                .expect("assembled")
                .rating
        };
        assert_eq!(with(json!(4)), Some(4));
        assert_eq!(with(json!(4.0)), Some(4));
        assert_eq!(with(json!("5")), Some(5));
        assert_eq!(with(json!("five")), None);
        assert_eq!(with(json!(null)), None);
    }

    #[test]
    fn preexisting_sentiment_is_carried_through() {
        let assembler = RecordAssembler::default();
        let raw = record(json!({
            "content": "already scored",
            "sentiment": "negative",
            "compound": -0.4
        }));
        let row = assembler.assemble("Amole", &raw).expect("assembled");
        assert_eq!(row.sentiment_label, Some(SentimentLabel::Negative));
        assert_eq!(row.sentiment_score, Some(-0.4));
    }

    #[test]
    fn unscored_records_leave_sentiment_null() {
        let assembler = RecordAssembler::default();
        let raw = record(json!({ "content": "no opinion columns here" }));
        let row = assembler.assemble("CBE", &raw).expect("assembled");
        assert_eq!(row.sentiment_label, None);
        assert_eq!(row.sentiment_score, None);
    }

    #[test]
    fn raw_files_load_and_tolerate_non_objects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("CBE_reviews.json");
        std::fs::write(
            &path,
            r#"[{"content": "good"}, 42, {"content": "bad"}]"#,
        )
        .expect("write fixture");

        let records = read_raw_records(&path).expect("read");
        assert_eq!(records.len(), 2);

        let not_array = dir.path().join("broken.json");
        std::fs::write(&not_array, r#"{"content": "good"}"#).expect("write fixture");
        assert!(matches!(
            read_raw_records(&not_array),
            Err(AdapterError::NotAnArray { .. })
        ));
    }
}
