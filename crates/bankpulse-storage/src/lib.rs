//! PostgreSQL boundary: schema, bank registry upserts, batched review loads.

use std::collections::BTreeMap;
use std::time::Duration;

use bankpulse_core::CanonicalRow;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};
use thiserror::Error;
use tracing::info_span;

pub const CRATE_NAME: &str = "bankpulse-storage";

/// `NULLS NOT DISTINCT` keeps the dedup triple unique when `review_date` is
/// absent, so re-running a load never duplicates undated rows.
const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS banks (
        bank_id SERIAL PRIMARY KEY,
        bank_name TEXT NOT NULL UNIQUE,
        app_name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reviews (
        review_id SERIAL PRIMARY KEY,
        bank_id INTEGER NOT NULL REFERENCES banks(bank_id) ON DELETE CASCADE,
        review_text TEXT NOT NULL,
        review_hash TEXT NOT NULL,
        rating SMALLINT,
        review_date TIMESTAMP,
        sentiment_label TEXT,
        sentiment_score DOUBLE PRECISION,
        source TEXT,
        created_at TIMESTAMP DEFAULT NOW(),
        UNIQUE NULLS NOT DISTINCT (bank_id, review_hash, review_date)
    )
    "#,
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connecting to postgres: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("initializing schema: {0}")]
    Schema(#[source] sqlx::Error),
    #[error("upserting bank '{bank_name}': {source}")]
    RegistryUpsert {
        bank_name: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("inserting batch {batch_index} for {bank_tag} ({rows} rows): {source}")]
    Batch {
        batch_index: usize,
        bank_tag: String,
        rows: usize,
        #[source]
        source: sqlx::Error,
    },
}

/// Row shape handed to the batch insert, with the fingerprint precomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub review_text: String,
    pub review_hash: String,
    pub rating: Option<i16>,
    pub review_date: Option<NaiveDateTime>,
    pub sentiment_label: Option<String>,
    pub sentiment_score: Option<f64>,
    pub source: String,
}

impl NewReview {
    pub fn from_canonical(row: &CanonicalRow) -> Self {
        Self {
            review_hash: row.fingerprint(),
            review_text: row.text.clone(),
            rating: row.rating.map(|r| r as i16),
            review_date: row.review_timestamp,
            sentiment_label: row.sentiment_label.map(|l| l.as_str().to_string()),
            sentiment_score: row.sentiment_score,
            source: row.source.clone(),
        }
    }
}

/// Outcome of one batch statement. `attempted` is the contract return;
/// `inserted` comes from `rows_affected` and excludes absorbed conflicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub inserted: usize,
}

#[derive(Clone)]
pub struct ReviewStore {
    pool: PgPool,
}

impl ReviewStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        acquire_timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
            .connect(database_url)
            .await
            .map_err(StoreError::Connect)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create or verify the two-table layout. Idempotent.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in DDL {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Schema)?;
        }
        Ok(())
    }

    /// Resolve the bank registry: upsert each `(tag, display_name)` pair by
    /// unique `bank_name` and return `tag -> bank_id`.
    ///
    /// Runs once per load, before any batch. A single failed upsert aborts
    /// the whole resolution so a load can never proceed on a partial key
    /// mapping. Re-running with the same input yields the same ids and no
    /// duplicate rows.
    pub async fn upsert_banks(
        &self,
        mapping: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, i32>, StoreError> {
        let mut resolved = BTreeMap::new();
        for (tag, display_name) in mapping {
            let row = sqlx::query(
                r#"
                INSERT INTO banks (bank_name, app_name)
                VALUES ($1, $2)
                ON CONFLICT (bank_name) DO UPDATE SET app_name = EXCLUDED.app_name
                RETURNING bank_id
                "#,
            )
            .bind(display_name)
            .bind(tag)
            .fetch_one(&self.pool)
            .await
            .map_err(|source| StoreError::RegistryUpsert {
                bank_name: display_name.clone(),
                source,
            })?;
            let bank_id: i32 =
                row.try_get("bank_id")
                    .map_err(|source| StoreError::RegistryUpsert {
                        bank_name: display_name.clone(),
                        source,
                    })?;
            resolved.insert(tag.clone(), bank_id);
        }
        Ok(resolved)
    }

    /// Insert one batch as a single set-based statement: insert if absent by
    /// `(bank_id, review_hash, review_date)`, otherwise leave the existing
    /// row untouched (first writer wins). One statement, one transaction;
    /// a failure here never touches previously committed batches.
    pub async fn insert_review_batch(
        &self,
        batch_index: usize,
        bank_tag: &str,
        bank_id: i32,
        rows: &[NewReview],
    ) -> Result<BatchOutcome, StoreError> {
        if rows.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let span = info_span!("insert_review_batch", batch_index, bank_tag, rows = rows.len());
        let _guard = span.enter();

        let mut builder = batch_insert_builder(bank_id, rows);
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|source| StoreError::Batch {
                batch_index,
                bank_tag: bank_tag.to_string(),
                rows: rows.len(),
                source,
            })?;

        Ok(BatchOutcome {
            attempted: rows.len(),
            inserted: result.rows_affected() as usize,
        })
    }
}

fn batch_insert_builder<'a>(
    bank_id: i32,
    rows: &'a [NewReview],
) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO reviews \
         (bank_id, review_text, review_hash, rating, review_date, \
          sentiment_label, sentiment_score, source) ",
    );
    builder.push_values(rows, |mut b, row| {
        b.push_bind(bank_id)
            .push_bind(&row.review_text)
            .push_bind(&row.review_hash)
            .push_bind(row.rating)
            .push_bind(row.review_date)
            .push_bind(&row.sentiment_label)
            .push_bind(row.sentiment_score)
            .push_bind(&row.source);
    });
    builder.push(" ON CONFLICT (bank_id, review_hash, review_date) DO NOTHING");
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankpulse_core::{content_fingerprint, SentimentLabel};

    fn canonical(text: &str) -> CanonicalRow {
        CanonicalRow {
            bank_tag: "CBE".into(),
            text: text.into(),
            canonical_text: text.to_ascii_lowercase(),
            rating: Some(4),
            review_timestamp: None,
            sentiment_label: Some(SentimentLabel::Positive),
            sentiment_score: Some(0.42),
            source: "Google Play".into(),
        }
    }

    #[test]
    fn ddl_enforces_dedup_and_cascade() {
        let reviews_ddl = DDL[1];
        assert!(reviews_ddl.contains("UNIQUE NULLS NOT DISTINCT (bank_id, review_hash, review_date)"));
        assert!(reviews_ddl.contains("ON DELETE CASCADE"));
        assert!(DDL[0].contains("bank_name TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn new_review_precomputes_fingerprint() {
        let row = canonical("Great App!!");
        let new = NewReview::from_canonical(&row);
        assert_eq!(new.review_hash, content_fingerprint("Great App!!"));
        assert_eq!(new.rating, Some(4i16));
        assert_eq!(new.sentiment_label.as_deref(), Some("positive"));
    }

    #[test]
    fn batch_statement_is_conflict_do_nothing() {
        let rows = vec![
            NewReview::from_canonical(&canonical("one")),
            NewReview::from_canonical(&canonical("two")),
        ];
        let mut builder = batch_insert_builder(7, &rows);
        let sql = builder.sql();
        assert!(sql.starts_with("INSERT INTO reviews"));
        assert!(sql.ends_with("ON CONFLICT (bank_id, review_hash, review_date) DO NOTHING"));
        // two value tuples, eight binds each
        assert!(sql.contains("$16"));
        assert!(!sql.contains("$17"));
    }

    #[test]
    fn identical_text_maps_to_identical_hash() {
        let a = NewReview::from_canonical(&canonical("same review"));
        let b = NewReview::from_canonical(&canonical("same review"));
        assert_eq!(a.review_hash, b.review_hash);
    }
}
