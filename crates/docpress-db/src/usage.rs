//! Usage and cost recording.

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use docpress_core::{
    base_cost_cents, defaults, estimated_pages, new_id, total_cost_cents, Error, Result, Usage,
};

use crate::retry::with_write_retry;

const USAGE_COLUMNS: &str = "id, document_id, operation, input_tokens, output_tokens, \
     base_cost_cents, margin_rate, total_cost_cents, created_at";

fn usage_from_row(row: &SqliteRow) -> Result<Usage> {
    Ok(Usage {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        operation: row.try_get("operation")?,
        input_tokens: row.try_get("input_tokens")?,
        output_tokens: row.try_get("output_tokens")?,
        base_cost_cents: row.try_get("base_cost_cents")?,
        margin_rate: row.try_get("margin_rate")?,
        total_cost_cents: row.try_get("total_cost_cents")?,
        created_at: row.try_get("created_at")?,
    })
}

/// SQLite implementation of the usage repository.
pub struct SqliteUsageRepository {
    pool: SqlitePool,
    read_pool: SqlitePool,
}

impl SqliteUsageRepository {
    /// Create a repository over a write pool and a read pool (which may be
    /// the same pool when no replica is configured).
    pub fn new(pool: SqlitePool, read_pool: SqlitePool) -> Self {
        Self { pool, read_pool }
    }

    /// Record the usage and cost of one successful conversion.
    ///
    /// Base cost is 1 cent per estimated page, with pages estimated as
    /// `ceil(total_tokens / 1000)`; the margin is applied as
    /// `ceil(base * (1 + margin/100))` in integer cents.
    pub async fn record_conversion(
        &self,
        document_id: &str,
        input_tokens: i64,
        output_tokens: i64,
        total_tokens: i64,
    ) -> Result<Usage> {
        let id = new_id();
        let margin_rate = defaults::MARGIN_RATE_PERCENT;
        let base = base_cost_cents(estimated_pages(total_tokens));
        let total = total_cost_cents(base, margin_rate);
        let now = Utc::now();

        with_write_retry("record_usage", || async {
            sqlx::query(
                "INSERT INTO usage_records (id, document_id, operation, input_tokens, \
                 output_tokens, base_cost_cents, margin_rate, total_cost_cents, created_at) \
                 VALUES (?, ?, 'convert', ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(document_id)
            .bind(input_tokens)
            .bind(output_tokens)
            .bind(base)
            .bind(margin_rate)
            .bind(total)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        Ok(Usage {
            id,
            document_id: document_id.to_string(),
            operation: "convert".to_string(),
            input_tokens,
            output_tokens,
            base_cost_cents: base,
            margin_rate,
            total_cost_cents: total,
            created_at: now,
        })
    }

    /// List usage rows for a document, oldest first.
    pub async fn for_document(&self, document_id: &str) -> Result<Vec<Usage>> {
        let rows = sqlx::query(&format!(
            "SELECT {USAGE_COLUMNS} FROM usage_records WHERE document_id = ? \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(document_id)
        .fetch_all(&self.read_pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(usage_from_row).collect()
    }
}
