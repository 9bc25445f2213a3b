//! Repository for blocklist lookup results.

use super::DbError;
use serde::Serialize;
use sqlx::SqlitePool;

/// Stored lookup result for one IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Generated on first insert; never changes afterwards.
    pub id: String,
    pub ip_address: String,
    pub response_code: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Record {
    /// Build a candidate record with explicit timestamps.
    pub fn new(ip_address: &str, response_code: &str, at: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ip_address: ip_address.to_string(),
            response_code: response_code.to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    /// Build a candidate record for a lookup observed right now.
    pub fn observed(ip_address: &str, response_code: &str) -> Self {
        Self::new(ip_address, response_code, chrono::Utc::now().timestamp())
    }
}

/// What an upsert did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl UpsertOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
        }
    }
}

/// Repository for `ip_details` operations.
pub struct RecordRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RecordRepository<'a> {
    /// Create a new record repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the record, or update `response_code` and `updated_at` of the
    /// existing row for the same IP.
    ///
    /// Conflict resolution happens inside SQLite (`ON CONFLICT DO UPDATE`), so
    /// concurrent upserts for one IP never produce a second row. `id` and
    /// `created_at` of an existing row are kept, and `updated_at` never moves
    /// backwards.
    pub async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        let stored_id: String = sqlx::query_scalar(
            r#"
            INSERT INTO ip_details (uuid, ip_address, response_code, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(ip_address) DO UPDATE SET
                response_code = excluded.response_code,
                updated_at = MAX(ip_details.updated_at, excluded.updated_at)
            RETURNING uuid
            "#,
        )
        .bind(&record.id)
        .bind(&record.ip_address)
        .bind(&record.response_code)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if stored_id == record.id {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::Updated)
        }
    }

    /// Fetch the record for an IP address.
    pub async fn find(&self, ip_address: &str) -> Result<Record, DbError> {
        let row = sqlx::query_as::<_, (String, String, String, i64, i64)>(
            r#"
            SELECT uuid, ip_address, response_code, created_at, updated_at
            FROM ip_details
            WHERE ip_address = ?
            "#,
        )
        .bind(ip_address)
        .fetch_optional(self.pool)
        .await?;

        let (id, ip_address_db, response_code, created_at, updated_at) =
            row.ok_or_else(|| DbError::RecordNotFound(ip_address.to_string()))?;

        Ok(Record {
            id,
            ip_address: ip_address_db,
            response_code,
            created_at,
            updated_at,
        })
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ip_details")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
