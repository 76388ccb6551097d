//! Report repository.
//!
//! Reports are read-only aggregates computed by SQL at request time; no
//! derived tables or cached totals are maintained.

use super::user_repo::parse_uuid;
use super::{DbError, DbPool};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Period totals across the till and the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub transactions: u64,
    pub revenue_cents: i64,
    pub passes_issued: u64,
    pub tokens_served: u64,
}

/// Revenue and sales counts for one pass type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassTypeRevenue {
    pub pass_type_id: Uuid,
    pub name: String,
    pub passes_sold: u64,
    pub revenue_cents: i64,
}

/// An open pass whose validity ends inside the report window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiringPass {
    pub pass_id: Uuid,
    pub number: String,
    pub contractor_name: String,
    pub store_name: String,
    pub ends_on: NaiveDate,
}

/// Repository trait for reports.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Totals for `from..until`.
    async fn summary(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<SummaryReport, DbError>;

    /// Revenue grouped by pass type for `from..until`, highest revenue
    /// first.
    async fn revenue_by_pass_type(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<PassTypeRevenue>, DbError>;

    /// Open passes ending between `today` and `today + within_days`,
    /// soonest first.
    async fn expiring_passes(
        &self,
        today: NaiveDate,
        within_days: u32,
    ) -> Result<Vec<ExpiringPass>, DbError>;
}

pub fn create_report_repository(pool: &DbPool) -> Box<dyn ReportRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqliteReportRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgReportRepository::new(pool.clone())),
    }
}

/// SQLite implementation.
pub struct SqliteReportRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteReportRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn summary(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<SummaryReport, DbError> {
        let from = from.to_rfc3339();
        let until = until.to_rfc3339();

        let (transactions, revenue_cents): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total_cents), 0) FROM pass_transactions WHERE created_at >= ? AND created_at < ?",
        )
        .bind(&from)
        .bind(&until)
        .fetch_one(&self.pool)
        .await?;

        let passes_issued: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM passes WHERE created_at >= ? AND created_at < ?",
        )
        .bind(&from)
        .bind(&until)
        .fetch_one(&self.pool)
        .await?;

        let tokens_served: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_tokens WHERE status = 'closed' AND closed_at >= ? AND closed_at < ?",
        )
        .bind(&from)
        .bind(&until)
        .fetch_one(&self.pool)
        .await?;

        Ok(SummaryReport {
            transactions: transactions as u64,
            revenue_cents,
            passes_issued: passes_issued as u64,
            tokens_served: tokens_served as u64,
        })
    }

    async fn revenue_by_pass_type(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<PassTypeRevenue>, DbError> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT pt.id, pt.name, COUNT(p.id), COALESCE(SUM(pt.cost_cents), 0)
            FROM passes p
            JOIN pass_types pt ON pt.id = p.pass_type_id
            WHERE p.created_at >= ? AND p.created_at < ?
            GROUP BY pt.id, pt.name
            ORDER BY SUM(pt.cost_cents) DESC
            "#,
        )
        .bind(from.to_rfc3339())
        .bind(until.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, name, sold, revenue)| {
                Ok(PassTypeRevenue {
                    pass_type_id: parse_uuid(&id)?,
                    name,
                    passes_sold: sold as u64,
                    revenue_cents: revenue,
                })
            })
            .collect()
    }

    async fn expiring_passes(
        &self,
        today: NaiveDate,
        within_days: u32,
    ) -> Result<Vec<ExpiringPass>, DbError> {
        let cutoff = today + chrono::Duration::days(i64::from(within_days));

        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT p.id, p.number, c.full_name, s.name, p.ends_on
            FROM passes p
            JOIN contractors c ON c.id = p.contractor_id
            JOIN stores s ON s.id = p.store_id
            WHERE p.status = 'open' AND p.ends_on >= ? AND p.ends_on <= ?
            ORDER BY p.ends_on ASC
            "#,
        )
        .bind(today.to_string())
        .bind(cutoff.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, number, contractor_name, store_name, ends_on)| {
                Ok(ExpiringPass {
                    pass_id: parse_uuid(&id)?,
                    number,
                    contractor_name,
                    store_name,
                    ends_on: ends_on.parse().map_err(|e| {
                        DbError::Serialization(format!("Invalid date: {e}"))
                    })?,
                })
            })
            .collect()
    }
}

/// PostgreSQL implementation.
pub struct PgReportRepository {
    pool: sqlx::PgPool,
}

impl PgReportRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn summary(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<SummaryReport, DbError> {
        let (transactions, revenue_cents): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total_cents), 0)::BIGINT FROM pass_transactions WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;

        let passes_issued: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM passes WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(from)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;

        let tokens_served: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_tokens WHERE status = 'closed' AND closed_at >= $1 AND closed_at < $2",
        )
        .bind(from)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;

        Ok(SummaryReport {
            transactions: transactions as u64,
            revenue_cents,
            passes_issued: passes_issued as u64,
            tokens_served: tokens_served as u64,
        })
    }

    async fn revenue_by_pass_type(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<PassTypeRevenue>, DbError> {
        let rows: Vec<(Uuid, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT pt.id, pt.name, COUNT(p.id), COALESCE(SUM(pt.cost_cents), 0)::BIGINT
            FROM passes p
            JOIN pass_types pt ON pt.id = p.pass_type_id
            WHERE p.created_at >= $1 AND p.created_at < $2
            GROUP BY pt.id, pt.name
            ORDER BY SUM(pt.cost_cents) DESC
            "#,
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(pass_type_id, name, sold, revenue)| PassTypeRevenue {
                pass_type_id,
                name,
                passes_sold: sold as u64,
                revenue_cents: revenue,
            })
            .collect())
    }

    async fn expiring_passes(
        &self,
        today: NaiveDate,
        within_days: u32,
    ) -> Result<Vec<ExpiringPass>, DbError> {
        let cutoff = today + chrono::Duration::days(i64::from(within_days));

        let rows: Vec<(Uuid, String, String, String, NaiveDate)> = sqlx::query_as(
            r#"
            SELECT p.id, p.number, c.full_name, s.name, p.ends_on
            FROM passes p
            JOIN contractors c ON c.id = p.contractor_id
            JOIN stores s ON s.id = p.store_id
            WHERE p.status = 'open' AND p.ends_on >= $1 AND p.ends_on <= $2
            ORDER BY p.ends_on ASC
            "#,
        )
        .bind(today)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(pass_id, number, contractor_name, store_name, ends_on)| ExpiringPass {
                    pass_id,
                    number,
                    contractor_name,
                    store_name,
                    ends_on,
                },
            )
            .collect())
    }
}
