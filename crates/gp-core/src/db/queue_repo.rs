//! Queue token repository.
//!
//! Tokens are numbered sequentially within their issue day. The number
//! is assigned inside the same database transaction as the insert:
//! SQLite serializes writers on its own, and the PostgreSQL
//! implementation takes a transaction-scoped advisory lock, so two
//! concurrent issuances cannot draw the same number.

use super::user_repo::{parse_ts, parse_uuid};
use super::{DbError, DbPool};
use crate::queue::{QueueToken, QueueTokenFilter, TokenStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for queue tokens.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Inserts the token, assigning its per-day number.
    ///
    /// Fails with [`DbError::State`] if the issuing user already holds an
    /// active token of the same kind.
    async fn issue(&self, token: &QueueToken) -> Result<QueueToken, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<QueueToken>, DbError>;

    /// Lists tokens, oldest active first.
    async fn list(&self, filter: &QueueTokenFilter) -> Result<Vec<QueueToken>, DbError>;

    /// Transitions a token Active → Closed, stamping who closed it and
    /// when.
    ///
    /// Fails with [`DbError::State`] if the token is already closed and
    /// [`DbError::NotFound`] if it does not exist.
    async fn close(&self, id: Uuid, closed_by: Uuid) -> Result<QueueToken, DbError>;

    /// The caller's active token of the given kind, if any.
    async fn active_for(&self, user_id: Uuid, kind: &str)
        -> Result<Option<QueueToken>, DbError>;
}

pub fn create_queue_repository(pool: &DbPool) -> Box<dyn QueueRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqliteQueueRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgQueueRepository::new(pool.clone())),
    }
}

const TOKEN_COLUMNS: &str =
    "id, number, kind, issued_by, status, created_at, closed_at, closed_by";

/// SQLite implementation.
pub struct SqliteQueueRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn issue(&self, token: &QueueToken) -> Result<QueueToken, DbError> {
        let mut tx = self.pool.begin().await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_tokens WHERE issued_by = ? AND kind = ? AND status = 'active'",
        )
        .bind(token.issued_by.to_string())
        .bind(&token.kind)
        .fetch_one(&mut *tx)
        .await?;

        if active > 0 {
            return Err(DbError::State(format!(
                "User already holds an active '{}' token",
                token.kind
            )));
        }

        let day = token.created_at.format("%Y-%m-%d").to_string();
        let number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(number), 0) + 1 FROM queue_tokens WHERE substr(created_at, 1, 10) = ?",
        )
        .bind(&day)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO queue_tokens (id, number, kind, issued_by, status, created_at, closed_at, closed_by)
            VALUES (?, ?, ?, ?, ?, ?, NULL, NULL)
            "#,
        )
        .bind(token.id.to_string())
        .bind(number)
        .bind(&token.kind)
        .bind(token.issued_by.to_string())
        .bind(token.status.as_str())
        .bind(token.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut issued = token.clone();
        issued.number = number;
        Ok(issued)
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueToken>, DbError> {
        let row: Option<SqliteTokenRow> = sqlx::query_as(&format!(
            "SELECT {TOKEN_COLUMNS} FROM queue_tokens WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &QueueTokenFilter) -> Result<Vec<QueueToken>, DbError> {
        let mut clause = String::from("1=1");
        let mut params: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            clause.push_str(" AND status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(kind) = &filter.kind {
            clause.push_str(" AND kind = ?");
            params.push(kind.clone());
        }
        if let Some(issued_by) = filter.issued_by {
            clause.push_str(" AND issued_by = ?");
            params.push(issued_by.to_string());
        }
        if filter.today_only {
            clause.push_str(" AND substr(created_at, 1, 10) = ?");
            params.push(Utc::now().format("%Y-%m-%d").to_string());
        }

        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM queue_tokens WHERE {clause} ORDER BY created_at ASC"
        );
        let mut query = sqlx::query_as::<_, SqliteTokenRow>(&sql);
        for param in params {
            query = query.bind(param);
        }

        let rows: Vec<SqliteTokenRow> = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn close(&self, id: Uuid, closed_by: Uuid) -> Result<QueueToken, DbError> {
        let result = sqlx::query(
            "UPDATE queue_tokens SET status = 'closed', closed_at = ?, closed_by = ? WHERE id = ? AND status = 'active'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(closed_by.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(_) => Err(DbError::State("Token is already closed".to_string())),
                None => Err(DbError::not_found("QueueToken", id)),
            };
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("QueueToken", id))
    }

    async fn active_for(
        &self,
        user_id: Uuid,
        kind: &str,
    ) -> Result<Option<QueueToken>, DbError> {
        let row: Option<SqliteTokenRow> = sqlx::query_as(&format!(
            "SELECT {TOKEN_COLUMNS} FROM queue_tokens WHERE issued_by = ? AND kind = ? AND status = 'active' LIMIT 1"
        ))
        .bind(user_id.to_string())
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}

/// PostgreSQL implementation.
pub struct PgQueueRepository {
    pool: sqlx::PgPool,
}

impl PgQueueRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueRepository for PgQueueRepository {
    async fn issue(&self, token: &QueueToken) -> Result<QueueToken, DbError> {
        let mut tx = self.pool.begin().await?;

        // Serialize number assignment across concurrent issuers. The lock
        // is released automatically at commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('queue_tokens_numbering'))")
            .execute(&mut *tx)
            .await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_tokens WHERE issued_by = $1 AND kind = $2 AND status = 'active'",
        )
        .bind(token.issued_by)
        .bind(&token.kind)
        .fetch_one(&mut *tx)
        .await?;

        if active > 0 {
            return Err(DbError::State(format!(
                "User already holds an active '{}' token",
                token.kind
            )));
        }

        let number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(number), 0) + 1 FROM queue_tokens WHERE created_at::date = $1::date",
        )
        .bind(token.created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO queue_tokens (id, number, kind, issued_by, status, created_at, closed_at, closed_by)
            VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL)
            "#,
        )
        .bind(token.id)
        .bind(number)
        .bind(&token.kind)
        .bind(token.issued_by)
        .bind(token.status.as_str())
        .bind(token.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut issued = token.clone();
        issued.number = number;
        Ok(issued)
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueToken>, DbError> {
        let row: Option<PgTokenRow> = sqlx::query_as(&format!(
            "SELECT {TOKEN_COLUMNS} FROM queue_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &QueueTokenFilter) -> Result<Vec<QueueToken>, DbError> {
        let mut conditions = vec!["1=1".to_string()];
        let mut param_idx = 1;

        if filter.status.is_some() {
            conditions.push(format!("status = ${param_idx}"));
            param_idx += 1;
        }
        if filter.kind.is_some() {
            conditions.push(format!("kind = ${param_idx}"));
            param_idx += 1;
        }
        if filter.issued_by.is_some() {
            conditions.push(format!("issued_by = ${param_idx}"));
            param_idx += 1;
        }
        if filter.today_only {
            conditions.push("created_at::date = CURRENT_DATE".to_string());
        }
        let _ = param_idx;

        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM queue_tokens WHERE {} ORDER BY created_at ASC",
            conditions.join(" AND ")
        );
        let mut query = sqlx::query_as::<_, PgTokenRow>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(kind) = &filter.kind {
            query = query.bind(kind);
        }
        if let Some(issued_by) = filter.issued_by {
            query = query.bind(issued_by);
        }

        let rows: Vec<PgTokenRow> = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn close(&self, id: Uuid, closed_by: Uuid) -> Result<QueueToken, DbError> {
        let result = sqlx::query(
            "UPDATE queue_tokens SET status = 'closed', closed_at = NOW(), closed_by = $1 WHERE id = $2 AND status = 'active'",
        )
        .bind(closed_by)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(_) => Err(DbError::State("Token is already closed".to_string())),
                None => Err(DbError::not_found("QueueToken", id)),
            };
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("QueueToken", id))
    }

    async fn active_for(
        &self,
        user_id: Uuid,
        kind: &str,
    ) -> Result<Option<QueueToken>, DbError> {
        let row: Option<PgTokenRow> = sqlx::query_as(&format!(
            "SELECT {TOKEN_COLUMNS} FROM queue_tokens WHERE issued_by = $1 AND kind = $2 AND status = 'active' LIMIT 1"
        ))
        .bind(user_id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}

// Row-mapping helpers.

fn parse_status(s: &str) -> Result<TokenStatus, DbError> {
    s.parse::<TokenStatus>()
        .map_err(|_| DbError::Serialization(format!("Invalid token status: {s}")))
}

#[derive(sqlx::FromRow)]
struct SqliteTokenRow {
    id: String,
    number: i64,
    kind: String,
    issued_by: String,
    status: String,
    created_at: String,
    closed_at: Option<String>,
    closed_by: Option<String>,
}

impl TryFrom<SqliteTokenRow> for QueueToken {
    type Error = DbError;

    fn try_from(row: SqliteTokenRow) -> Result<Self, Self::Error> {
        Ok(QueueToken {
            id: parse_uuid(&row.id)?,
            number: row.number,
            kind: row.kind,
            issued_by: parse_uuid(&row.issued_by)?,
            status: parse_status(&row.status)?,
            created_at: parse_ts(&row.created_at)?,
            closed_at: row.closed_at.as_deref().map(parse_ts).transpose()?,
            closed_by: row.closed_by.as_deref().map(parse_uuid).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgTokenRow {
    id: Uuid,
    number: i64,
    kind: String,
    issued_by: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    closed_by: Option<Uuid>,
}

impl TryFrom<PgTokenRow> for QueueToken {
    type Error = DbError;

    fn try_from(row: PgTokenRow) -> Result<Self, Self::Error> {
        Ok(QueueToken {
            id: row.id,
            number: row.number,
            kind: row.kind,
            issued_by: row.issued_by,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            closed_at: row.closed_at,
            closed_by: row.closed_by,
        })
    }
}
