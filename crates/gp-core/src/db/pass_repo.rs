//! Issued pass repository.

use super::user_repo::{parse_date, parse_ts, parse_uuid};
use super::{make_like_pattern, DbError, DbPool, Page, PageRequest};
use crate::pass::{Pass, PassFilter, PassStatus};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Repository trait for issued passes.
#[async_trait]
pub trait PassRepository: Send + Sync {
    async fn create(&self, pass: &Pass) -> Result<Pass, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Pass>, DbError>;

    async fn get_by_number(&self, number: &str) -> Result<Option<Pass>, DbError>;

    async fn list(&self, filter: &PassFilter, page: &PageRequest) -> Result<Page<Pass>, DbError>;

    /// Transitions an open pass to closed.
    ///
    /// Fails with [`DbError::State`] if the pass is already closed and
    /// [`DbError::NotFound`] if it does not exist.
    async fn close(&self, id: Uuid) -> Result<Pass, DbError>;

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError>;
}

pub fn create_pass_repository(pool: &DbPool) -> Box<dyn PassRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqlitePassRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgPassRepository::new(pool.clone())),
    }
}

const PASS_COLUMNS: &str = "id, number, contractor_id, store_id, pass_type_id, transaction_id, starts_on, ends_on, status, is_archived, created_at, updated_at";

/// SQLite implementation.
pub struct SqlitePassRepository {
    pool: sqlx::SqlitePool,
}

impl SqlitePassRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PassRepository for SqlitePassRepository {
    async fn create(&self, pass: &Pass) -> Result<Pass, DbError> {
        sqlx::query(
            r#"
            INSERT INTO passes (id, number, contractor_id, store_id, pass_type_id, transaction_id, starts_on, ends_on, status, is_archived, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pass.id.to_string())
        .bind(&pass.number)
        .bind(pass.contractor_id.to_string())
        .bind(pass.store_id.to_string())
        .bind(pass.pass_type_id.to_string())
        .bind(pass.transaction_id.map(|u| u.to_string()))
        .bind(pass.starts_on.to_string())
        .bind(pass.ends_on.to_string())
        .bind(pass.status.as_str())
        .bind(pass.is_archived)
        .bind(pass.created_at.to_rfc3339())
        .bind(pass.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(pass.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Pass>, DbError> {
        let row: Option<SqlitePassRow> =
            sqlx::query_as(&format!("SELECT {PASS_COLUMNS} FROM passes WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_number(&self, number: &str) -> Result<Option<Pass>, DbError> {
        let row: Option<SqlitePassRow> = sqlx::query_as(&format!(
            "SELECT {PASS_COLUMNS} FROM passes WHERE number = ?"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &PassFilter, page: &PageRequest) -> Result<Page<Pass>, DbError> {
        let mut clause = String::from("1=1");
        let mut params: Vec<String> = Vec::new();

        if !filter.include_archived {
            clause.push_str(" AND is_archived = 0");
        }
        if let Some(contractor_id) = filter.contractor_id {
            clause.push_str(" AND contractor_id = ?");
            params.push(contractor_id.to_string());
        }
        if let Some(store_id) = filter.store_id {
            clause.push_str(" AND store_id = ?");
            params.push(store_id.to_string());
        }
        if let Some(status) = filter.status {
            clause.push_str(" AND status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(search) = &filter.search {
            clause.push_str(" AND number LIKE ? ESCAPE '\\'");
            params.push(make_like_pattern(search));
        }

        let count_sql = format!("SELECT COUNT(*) FROM passes WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {PASS_COLUMNS} FROM passes WHERE {clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query_as::<_, SqlitePassRow>(&page_sql);
        for param in &params {
            page_query = page_query.bind(param);
        }
        page_query = page_query.bind(page.limit()).bind(page.offset());

        let rows: Vec<SqlitePassRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<Pass>, DbError> = rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }

    async fn close(&self, id: Uuid) -> Result<Pass, DbError> {
        let result = sqlx::query(
            "UPDATE passes SET status = 'closed', updated_at = ? WHERE id = ? AND status = 'open'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing pass from one already closed.
            return match self.get(id).await? {
                Some(_) => Err(DbError::State("Pass is already closed".to_string())),
                None => Err(DbError::not_found("Pass", id)),
            };
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Pass", id))
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE passes SET is_archived = ?, updated_at = ? WHERE id = ?")
            .bind(archived)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Pass", id));
        }
        Ok(())
    }
}

/// PostgreSQL implementation.
pub struct PgPassRepository {
    pool: sqlx::PgPool,
}

impl PgPassRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PassRepository for PgPassRepository {
    async fn create(&self, pass: &Pass) -> Result<Pass, DbError> {
        sqlx::query(
            r#"
            INSERT INTO passes (id, number, contractor_id, store_id, pass_type_id, transaction_id, starts_on, ends_on, status, is_archived, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(pass.id)
        .bind(&pass.number)
        .bind(pass.contractor_id)
        .bind(pass.store_id)
        .bind(pass.pass_type_id)
        .bind(pass.transaction_id)
        .bind(pass.starts_on)
        .bind(pass.ends_on)
        .bind(pass.status.as_str())
        .bind(pass.is_archived)
        .bind(pass.created_at)
        .bind(pass.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(pass.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Pass>, DbError> {
        let row: Option<PgPassRow> =
            sqlx::query_as(&format!("SELECT {PASS_COLUMNS} FROM passes WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_number(&self, number: &str) -> Result<Option<Pass>, DbError> {
        let row: Option<PgPassRow> = sqlx::query_as(&format!(
            "SELECT {PASS_COLUMNS} FROM passes WHERE number = $1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &PassFilter, page: &PageRequest) -> Result<Page<Pass>, DbError> {
        let mut conditions = vec!["1=1".to_string()];
        let mut param_idx = 1;

        if !filter.include_archived {
            conditions.push("is_archived = FALSE".to_string());
        }
        if filter.contractor_id.is_some() {
            conditions.push(format!("contractor_id = ${param_idx}"));
            param_idx += 1;
        }
        if filter.store_id.is_some() {
            conditions.push(format!("store_id = ${param_idx}"));
            param_idx += 1;
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${param_idx}"));
            param_idx += 1;
        }
        if filter.search.is_some() {
            conditions.push(format!("number ILIKE ${param_idx} ESCAPE '\\'"));
            param_idx += 1;
        }
        let clause = conditions.join(" AND ");

        fn bind_filters<'q, O>(
            mut query: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
            filter: &'q PassFilter,
        ) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
            if let Some(contractor_id) = filter.contractor_id {
                query = query.bind(contractor_id);
            }
            if let Some(store_id) = filter.store_id {
                query = query.bind(store_id);
            }
            if let Some(status) = filter.status {
                query = query.bind(status.as_str());
            }
            if let Some(search) = &filter.search {
                query = query.bind(make_like_pattern(search));
            }
            query
        }

        let count_sql = format!("SELECT COUNT(*) FROM passes WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(contractor_id) = filter.contractor_id {
            count_query = count_query.bind(contractor_id);
        }
        if let Some(store_id) = filter.store_id {
            count_query = count_query.bind(store_id);
        }
        if let Some(status) = filter.status {
            count_query = count_query.bind(status.as_str());
        }
        if let Some(search) = &filter.search {
            count_query = count_query.bind(make_like_pattern(search));
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {PASS_COLUMNS} FROM passes WHERE {clause} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            param_idx,
            param_idx + 1
        );
        let page_query = bind_filters(sqlx::query_as::<_, PgPassRow>(&page_sql), filter)
            .bind(i64::from(page.limit()))
            .bind(i64::from(page.offset()));

        let rows: Vec<PgPassRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<Pass>, DbError> = rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }

    async fn close(&self, id: Uuid) -> Result<Pass, DbError> {
        let result = sqlx::query(
            "UPDATE passes SET status = 'closed', updated_at = NOW() WHERE id = $1 AND status = 'open'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(_) => Err(DbError::State("Pass is already closed".to_string())),
                None => Err(DbError::not_found("Pass", id)),
            };
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Pass", id))
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE passes SET is_archived = $1, updated_at = NOW() WHERE id = $2")
                .bind(archived)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Pass", id));
        }
        Ok(())
    }
}

// Row-mapping helpers.

fn parse_status(s: &str) -> Result<PassStatus, DbError> {
    s.parse::<PassStatus>()
        .map_err(|_| DbError::Serialization(format!("Invalid pass status: {s}")))
}

#[derive(sqlx::FromRow)]
struct SqlitePassRow {
    id: String,
    number: String,
    contractor_id: String,
    store_id: String,
    pass_type_id: String,
    transaction_id: Option<String>,
    starts_on: String,
    ends_on: String,
    status: String,
    is_archived: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqlitePassRow> for Pass {
    type Error = DbError;

    fn try_from(row: SqlitePassRow) -> Result<Self, Self::Error> {
        Ok(Pass {
            id: parse_uuid(&row.id)?,
            number: row.number,
            contractor_id: parse_uuid(&row.contractor_id)?,
            store_id: parse_uuid(&row.store_id)?,
            pass_type_id: parse_uuid(&row.pass_type_id)?,
            transaction_id: row.transaction_id.as_deref().map(parse_uuid).transpose()?,
            starts_on: parse_date(&row.starts_on)?,
            ends_on: parse_date(&row.ends_on)?,
            status: parse_status(&row.status)?,
            is_archived: row.is_archived,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgPassRow {
    id: Uuid,
    number: String,
    contractor_id: Uuid,
    store_id: Uuid,
    pass_type_id: Uuid,
    transaction_id: Option<Uuid>,
    starts_on: NaiveDate,
    ends_on: NaiveDate,
    status: String,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PgPassRow> for Pass {
    type Error = DbError;

    fn try_from(row: PgPassRow) -> Result<Self, Self::Error> {
        Ok(Pass {
            id: row.id,
            number: row.number,
            contractor_id: row.contractor_id,
            store_id: row.store_id,
            pass_type_id: row.pass_type_id,
            transaction_id: row.transaction_id,
            starts_on: row.starts_on,
            ends_on: row.ends_on,
            status: parse_status(&row.status)?,
            is_archived: row.is_archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
