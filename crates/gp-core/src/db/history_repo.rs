//! Change history repository.

use super::user_repo::{parse_ts, parse_uuid};
use super::{DbError, DbPool, Page, PageRequest};
use crate::history::{EntityKind, HistoryAction, HistoryEntry, HistoryFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for the append-only history log.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), DbError>;

    /// Lists entries, newest first.
    async fn list(
        &self,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<Page<HistoryEntry>, DbError>;
}

pub fn create_history_repository(pool: &DbPool) -> Box<dyn HistoryRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqliteHistoryRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgHistoryRepository::new(pool.clone())),
    }
}

const HISTORY_COLUMNS: &str = "id, entity_kind, entity_id, action, actor, details, created_at";

/// SQLite implementation.
pub struct SqliteHistoryRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), DbError> {
        let details = entry
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO history (id, entity_kind, entity_id, action, actor, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.entity_kind.as_str())
        .bind(entry.entity_id.to_string())
        .bind(entry.action.as_str())
        .bind(&entry.actor)
        .bind(details)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<Page<HistoryEntry>, DbError> {
        let mut clause = String::from("1=1");
        let mut params: Vec<String> = Vec::new();

        if let Some(kind) = filter.entity_kind {
            clause.push_str(" AND entity_kind = ?");
            params.push(kind.as_str().to_string());
        }
        if let Some(entity_id) = filter.entity_id {
            clause.push_str(" AND entity_id = ?");
            params.push(entity_id.to_string());
        }
        if let Some(actor) = &filter.actor {
            clause.push_str(" AND actor = ?");
            params.push(actor.clone());
        }
        if let Some(since) = filter.since {
            clause.push_str(" AND created_at >= ?");
            params.push(since.to_rfc3339());
        }
        if let Some(until) = filter.until {
            clause.push_str(" AND created_at < ?");
            params.push(until.to_rfc3339());
        }

        let count_sql = format!("SELECT COUNT(*) FROM history WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM history WHERE {clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query_as::<_, SqliteHistoryRow>(&page_sql);
        for param in &params {
            page_query = page_query.bind(param);
        }
        page_query = page_query.bind(page.limit()).bind(page.offset());

        let rows: Vec<SqliteHistoryRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<HistoryEntry>, DbError> =
            rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }
}

/// PostgreSQL implementation.
pub struct PgHistoryRepository {
    pool: sqlx::PgPool,
}

impl PgHistoryRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for PgHistoryRepository {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO history (id, entity_kind, entity_id, action, actor, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.entity_kind.as_str())
        .bind(entry.entity_id)
        .bind(entry.action.as_str())
        .bind(&entry.actor)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        filter: &HistoryFilter,
        page: &PageRequest,
    ) -> Result<Page<HistoryEntry>, DbError> {
        let mut conditions = vec!["1=1".to_string()];
        let mut param_idx = 1;

        if filter.entity_kind.is_some() {
            conditions.push(format!("entity_kind = ${param_idx}"));
            param_idx += 1;
        }
        if filter.entity_id.is_some() {
            conditions.push(format!("entity_id = ${param_idx}"));
            param_idx += 1;
        }
        if filter.actor.is_some() {
            conditions.push(format!("actor = ${param_idx}"));
            param_idx += 1;
        }
        if filter.since.is_some() {
            conditions.push(format!("created_at >= ${param_idx}"));
            param_idx += 1;
        }
        if filter.until.is_some() {
            conditions.push(format!("created_at < ${param_idx}"));
            param_idx += 1;
        }
        let clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM history WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(kind) = filter.entity_kind {
            count_query = count_query.bind(kind.as_str());
        }
        if let Some(entity_id) = filter.entity_id {
            count_query = count_query.bind(entity_id);
        }
        if let Some(actor) = &filter.actor {
            count_query = count_query.bind(actor);
        }
        if let Some(since) = filter.since {
            count_query = count_query.bind(since);
        }
        if let Some(until) = filter.until {
            count_query = count_query.bind(until);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM history WHERE {clause} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            param_idx,
            param_idx + 1
        );
        let mut page_query = sqlx::query_as::<_, PgHistoryRow>(&page_sql);
        if let Some(kind) = filter.entity_kind {
            page_query = page_query.bind(kind.as_str());
        }
        if let Some(entity_id) = filter.entity_id {
            page_query = page_query.bind(entity_id);
        }
        if let Some(actor) = &filter.actor {
            page_query = page_query.bind(actor);
        }
        if let Some(since) = filter.since {
            page_query = page_query.bind(since);
        }
        if let Some(until) = filter.until {
            page_query = page_query.bind(until);
        }
        page_query = page_query
            .bind(i64::from(page.limit()))
            .bind(i64::from(page.offset()));

        let rows: Vec<PgHistoryRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<HistoryEntry>, DbError> =
            rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }
}

// Row-mapping helpers.

fn parse_entity_kind(s: &str) -> Result<EntityKind, DbError> {
    s.parse::<EntityKind>()
        .map_err(|_| DbError::Serialization(format!("Invalid entity kind: {s}")))
}

fn parse_action(s: &str) -> Result<HistoryAction, DbError> {
    s.parse::<HistoryAction>()
        .map_err(|_| DbError::Serialization(format!("Invalid history action: {s}")))
}

#[derive(sqlx::FromRow)]
struct SqliteHistoryRow {
    id: String,
    entity_kind: String,
    entity_id: String,
    action: String,
    actor: String,
    details: Option<String>,
    created_at: String,
}

impl TryFrom<SqliteHistoryRow> for HistoryEntry {
    type Error = DbError;

    fn try_from(row: SqliteHistoryRow) -> Result<Self, Self::Error> {
        let details = row
            .details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(HistoryEntry {
            id: parse_uuid(&row.id)?,
            entity_kind: parse_entity_kind(&row.entity_kind)?,
            entity_id: parse_uuid(&row.entity_id)?,
            action: parse_action(&row.action)?,
            actor: row.actor,
            details,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgHistoryRow {
    id: Uuid,
    entity_kind: String,
    entity_id: Uuid,
    action: String,
    actor: String,
    details: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PgHistoryRow> for HistoryEntry {
    type Error = DbError;

    fn try_from(row: PgHistoryRow) -> Result<Self, Self::Error> {
        Ok(HistoryEntry {
            id: row.id,
            entity_kind: parse_entity_kind(&row.entity_kind)?,
            entity_id: row.entity_id,
            action: parse_action(&row.action)?,
            actor: row.actor,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool_with_options, run_migrations, PoolOptions};

    async fn test_pool() -> DbPool {
        let url = format!(
            "sqlite:file:test_history_{}?mode=memory&cache=shared",
            Uuid::new_v4()
        );
        let pool = create_pool_with_options(
            &url,
            PoolOptions {
                max_connections: 1,
                min_connections: 1,
                ..PoolOptions::default()
            },
        )
        .await
        .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn record_and_filter_by_entity() {
        let pool = test_pool().await;
        let repo = create_history_repository(&pool);

        let contractor_id = Uuid::new_v4();
        repo.record(
            &HistoryEntry::new(
                EntityKind::Contractor,
                contractor_id,
                HistoryAction::Created,
                "admin",
            )
            .with_details(serde_json::json!({"passport_number": "AA0000001"})),
        )
        .await
        .unwrap();
        repo.record(&HistoryEntry::new(
            EntityKind::Store,
            Uuid::new_v4(),
            HistoryAction::Created,
            "admin",
        ))
        .await
        .unwrap();

        let page = repo
            .list(
                &HistoryFilter {
                    entity_kind: Some(EntityKind::Contractor),
                    entity_id: Some(contractor_id),
                    ..Default::default()
                },
                &PageRequest::default(),
            )
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        let entry = &page.items[0];
        assert_eq!(entry.action, HistoryAction::Created);
        assert_eq!(
            entry.details.as_ref().unwrap()["passport_number"],
            "AA0000001"
        );
    }

    #[tokio::test]
    async fn filter_by_actor() {
        let pool = test_pool().await;
        let repo = create_history_repository(&pool);

        for actor in ["admin", "kassir1", "kassir1"] {
            repo.record(&HistoryEntry::new(
                EntityKind::Pass,
                Uuid::new_v4(),
                HistoryAction::Created,
                actor,
            ))
            .await
            .unwrap();
        }

        let page = repo
            .list(
                &HistoryFilter {
                    actor: Some("kassir1".to_string()),
                    ..Default::default()
                },
                &PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }
}
