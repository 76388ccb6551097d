//! Pass catalog repository: pass groups and pass types.

use super::user_repo::{parse_ts, parse_uuid};
use super::{DbError, DbPool};
use crate::pass::{PassGroup, PassType, PassTypeUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for the pass catalog.
#[async_trait]
pub trait PassCatalogRepository: Send + Sync {
    // Groups

    async fn create_group(&self, group: &PassGroup) -> Result<PassGroup, DbError>;

    async fn get_group(&self, id: Uuid) -> Result<Option<PassGroup>, DbError>;

    /// Lists groups by sort order, then name.
    async fn list_groups(&self, include_archived: bool) -> Result<Vec<PassGroup>, DbError>;

    async fn rename_group(&self, id: Uuid, name: &str, sort_order: i32)
        -> Result<PassGroup, DbError>;

    /// Archives a group. Fails with [`DbError::State`] while the group
    /// still has unarchived types.
    async fn archive_group(&self, id: Uuid) -> Result<(), DbError>;

    // Types

    async fn create_type(&self, pass_type: &PassType) -> Result<PassType, DbError>;

    async fn get_type(&self, id: Uuid) -> Result<Option<PassType>, DbError>;

    /// Lists types, optionally restricted to one group.
    async fn list_types(
        &self,
        group_id: Option<Uuid>,
        include_archived: bool,
    ) -> Result<Vec<PassType>, DbError>;

    async fn update_type(&self, id: Uuid, update: &PassTypeUpdate) -> Result<PassType, DbError>;

    async fn set_type_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError>;
}

pub fn create_pass_catalog_repository(pool: &DbPool) -> Box<dyn PassCatalogRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqlitePassCatalogRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgPassCatalogRepository::new(pool.clone())),
    }
}

const GROUP_COLUMNS: &str = "id, name, sort_order, is_archived, created_at, updated_at";
const TYPE_COLUMNS: &str =
    "id, group_id, name, cost_cents, duration_days, is_archived, created_at, updated_at";

/// SQLite implementation.
pub struct SqlitePassCatalogRepository {
    pool: sqlx::SqlitePool,
}

impl SqlitePassCatalogRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PassCatalogRepository for SqlitePassCatalogRepository {
    async fn create_group(&self, group: &PassGroup) -> Result<PassGroup, DbError> {
        sqlx::query(
            "INSERT INTO pass_groups (id, name, sort_order, is_archived, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(group.sort_order)
        .bind(group.is_archived)
        .bind(group.created_at.to_rfc3339())
        .bind(group.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(group.clone())
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<PassGroup>, DbError> {
        let row: Option<SqliteGroupRow> = sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM pass_groups WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_groups(&self, include_archived: bool) -> Result<Vec<PassGroup>, DbError> {
        let sql = if include_archived {
            format!("SELECT {GROUP_COLUMNS} FROM pass_groups ORDER BY sort_order ASC, name ASC")
        } else {
            format!(
                "SELECT {GROUP_COLUMNS} FROM pass_groups WHERE is_archived = 0 ORDER BY sort_order ASC, name ASC"
            )
        };

        let rows: Vec<SqliteGroupRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn rename_group(
        &self,
        id: Uuid,
        name: &str,
        sort_order: i32,
    ) -> Result<PassGroup, DbError> {
        let result = sqlx::query(
            "UPDATE pass_groups SET name = ?, sort_order = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(sort_order)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PassGroup", id));
        }

        self.get_group(id)
            .await?
            .ok_or_else(|| DbError::not_found("PassGroup", id))
    }

    async fn archive_group(&self, id: Uuid) -> Result<(), DbError> {
        let live_types: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pass_types WHERE group_id = ? AND is_archived = 0",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await?;

        if live_types > 0 {
            return Err(DbError::State(format!(
                "Group still has {live_types} active pass types"
            )));
        }

        let result =
            sqlx::query("UPDATE pass_groups SET is_archived = 1, updated_at = ? WHERE id = ?")
                .bind(Utc::now().to_rfc3339())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PassGroup", id));
        }
        Ok(())
    }

    async fn create_type(&self, pass_type: &PassType) -> Result<PassType, DbError> {
        sqlx::query(
            r#"
            INSERT INTO pass_types (id, group_id, name, cost_cents, duration_days, is_archived, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pass_type.id.to_string())
        .bind(pass_type.group_id.to_string())
        .bind(&pass_type.name)
        .bind(pass_type.cost_cents)
        .bind(pass_type.duration_days)
        .bind(pass_type.is_archived)
        .bind(pass_type.created_at.to_rfc3339())
        .bind(pass_type.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(pass_type.clone())
    }

    async fn get_type(&self, id: Uuid) -> Result<Option<PassType>, DbError> {
        let row: Option<SqliteTypeRow> =
            sqlx::query_as(&format!("SELECT {TYPE_COLUMNS} FROM pass_types WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_types(
        &self,
        group_id: Option<Uuid>,
        include_archived: bool,
    ) -> Result<Vec<PassType>, DbError> {
        let mut clause = String::from("1=1");
        let mut params: Vec<String> = Vec::new();

        if let Some(group_id) = group_id {
            clause.push_str(" AND group_id = ?");
            params.push(group_id.to_string());
        }
        if !include_archived {
            clause.push_str(" AND is_archived = 0");
        }

        let sql =
            format!("SELECT {TYPE_COLUMNS} FROM pass_types WHERE {clause} ORDER BY name ASC");
        let mut query = sqlx::query_as::<_, SqliteTypeRow>(&sql);
        for param in params {
            query = query.bind(param);
        }

        let rows: Vec<SqliteTypeRow> = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_type(&self, id: Uuid, update: &PassTypeUpdate) -> Result<PassType, DbError> {
        let existing = self
            .get_type(id)
            .await?
            .ok_or_else(|| DbError::not_found("PassType", id))?;

        let name = update.name.as_ref().unwrap_or(&existing.name);
        let group_id = update.group_id.unwrap_or(existing.group_id);
        let cost_cents = update.cost_cents.unwrap_or(existing.cost_cents);
        let duration_days = update.duration_days.unwrap_or(existing.duration_days);

        sqlx::query(
            "UPDATE pass_types SET name = ?, group_id = ?, cost_cents = ?, duration_days = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(group_id.to_string())
        .bind(cost_cents)
        .bind(duration_days)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get_type(id)
            .await?
            .ok_or_else(|| DbError::not_found("PassType", id))
    }

    async fn set_type_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE pass_types SET is_archived = ?, updated_at = ? WHERE id = ?")
                .bind(archived)
                .bind(Utc::now().to_rfc3339())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PassType", id));
        }
        Ok(())
    }
}

/// PostgreSQL implementation.
pub struct PgPassCatalogRepository {
    pool: sqlx::PgPool,
}

impl PgPassCatalogRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PassCatalogRepository for PgPassCatalogRepository {
    async fn create_group(&self, group: &PassGroup) -> Result<PassGroup, DbError> {
        sqlx::query(
            "INSERT INTO pass_groups (id, name, sort_order, is_archived, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.sort_order)
        .bind(group.is_archived)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(group.clone())
    }

    async fn get_group(&self, id: Uuid) -> Result<Option<PassGroup>, DbError> {
        let row: Option<PgGroupRow> = sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM pass_groups WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_groups(&self, include_archived: bool) -> Result<Vec<PassGroup>, DbError> {
        let sql = if include_archived {
            format!("SELECT {GROUP_COLUMNS} FROM pass_groups ORDER BY sort_order ASC, name ASC")
        } else {
            format!(
                "SELECT {GROUP_COLUMNS} FROM pass_groups WHERE is_archived = FALSE ORDER BY sort_order ASC, name ASC"
            )
        };

        let rows: Vec<PgGroupRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn rename_group(
        &self,
        id: Uuid,
        name: &str,
        sort_order: i32,
    ) -> Result<PassGroup, DbError> {
        let result = sqlx::query(
            "UPDATE pass_groups SET name = $1, sort_order = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(name)
        .bind(sort_order)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PassGroup", id));
        }

        self.get_group(id)
            .await?
            .ok_or_else(|| DbError::not_found("PassGroup", id))
    }

    async fn archive_group(&self, id: Uuid) -> Result<(), DbError> {
        let live_types: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pass_types WHERE group_id = $1 AND is_archived = FALSE",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if live_types > 0 {
            return Err(DbError::State(format!(
                "Group still has {live_types} active pass types"
            )));
        }

        let result =
            sqlx::query("UPDATE pass_groups SET is_archived = TRUE, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PassGroup", id));
        }
        Ok(())
    }

    async fn create_type(&self, pass_type: &PassType) -> Result<PassType, DbError> {
        sqlx::query(
            r#"
            INSERT INTO pass_types (id, group_id, name, cost_cents, duration_days, is_archived, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(pass_type.id)
        .bind(pass_type.group_id)
        .bind(&pass_type.name)
        .bind(pass_type.cost_cents)
        .bind(pass_type.duration_days)
        .bind(pass_type.is_archived)
        .bind(pass_type.created_at)
        .bind(pass_type.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(pass_type.clone())
    }

    async fn get_type(&self, id: Uuid) -> Result<Option<PassType>, DbError> {
        let row: Option<PgTypeRow> = sqlx::query_as(&format!(
            "SELECT {TYPE_COLUMNS} FROM pass_types WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_types(
        &self,
        group_id: Option<Uuid>,
        include_archived: bool,
    ) -> Result<Vec<PassType>, DbError> {
        let mut conditions = vec!["1=1".to_string()];
        let mut param_idx = 1;

        if group_id.is_some() {
            conditions.push(format!("group_id = ${param_idx}"));
            param_idx += 1;
        }
        if !include_archived {
            conditions.push("is_archived = FALSE".to_string());
        }
        let _ = param_idx;

        let sql = format!(
            "SELECT {TYPE_COLUMNS} FROM pass_types WHERE {} ORDER BY name ASC",
            conditions.join(" AND ")
        );
        let mut query = sqlx::query_as::<_, PgTypeRow>(&sql);
        if let Some(group_id) = group_id {
            query = query.bind(group_id);
        }

        let rows: Vec<PgTypeRow> = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_type(&self, id: Uuid, update: &PassTypeUpdate) -> Result<PassType, DbError> {
        let existing = self
            .get_type(id)
            .await?
            .ok_or_else(|| DbError::not_found("PassType", id))?;

        let name = update.name.as_ref().unwrap_or(&existing.name);
        let group_id = update.group_id.unwrap_or(existing.group_id);
        let cost_cents = update.cost_cents.unwrap_or(existing.cost_cents);
        let duration_days = update.duration_days.unwrap_or(existing.duration_days);

        sqlx::query(
            "UPDATE pass_types SET name = $1, group_id = $2, cost_cents = $3, duration_days = $4, updated_at = NOW() WHERE id = $5",
        )
        .bind(name)
        .bind(group_id)
        .bind(cost_cents)
        .bind(duration_days)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_type(id)
            .await?
            .ok_or_else(|| DbError::not_found("PassType", id))
    }

    async fn set_type_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE pass_types SET is_archived = $1, updated_at = NOW() WHERE id = $2")
                .bind(archived)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PassType", id));
        }
        Ok(())
    }
}

// Row-mapping helpers.

#[derive(sqlx::FromRow)]
struct SqliteGroupRow {
    id: String,
    name: String,
    sort_order: i32,
    is_archived: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqliteGroupRow> for PassGroup {
    type Error = DbError;

    fn try_from(row: SqliteGroupRow) -> Result<Self, Self::Error> {
        Ok(PassGroup {
            id: parse_uuid(&row.id)?,
            name: row.name,
            sort_order: row.sort_order,
            is_archived: row.is_archived,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgGroupRow {
    id: Uuid,
    name: String,
    sort_order: i32,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PgGroupRow> for PassGroup {
    type Error = DbError;

    fn try_from(row: PgGroupRow) -> Result<Self, Self::Error> {
        Ok(PassGroup {
            id: row.id,
            name: row.name,
            sort_order: row.sort_order,
            is_archived: row.is_archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SqliteTypeRow {
    id: String,
    group_id: String,
    name: String,
    cost_cents: i64,
    duration_days: i32,
    is_archived: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqliteTypeRow> for PassType {
    type Error = DbError;

    fn try_from(row: SqliteTypeRow) -> Result<Self, Self::Error> {
        Ok(PassType {
            id: parse_uuid(&row.id)?,
            group_id: parse_uuid(&row.group_id)?,
            name: row.name,
            cost_cents: row.cost_cents,
            duration_days: row.duration_days,
            is_archived: row.is_archived,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgTypeRow {
    id: Uuid,
    group_id: Uuid,
    name: String,
    cost_cents: i64,
    duration_days: i32,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PgTypeRow> for PassType {
    type Error = DbError;

    fn try_from(row: PgTypeRow) -> Result<Self, Self::Error> {
        Ok(PassType {
            id: row.id,
            group_id: row.group_id,
            name: row.name,
            cost_cents: row.cost_cents,
            duration_days: row.duration_days,
            is_archived: row.is_archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool_with_options, run_migrations, PoolOptions};

    async fn test_pool() -> DbPool {
        let url = format!(
            "sqlite:file:test_catalog_{}?mode=memory&cache=shared",
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
    async fn groups_sort_by_order_then_name() {
        let pool = test_pool().await;
        let repo = create_pass_catalog_repository(&pool);

        repo.create_group(&PassGroup::new("Zeta", 0)).await.unwrap();
        repo.create_group(&PassGroup::new("Alpha", 1)).await.unwrap();
        repo.create_group(&PassGroup::new("Beta", 0)).await.unwrap();

        let groups = repo.list_groups(false).await.unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Beta", "Zeta", "Alpha"]);
    }

    #[tokio::test]
    async fn same_type_name_allowed_across_groups() {
        let pool = test_pool().await;
        let repo = create_pass_catalog_repository(&pool);

        let g1 = PassGroup::new("Monthly", 0);
        let g2 = PassGroup::new("Daily", 1);
        repo.create_group(&g1).await.unwrap();
        repo.create_group(&g2).await.unwrap();

        repo.create_type(&PassType::new(g1.id, "Standard", 100_00, 30))
            .await
            .unwrap();
        repo.create_type(&PassType::new(g2.id, "Standard", 10_00, 1))
            .await
            .unwrap();

        // Duplicate inside the same group conflicts
        let dup = repo
            .create_type(&PassType::new(g1.id, "Standard", 120_00, 30))
            .await;
        assert!(matches!(dup, Err(DbError::Unique(_))));

        let in_g1 = repo.list_types(Some(g1.id), false).await.unwrap();
        assert_eq!(in_g1.len(), 1);
        let all = repo.list_types(None, false).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn archive_group_refuses_while_types_live() {
        let pool = test_pool().await;
        let repo = create_pass_catalog_repository(&pool);

        let group = PassGroup::new("Seasonal", 0);
        repo.create_group(&group).await.unwrap();
        let ty = PassType::new(group.id, "Summer", 300_00, 90);
        repo.create_type(&ty).await.unwrap();

        assert!(matches!(
            repo.archive_group(group.id).await,
            Err(DbError::State(_))
        ));

        repo.set_type_archived(ty.id, true).await.unwrap();
        repo.archive_group(group.id).await.unwrap();
        assert!(repo.list_groups(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_type_price() {
        let pool = test_pool().await;
        let repo = create_pass_catalog_repository(&pool);

        let group = PassGroup::new("Monthly", 0);
        repo.create_group(&group).await.unwrap();
        let ty = PassType::new(group.id, "Standard", 100_00, 30);
        repo.create_type(&ty).await.unwrap();

        let updated = repo
            .update_type(
                ty.id,
                &PassTypeUpdate {
                    cost_cents: Some(125_00),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.cost_cents, 125_00);
        assert_eq!(updated.duration_days, 30);
    }
}
