//! Directory (reference catalog) repository.
//!
//! All seven catalogs live in one table distinguished by `kind`, so one
//! repository serves them all. Catalogs are small; listings are not
//! paginated.

use super::user_repo::{parse_ts, parse_uuid};
use super::{DbError, DbPool};
use crate::directory::{DirectoryEntry, DirectoryKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for directory entries.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn create(&self, entry: &DirectoryEntry) -> Result<DirectoryEntry, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<DirectoryEntry>, DbError>;

    async fn get_by_name(
        &self,
        kind: DirectoryKind,
        name: &str,
    ) -> Result<Option<DirectoryEntry>, DbError>;

    /// Lists a catalog in name order.
    async fn list(
        &self,
        kind: DirectoryKind,
        include_archived: bool,
    ) -> Result<Vec<DirectoryEntry>, DbError>;

    async fn rename(&self, id: Uuid, name: &str) -> Result<DirectoryEntry, DbError>;

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError>;
}

pub fn create_directory_repository(pool: &DbPool) -> Box<dyn DirectoryRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqliteDirectoryRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgDirectoryRepository::new(pool.clone())),
    }
}

const ENTRY_COLUMNS: &str = "id, kind, name, is_archived, created_at, updated_at";

/// SQLite implementation.
pub struct SqliteDirectoryRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteDirectoryRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryRepository for SqliteDirectoryRepository {
    async fn create(&self, entry: &DirectoryEntry) -> Result<DirectoryEntry, DbError> {
        sqlx::query(
            "INSERT INTO directory_entries (id, kind, name, is_archived, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.kind.as_str())
        .bind(&entry.name)
        .bind(entry.is_archived)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(entry.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DirectoryEntry>, DbError> {
        let row: Option<SqliteEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM directory_entries WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_name(
        &self,
        kind: DirectoryKind,
        name: &str,
    ) -> Result<Option<DirectoryEntry>, DbError> {
        let row: Option<SqliteEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM directory_entries WHERE kind = ? AND name = ?"
        ))
        .bind(kind.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        kind: DirectoryKind,
        include_archived: bool,
    ) -> Result<Vec<DirectoryEntry>, DbError> {
        let sql = if include_archived {
            format!("SELECT {ENTRY_COLUMNS} FROM directory_entries WHERE kind = ? ORDER BY name ASC")
        } else {
            format!(
                "SELECT {ENTRY_COLUMNS} FROM directory_entries WHERE kind = ? AND is_archived = 0 ORDER BY name ASC"
            )
        };

        let rows: Vec<SqliteEntryRow> = sqlx::query_as(&sql)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn rename(&self, id: Uuid, name: &str) -> Result<DirectoryEntry, DbError> {
        let result =
            sqlx::query("UPDATE directory_entries SET name = ?, updated_at = ? WHERE id = ?")
                .bind(name)
                .bind(Utc::now().to_rfc3339())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("DirectoryEntry", id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("DirectoryEntry", id))
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE directory_entries SET is_archived = ?, updated_at = ? WHERE id = ?")
                .bind(archived)
                .bind(Utc::now().to_rfc3339())
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("DirectoryEntry", id));
        }
        Ok(())
    }
}

/// PostgreSQL implementation.
pub struct PgDirectoryRepository {
    pool: sqlx::PgPool,
}

impl PgDirectoryRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryRepository for PgDirectoryRepository {
    async fn create(&self, entry: &DirectoryEntry) -> Result<DirectoryEntry, DbError> {
        sqlx::query(
            "INSERT INTO directory_entries (id, kind, name, is_archived, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(entry.kind.as_str())
        .bind(&entry.name)
        .bind(entry.is_archived)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(entry.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DirectoryEntry>, DbError> {
        let row: Option<PgEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM directory_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_name(
        &self,
        kind: DirectoryKind,
        name: &str,
    ) -> Result<Option<DirectoryEntry>, DbError> {
        let row: Option<PgEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM directory_entries WHERE kind = $1 AND name = $2"
        ))
        .bind(kind.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        kind: DirectoryKind,
        include_archived: bool,
    ) -> Result<Vec<DirectoryEntry>, DbError> {
        let sql = if include_archived {
            format!(
                "SELECT {ENTRY_COLUMNS} FROM directory_entries WHERE kind = $1 ORDER BY name ASC"
            )
        } else {
            format!(
                "SELECT {ENTRY_COLUMNS} FROM directory_entries WHERE kind = $1 AND is_archived = FALSE ORDER BY name ASC"
            )
        };

        let rows: Vec<PgEntryRow> = sqlx::query_as(&sql)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn rename(&self, id: Uuid, name: &str) -> Result<DirectoryEntry, DbError> {
        let result =
            sqlx::query("UPDATE directory_entries SET name = $1, updated_at = NOW() WHERE id = $2")
                .bind(name)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("DirectoryEntry", id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("DirectoryEntry", id))
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE directory_entries SET is_archived = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(archived)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("DirectoryEntry", id));
        }
        Ok(())
    }
}

// Row-mapping helpers.

fn parse_kind(s: &str) -> Result<DirectoryKind, DbError> {
    s.parse::<DirectoryKind>()
        .map_err(|_| DbError::Serialization(format!("Invalid directory kind: {s}")))
}

#[derive(sqlx::FromRow)]
struct SqliteEntryRow {
    id: String,
    kind: String,
    name: String,
    is_archived: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqliteEntryRow> for DirectoryEntry {
    type Error = DbError;

    fn try_from(row: SqliteEntryRow) -> Result<Self, Self::Error> {
        Ok(DirectoryEntry {
            id: parse_uuid(&row.id)?,
            kind: parse_kind(&row.kind)?,
            name: row.name,
            is_archived: row.is_archived,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgEntryRow {
    id: Uuid,
    kind: String,
    name: String,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PgEntryRow> for DirectoryEntry {
    type Error = DbError;

    fn try_from(row: PgEntryRow) -> Result<Self, Self::Error> {
        Ok(DirectoryEntry {
            id: row.id,
            kind: parse_kind(&row.kind)?,
            name: row.name,
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
            "sqlite:file:test_directories_{}?mode=memory&cache=shared",
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
    async fn kinds_are_isolated() {
        let pool = test_pool().await;
        let repo = create_directory_repository(&pool);

        repo.create(&DirectoryEntry::new(DirectoryKind::Building, "A"))
            .await
            .unwrap();
        repo.create(&DirectoryEntry::new(DirectoryKind::Floor, "A"))
            .await
            .unwrap();

        let buildings = repo.list(DirectoryKind::Building, false).await.unwrap();
        assert_eq!(buildings.len(), 1);
        assert_eq!(buildings[0].kind, DirectoryKind::Building);

        // Same name in a different kind is allowed
        let floors = repo.list(DirectoryKind::Floor, false).await.unwrap();
        assert_eq!(floors.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_within_kind_conflicts() {
        let pool = test_pool().await;
        let repo = create_directory_repository(&pool);

        repo.create(&DirectoryEntry::new(DirectoryKind::Position, "Seller"))
            .await
            .unwrap();
        let result = repo
            .create(&DirectoryEntry::new(DirectoryKind::Position, "Seller"))
            .await;
        assert!(matches!(result, Err(DbError::Unique(_))));
    }

    #[tokio::test]
    async fn rename_and_archive() {
        let pool = test_pool().await;
        let repo = create_directory_repository(&pool);

        let entry = DirectoryEntry::new(DirectoryKind::Line, "Line 1");
        repo.create(&entry).await.unwrap();

        let renamed = repo.rename(entry.id, "Line 1a").await.unwrap();
        assert_eq!(renamed.name, "Line 1a");

        repo.set_archived(entry.id, true).await.unwrap();
        assert!(repo.list(DirectoryKind::Line, false).await.unwrap().is_empty());
        assert_eq!(repo.list(DirectoryKind::Line, true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_missing_entry_is_not_found() {
        let pool = test_pool().await;
        let repo = create_directory_repository(&pool);

        assert!(matches!(
            repo.rename(Uuid::new_v4(), "anything").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
