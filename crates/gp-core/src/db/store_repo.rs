//! Store repository.

use super::user_repo::{parse_ts, parse_uuid};
use super::{make_like_pattern, DbError, DbPool, Page, PageRequest};
use crate::store::{Store, StoreFilter, StoreUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for store persistence.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn create(&self, store: &Store) -> Result<Store, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Store>, DbError>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Store>, DbError>;

    async fn list(&self, filter: &StoreFilter, page: &PageRequest) -> Result<Page<Store>, DbError>;

    async fn update(&self, id: Uuid, update: &StoreUpdate) -> Result<Store, DbError>;

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError>;
}

pub fn create_store_repository(pool: &DbPool) -> Box<dyn StoreRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqliteStoreRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgStoreRepository::new(pool.clone())),
    }
}

const STORE_COLUMNS: &str = "id, name, store_number_id, building_id, floor_id, line_id, owner_name, contact_phone, is_archived, created_at, updated_at";

/// SQLite implementation.
pub struct SqliteStoreRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteStoreRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreRepository for SqliteStoreRepository {
    async fn create(&self, store: &Store) -> Result<Store, DbError> {
        sqlx::query(
            r#"
            INSERT INTO stores (id, name, store_number_id, building_id, floor_id, line_id, owner_name, contact_phone, is_archived, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(store.id.to_string())
        .bind(&store.name)
        .bind(store.store_number_id.map(|u| u.to_string()))
        .bind(store.building_id.map(|u| u.to_string()))
        .bind(store.floor_id.map(|u| u.to_string()))
        .bind(store.line_id.map(|u| u.to_string()))
        .bind(&store.owner_name)
        .bind(&store.contact_phone)
        .bind(store.is_archived)
        .bind(store.created_at.to_rfc3339())
        .bind(store.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(store.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Store>, DbError> {
        let row: Option<SqliteStoreRow> =
            sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Store>, DbError> {
        let row: Option<SqliteStoreRow> =
            sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE name = ?"))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &StoreFilter, page: &PageRequest) -> Result<Page<Store>, DbError> {
        let mut clause = String::from("1=1");
        let mut params: Vec<String> = Vec::new();

        if !filter.include_archived {
            clause.push_str(" AND is_archived = 0");
        }
        if let Some(building_id) = filter.building_id {
            clause.push_str(" AND building_id = ?");
            params.push(building_id.to_string());
        }
        if let Some(search) = &filter.search {
            clause.push_str(" AND (name LIKE ? ESCAPE '\\' OR owner_name LIKE ? ESCAPE '\\')");
            let pattern = make_like_pattern(search);
            params.push(pattern.clone());
            params.push(pattern);
        }

        let count_sql = format!("SELECT COUNT(*) FROM stores WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE {clause} ORDER BY name ASC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query_as::<_, SqliteStoreRow>(&page_sql);
        for param in &params {
            page_query = page_query.bind(param);
        }
        page_query = page_query.bind(page.limit()).bind(page.offset());

        let rows: Vec<SqliteStoreRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<Store>, DbError> = rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }

    async fn update(&self, id: Uuid, update: &StoreUpdate) -> Result<Store, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Store", id))?;

        let name = update.name.as_ref().unwrap_or(&existing.name);
        let store_number_id = resolve(&update.store_number_id, &existing.store_number_id);
        let building_id = resolve(&update.building_id, &existing.building_id);
        let floor_id = resolve(&update.floor_id, &existing.floor_id);
        let line_id = resolve(&update.line_id, &existing.line_id);
        let owner_name = resolve(&update.owner_name, &existing.owner_name);
        let contact_phone = resolve(&update.contact_phone, &existing.contact_phone);

        sqlx::query(
            r#"
            UPDATE stores
            SET name = ?, store_number_id = ?, building_id = ?, floor_id = ?, line_id = ?, owner_name = ?, contact_phone = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(store_number_id.map(|u| u.to_string()))
        .bind(building_id.map(|u| u.to_string()))
        .bind(floor_id.map(|u| u.to_string()))
        .bind(line_id.map(|u| u.to_string()))
        .bind(&owner_name)
        .bind(&contact_phone)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Store", id))
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE stores SET is_archived = ?, updated_at = ? WHERE id = ?")
            .bind(archived)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Store", id));
        }
        Ok(())
    }
}

/// PostgreSQL implementation.
pub struct PgStoreRepository {
    pool: sqlx::PgPool,
}

impl PgStoreRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    async fn create(&self, store: &Store) -> Result<Store, DbError> {
        sqlx::query(
            r#"
            INSERT INTO stores (id, name, store_number_id, building_id, floor_id, line_id, owner_name, contact_phone, is_archived, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(store.id)
        .bind(&store.name)
        .bind(store.store_number_id)
        .bind(store.building_id)
        .bind(store.floor_id)
        .bind(store.line_id)
        .bind(&store.owner_name)
        .bind(&store.contact_phone)
        .bind(store.is_archived)
        .bind(store.created_at)
        .bind(store.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(store.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Store>, DbError> {
        let row: Option<PgStoreRow> =
            sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Store>, DbError> {
        let row: Option<PgStoreRow> =
            sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE name = $1"))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &StoreFilter, page: &PageRequest) -> Result<Page<Store>, DbError> {
        let mut conditions = vec!["1=1".to_string()];
        let mut param_idx = 1;

        if !filter.include_archived {
            conditions.push("is_archived = FALSE".to_string());
        }
        if filter.building_id.is_some() {
            conditions.push(format!("building_id = ${param_idx}"));
            param_idx += 1;
        }
        if filter.search.is_some() {
            conditions.push(format!(
                "(name ILIKE ${} ESCAPE '\\' OR owner_name ILIKE ${} ESCAPE '\\')",
                param_idx,
                param_idx + 1
            ));
            param_idx += 2;
        }
        let clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM stores WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(building_id) = filter.building_id {
            count_query = count_query.bind(building_id);
        }
        if let Some(search) = &filter.search {
            let pattern = make_like_pattern(search);
            count_query = count_query.bind(pattern.clone()).bind(pattern);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE {clause} ORDER BY name ASC LIMIT ${} OFFSET ${}",
            param_idx,
            param_idx + 1
        );
        let mut page_query = sqlx::query_as::<_, PgStoreRow>(&page_sql);
        if let Some(building_id) = filter.building_id {
            page_query = page_query.bind(building_id);
        }
        if let Some(search) = &filter.search {
            let pattern = make_like_pattern(search);
            page_query = page_query.bind(pattern.clone()).bind(pattern);
        }
        page_query = page_query
            .bind(i64::from(page.limit()))
            .bind(i64::from(page.offset()));

        let rows: Vec<PgStoreRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<Store>, DbError> = rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }

    async fn update(&self, id: Uuid, update: &StoreUpdate) -> Result<Store, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Store", id))?;

        let name = update.name.as_ref().unwrap_or(&existing.name);
        let store_number_id = resolve(&update.store_number_id, &existing.store_number_id);
        let building_id = resolve(&update.building_id, &existing.building_id);
        let floor_id = resolve(&update.floor_id, &existing.floor_id);
        let line_id = resolve(&update.line_id, &existing.line_id);
        let owner_name = resolve(&update.owner_name, &existing.owner_name);
        let contact_phone = resolve(&update.contact_phone, &existing.contact_phone);

        sqlx::query(
            r#"
            UPDATE stores
            SET name = $1, store_number_id = $2, building_id = $3, floor_id = $4, line_id = $5, owner_name = $6, contact_phone = $7, updated_at = NOW()
            WHERE id = $8
            "#,
        )
        .bind(name)
        .bind(store_number_id)
        .bind(building_id)
        .bind(floor_id)
        .bind(line_id)
        .bind(&owner_name)
        .bind(&contact_phone)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Store", id))
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE stores SET is_archived = $1, updated_at = NOW() WHERE id = $2")
                .bind(archived)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Store", id));
        }
        Ok(())
    }
}

fn resolve<T: Clone>(update: &Option<Option<T>>, existing: &Option<T>) -> Option<T> {
    match update {
        Some(value) => value.clone(),
        None => existing.clone(),
    }
}

// Row-mapping helpers.

#[derive(sqlx::FromRow)]
struct SqliteStoreRow {
    id: String,
    name: String,
    store_number_id: Option<String>,
    building_id: Option<String>,
    floor_id: Option<String>,
    line_id: Option<String>,
    owner_name: Option<String>,
    contact_phone: Option<String>,
    is_archived: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqliteStoreRow> for Store {
    type Error = DbError;

    fn try_from(row: SqliteStoreRow) -> Result<Self, Self::Error> {
        Ok(Store {
            id: parse_uuid(&row.id)?,
            name: row.name,
            store_number_id: row.store_number_id.as_deref().map(parse_uuid).transpose()?,
            building_id: row.building_id.as_deref().map(parse_uuid).transpose()?,
            floor_id: row.floor_id.as_deref().map(parse_uuid).transpose()?,
            line_id: row.line_id.as_deref().map(parse_uuid).transpose()?,
            owner_name: row.owner_name,
            contact_phone: row.contact_phone,
            is_archived: row.is_archived,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgStoreRow {
    id: Uuid,
    name: String,
    store_number_id: Option<Uuid>,
    building_id: Option<Uuid>,
    floor_id: Option<Uuid>,
    line_id: Option<Uuid>,
    owner_name: Option<String>,
    contact_phone: Option<String>,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PgStoreRow> for Store {
    type Error = DbError;

    fn try_from(row: PgStoreRow) -> Result<Self, Self::Error> {
        Ok(Store {
            id: row.id,
            name: row.name,
            store_number_id: row.store_number_id,
            building_id: row.building_id,
            floor_id: row.floor_id,
            line_id: row.line_id,
            owner_name: row.owner_name,
            contact_phone: row.contact_phone,
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
            "sqlite:file:test_stores_{}?mode=memory&cache=shared",
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
    async fn create_and_name_uniqueness() {
        let pool = test_pool().await;
        let repo = create_store_repository(&pool);

        repo.create(&Store::new("Row 1, Box 5")).await.unwrap();
        assert!(repo.get_by_name("Row 1, Box 5").await.unwrap().is_some());

        let result = repo.create(&Store::new("Row 1, Box 5")).await;
        assert!(matches!(result, Err(DbError::Unique(_))));
    }

    #[tokio::test]
    async fn search_matches_owner_name() {
        let pool = test_pool().await;
        let repo = create_store_repository(&pool);

        let mut store = Store::new("Shoes 12");
        store.owner_name = Some("Nazarov".to_string());
        repo.create(&store).await.unwrap();
        repo.create(&Store::new("Fabrics 3")).await.unwrap();

        let found = repo
            .list(
                &StoreFilter {
                    search: Some("nazar".to_string()),
                    ..Default::default()
                },
                &PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].name, "Shoes 12");
    }

    #[tokio::test]
    async fn archive_hides_from_default_listing() {
        let pool = test_pool().await;
        let repo = create_store_repository(&pool);

        let store = Store::new("Closing Down");
        repo.create(&store).await.unwrap();
        repo.set_archived(store.id, true).await.unwrap();

        let visible = repo
            .list(&StoreFilter::default(), &PageRequest::default())
            .await
            .unwrap();
        assert!(visible.is_empty());

        repo.set_archived(store.id, false).await.unwrap();
        let restored = repo
            .list(&StoreFilter::default(), &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(restored.total, 1);
    }
}
