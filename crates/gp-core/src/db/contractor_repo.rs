//! Contractor repository.

use super::user_repo::{parse_ts, parse_uuid};
use super::{make_like_pattern, DbError, DbPool, Page, PageRequest};
use crate::contractor::{Contractor, ContractorFilter, ContractorUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for contractor persistence.
#[async_trait]
pub trait ContractorRepository: Send + Sync {
    async fn create(&self, contractor: &Contractor) -> Result<Contractor, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<Contractor>, DbError>;

    async fn get_by_passport(&self, passport_number: &str) -> Result<Option<Contractor>, DbError>;

    async fn list(
        &self,
        filter: &ContractorFilter,
        page: &PageRequest,
    ) -> Result<Page<Contractor>, DbError>;

    async fn update(&self, id: Uuid, update: &ContractorUpdate) -> Result<Contractor, DbError>;

    /// Flips the soft-archival flag.
    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError>;
}

pub fn create_contractor_repository(pool: &DbPool) -> Box<dyn ContractorRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqliteContractorRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgContractorRepository::new(pool.clone())),
    }
}

const CONTRACTOR_COLUMNS: &str = "id, full_name, passport_number, phone, citizenship_id, nationality_id, position_id, notes, is_archived, created_at, updated_at";

/// SQLite implementation.
pub struct SqliteContractorRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteContractorRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Builds the WHERE clause and ordered bind values for a filter.
    fn filter_sql(filter: &ContractorFilter) -> (String, Vec<String>) {
        let mut clause = String::from("1=1");
        let mut params: Vec<String> = Vec::new();

        if !filter.include_archived {
            clause.push_str(" AND is_archived = 0");
        }
        if let Some(position_id) = filter.position_id {
            clause.push_str(" AND position_id = ?");
            params.push(position_id.to_string());
        }
        if let Some(search) = &filter.search {
            clause.push_str(
                " AND (full_name LIKE ? ESCAPE '\\' OR passport_number LIKE ? ESCAPE '\\' OR phone LIKE ? ESCAPE '\\')",
            );
            let pattern = make_like_pattern(search);
            params.push(pattern.clone());
            params.push(pattern.clone());
            params.push(pattern);
        }

        (clause, params)
    }
}

#[async_trait]
impl ContractorRepository for SqliteContractorRepository {
    async fn create(&self, contractor: &Contractor) -> Result<Contractor, DbError> {
        sqlx::query(
            r#"
            INSERT INTO contractors (id, full_name, passport_number, phone, citizenship_id, nationality_id, position_id, notes, is_archived, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(contractor.id.to_string())
        .bind(&contractor.full_name)
        .bind(&contractor.passport_number)
        .bind(&contractor.phone)
        .bind(contractor.citizenship_id.map(|u| u.to_string()))
        .bind(contractor.nationality_id.map(|u| u.to_string()))
        .bind(contractor.position_id.map(|u| u.to_string()))
        .bind(&contractor.notes)
        .bind(contractor.is_archived)
        .bind(contractor.created_at.to_rfc3339())
        .bind(contractor.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(contractor.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Contractor>, DbError> {
        let row: Option<SqliteContractorRow> = sqlx::query_as(&format!(
            "SELECT {CONTRACTOR_COLUMNS} FROM contractors WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_passport(&self, passport_number: &str) -> Result<Option<Contractor>, DbError> {
        let row: Option<SqliteContractorRow> = sqlx::query_as(&format!(
            "SELECT {CONTRACTOR_COLUMNS} FROM contractors WHERE passport_number = ?"
        ))
        .bind(passport_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &ContractorFilter,
        page: &PageRequest,
    ) -> Result<Page<Contractor>, DbError> {
        let (clause, params) = Self::filter_sql(filter);

        let count_sql = format!("SELECT COUNT(*) FROM contractors WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {CONTRACTOR_COLUMNS} FROM contractors WHERE {clause} ORDER BY full_name ASC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query_as::<_, SqliteContractorRow>(&page_sql);
        for param in &params {
            page_query = page_query.bind(param);
        }
        page_query = page_query.bind(page.limit()).bind(page.offset());

        let rows: Vec<SqliteContractorRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<Contractor>, DbError> =
            rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }

    async fn update(&self, id: Uuid, update: &ContractorUpdate) -> Result<Contractor, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Contractor", id))?;

        let full_name = update.full_name.as_ref().unwrap_or(&existing.full_name);
        let passport = update
            .passport_number
            .as_ref()
            .unwrap_or(&existing.passport_number);
        let phone = resolve(&update.phone, &existing.phone);
        let citizenship_id = resolve(&update.citizenship_id, &existing.citizenship_id);
        let nationality_id = resolve(&update.nationality_id, &existing.nationality_id);
        let position_id = resolve(&update.position_id, &existing.position_id);
        let notes = resolve(&update.notes, &existing.notes);

        sqlx::query(
            r#"
            UPDATE contractors
            SET full_name = ?, passport_number = ?, phone = ?, citizenship_id = ?, nationality_id = ?, position_id = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(full_name)
        .bind(passport)
        .bind(&phone)
        .bind(citizenship_id.map(|u| u.to_string()))
        .bind(nationality_id.map(|u| u.to_string()))
        .bind(position_id.map(|u| u.to_string()))
        .bind(&notes)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Contractor", id))
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE contractors SET is_archived = ?, updated_at = ? WHERE id = ?")
            .bind(archived)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Contractor", id));
        }
        Ok(())
    }
}

/// PostgreSQL implementation.
pub struct PgContractorRepository {
    pool: sqlx::PgPool,
}

impl PgContractorRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContractorRepository for PgContractorRepository {
    async fn create(&self, contractor: &Contractor) -> Result<Contractor, DbError> {
        sqlx::query(
            r#"
            INSERT INTO contractors (id, full_name, passport_number, phone, citizenship_id, nationality_id, position_id, notes, is_archived, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(contractor.id)
        .bind(&contractor.full_name)
        .bind(&contractor.passport_number)
        .bind(&contractor.phone)
        .bind(contractor.citizenship_id)
        .bind(contractor.nationality_id)
        .bind(contractor.position_id)
        .bind(&contractor.notes)
        .bind(contractor.is_archived)
        .bind(contractor.created_at)
        .bind(contractor.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(contractor.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Contractor>, DbError> {
        let row: Option<PgContractorRow> = sqlx::query_as(&format!(
            "SELECT {CONTRACTOR_COLUMNS} FROM contractors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_passport(&self, passport_number: &str) -> Result<Option<Contractor>, DbError> {
        let row: Option<PgContractorRow> = sqlx::query_as(&format!(
            "SELECT {CONTRACTOR_COLUMNS} FROM contractors WHERE passport_number = $1"
        ))
        .bind(passport_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &ContractorFilter,
        page: &PageRequest,
    ) -> Result<Page<Contractor>, DbError> {
        let mut conditions = vec!["1=1".to_string()];
        let mut param_idx = 1;

        if !filter.include_archived {
            conditions.push("is_archived = FALSE".to_string());
        }
        if filter.position_id.is_some() {
            conditions.push(format!("position_id = ${param_idx}"));
            param_idx += 1;
        }
        if filter.search.is_some() {
            conditions.push(format!(
                "(full_name ILIKE ${} ESCAPE '\\' OR passport_number ILIKE ${} ESCAPE '\\' OR phone ILIKE ${} ESCAPE '\\')",
                param_idx,
                param_idx + 1,
                param_idx + 2
            ));
            param_idx += 3;
        }
        let clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM contractors WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(position_id) = filter.position_id {
            count_query = count_query.bind(position_id);
        }
        if let Some(search) = &filter.search {
            let pattern = make_like_pattern(search);
            count_query = count_query
                .bind(pattern.clone())
                .bind(pattern.clone())
                .bind(pattern);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {CONTRACTOR_COLUMNS} FROM contractors WHERE {clause} ORDER BY full_name ASC LIMIT ${} OFFSET ${}",
            param_idx,
            param_idx + 1
        );
        let mut page_query = sqlx::query_as::<_, PgContractorRow>(&page_sql);
        if let Some(position_id) = filter.position_id {
            page_query = page_query.bind(position_id);
        }
        if let Some(search) = &filter.search {
            let pattern = make_like_pattern(search);
            page_query = page_query
                .bind(pattern.clone())
                .bind(pattern.clone())
                .bind(pattern);
        }
        page_query = page_query
            .bind(i64::from(page.limit()))
            .bind(i64::from(page.offset()));

        let rows: Vec<PgContractorRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<Contractor>, DbError> =
            rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }

    async fn update(&self, id: Uuid, update: &ContractorUpdate) -> Result<Contractor, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Contractor", id))?;

        let full_name = update.full_name.as_ref().unwrap_or(&existing.full_name);
        let passport = update
            .passport_number
            .as_ref()
            .unwrap_or(&existing.passport_number);
        let phone = resolve(&update.phone, &existing.phone);
        let citizenship_id = resolve(&update.citizenship_id, &existing.citizenship_id);
        let nationality_id = resolve(&update.nationality_id, &existing.nationality_id);
        let position_id = resolve(&update.position_id, &existing.position_id);
        let notes = resolve(&update.notes, &existing.notes);

        sqlx::query(
            r#"
            UPDATE contractors
            SET full_name = $1, passport_number = $2, phone = $3, citizenship_id = $4, nationality_id = $5, position_id = $6, notes = $7, updated_at = NOW()
            WHERE id = $8
            "#,
        )
        .bind(full_name)
        .bind(passport)
        .bind(&phone)
        .bind(citizenship_id)
        .bind(nationality_id)
        .bind(position_id)
        .bind(&notes)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Contractor", id))
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE contractors SET is_archived = $1, updated_at = NOW() WHERE id = $2")
                .bind(archived)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Contractor", id));
        }
        Ok(())
    }
}

/// Resolves a double-option update field against the existing value.
fn resolve<T: Clone>(update: &Option<Option<T>>, existing: &Option<T>) -> Option<T> {
    match update {
        Some(value) => value.clone(),
        None => existing.clone(),
    }
}

// Row-mapping helpers.

#[derive(sqlx::FromRow)]
struct SqliteContractorRow {
    id: String,
    full_name: String,
    passport_number: String,
    phone: Option<String>,
    citizenship_id: Option<String>,
    nationality_id: Option<String>,
    position_id: Option<String>,
    notes: Option<String>,
    is_archived: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqliteContractorRow> for Contractor {
    type Error = DbError;

    fn try_from(row: SqliteContractorRow) -> Result<Self, Self::Error> {
        Ok(Contractor {
            id: parse_uuid(&row.id)?,
            full_name: row.full_name,
            passport_number: row.passport_number,
            phone: row.phone,
            citizenship_id: row.citizenship_id.as_deref().map(parse_uuid).transpose()?,
            nationality_id: row.nationality_id.as_deref().map(parse_uuid).transpose()?,
            position_id: row.position_id.as_deref().map(parse_uuid).transpose()?,
            notes: row.notes,
            is_archived: row.is_archived,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgContractorRow {
    id: Uuid,
    full_name: String,
    passport_number: String,
    phone: Option<String>,
    citizenship_id: Option<Uuid>,
    nationality_id: Option<Uuid>,
    position_id: Option<Uuid>,
    notes: Option<String>,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PgContractorRow> for Contractor {
    type Error = DbError;

    fn try_from(row: PgContractorRow) -> Result<Self, Self::Error> {
        Ok(Contractor {
            id: row.id,
            full_name: row.full_name,
            passport_number: row.passport_number,
            phone: row.phone,
            citizenship_id: row.citizenship_id,
            nationality_id: row.nationality_id,
            position_id: row.position_id,
            notes: row.notes,
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
            "sqlite:file:test_contractors_{}?mode=memory&cache=shared",
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
    async fn create_and_lookup_by_passport() {
        let pool = test_pool().await;
        let repo = create_contractor_repository(&pool);

        let c = Contractor::new("Karimov Aziz", "AA0011223");
        repo.create(&c).await.unwrap();

        let found = repo.get_by_passport("AA0011223").await.unwrap().unwrap();
        assert_eq!(found.id, c.id);
        assert!(repo.get_by_passport("ZZ999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_passport_is_unique_violation() {
        let pool = test_pool().await;
        let repo = create_contractor_repository(&pool);

        repo.create(&Contractor::new("First", "AB1112223"))
            .await
            .unwrap();
        let result = repo.create(&Contractor::new("Second", "AB1112223")).await;
        assert!(matches!(result, Err(DbError::Unique(_))));
    }

    #[tokio::test]
    async fn list_paginates_and_searches() {
        let pool = test_pool().await;
        let repo = create_contractor_repository(&pool);

        for i in 0..7 {
            repo.create(&Contractor::new(
                format!("Worker {i:02}"),
                format!("PN{i:07}"),
            ))
            .await
            .unwrap();
        }

        let all = repo
            .list(&ContractorFilter::default(), &PageRequest::new(1, 5))
            .await
            .unwrap();
        assert_eq!(all.total, 7);
        assert_eq!(all.len(), 5);
        assert_eq!(all.total_pages, 2);
        assert!(all.has_next());

        let found = repo
            .list(
                &ContractorFilter {
                    search: Some("PN0000003".to_string()),
                    ..Default::default()
                },
                &PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].full_name, "Worker 03");
    }

    #[tokio::test]
    async fn archived_rows_hidden_by_default() {
        let pool = test_pool().await;
        let repo = create_contractor_repository(&pool);

        let keep = Contractor::new("Keeps", "KP0000001");
        let gone = Contractor::new("Leaves", "LV0000001");
        repo.create(&keep).await.unwrap();
        repo.create(&gone).await.unwrap();
        repo.set_archived(gone.id, true).await.unwrap();

        let visible = repo
            .list(&ContractorFilter::default(), &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(visible.total, 1);

        let with_archived = repo
            .list(
                &ContractorFilter {
                    include_archived: true,
                    ..Default::default()
                },
                &PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(with_archived.total, 2);

        // Archived contractors stay resolvable by id
        assert!(repo.get(gone.id).await.unwrap().unwrap().is_archived);
    }

    #[tokio::test]
    async fn update_can_clear_optional_fields() {
        let pool = test_pool().await;
        let repo = create_contractor_repository(&pool);

        let mut c = Contractor::new("Has Phone", "HP0000001");
        c.phone = Some("+998900000000".to_string());
        repo.create(&c).await.unwrap();

        let updated = repo
            .update(
                c.id,
                &ContractorUpdate {
                    phone: Some(None),
                    notes: Some(Some("walk-in".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.phone.is_none());
        assert_eq!(updated.notes.as_deref(), Some("walk-in"));
        assert_eq!(updated.full_name, "Has Phone");
    }
}
