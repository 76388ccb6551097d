//! Cashier transaction repository.
//!
//! Transaction creation is the one multi-row write in the system: the
//! transaction row and every pass it pays for are inserted inside a
//! single database transaction, so a uniqueness collision on any pass
//! number rolls back the whole bundle.

use super::user_repo::{parse_date, parse_ts, parse_uuid};
use super::{make_like_pattern, DbError, DbPool, Page, PageRequest};
use crate::pass::Pass;
use crate::transaction::{PassTransaction, TransactionFilter};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Repository trait for cashier transactions.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persists the transaction and its passes atomically.
    async fn create_with_passes(
        &self,
        transaction: &PassTransaction,
        passes: &[Pass],
    ) -> Result<(), DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<PassTransaction>, DbError>;

    async fn get_by_token(&self, token: &str) -> Result<Option<PassTransaction>, DbError>;

    async fn list(
        &self,
        filter: &TransactionFilter,
        page: &PageRequest,
    ) -> Result<Page<PassTransaction>, DbError>;

    /// Passes created by a transaction, oldest first.
    async fn passes_for(&self, transaction_id: Uuid) -> Result<Vec<Pass>, DbError>;
}

pub fn create_transaction_repository(pool: &DbPool) -> Box<dyn TransactionRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqliteTransactionRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgTransactionRepository::new(pool.clone())),
    }
}

const TX_COLUMNS: &str = "id, token, cashier_id, total_cents, note, starts_on, created_at";
const PASS_COLUMNS: &str = "id, number, contractor_id, store_id, pass_type_id, transaction_id, starts_on, ends_on, status, is_archived, created_at, updated_at";

/// SQLite implementation.
pub struct SqliteTransactionRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteTransactionRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for SqliteTransactionRepository {
    async fn create_with_passes(
        &self,
        transaction: &PassTransaction,
        passes: &[Pass],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO pass_transactions (id, token, cashier_id, total_cents, note, starts_on, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(&transaction.token)
        .bind(transaction.cashier_id.to_string())
        .bind(transaction.total_cents)
        .bind(&transaction.note)
        .bind(transaction.starts_on.to_string())
        .bind(transaction.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for pass in passes {
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
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PassTransaction>, DbError> {
        let row: Option<SqliteTxRow> = sqlx::query_as(&format!(
            "SELECT {TX_COLUMNS} FROM pass_transactions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<PassTransaction>, DbError> {
        let row: Option<SqliteTxRow> = sqlx::query_as(&format!(
            "SELECT {TX_COLUMNS} FROM pass_transactions WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &TransactionFilter,
        page: &PageRequest,
    ) -> Result<Page<PassTransaction>, DbError> {
        let mut clause = String::from("1=1");
        let mut params: Vec<String> = Vec::new();

        if let Some(cashier_id) = filter.cashier_id {
            clause.push_str(" AND cashier_id = ?");
            params.push(cashier_id.to_string());
        }
        if let Some(since) = filter.since {
            clause.push_str(" AND created_at >= ?");
            params.push(since.to_rfc3339());
        }
        if let Some(until) = filter.until {
            clause.push_str(" AND created_at < ?");
            params.push(until.to_rfc3339());
        }
        if let Some(search) = &filter.search {
            clause.push_str(" AND token LIKE ? ESCAPE '\\'");
            params.push(make_like_pattern(search));
        }

        let count_sql = format!("SELECT COUNT(*) FROM pass_transactions WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {TX_COLUMNS} FROM pass_transactions WHERE {clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query_as::<_, SqliteTxRow>(&page_sql);
        for param in &params {
            page_query = page_query.bind(param);
        }
        page_query = page_query.bind(page.limit()).bind(page.offset());

        let rows: Vec<SqliteTxRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<PassTransaction>, DbError> =
            rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }

    async fn passes_for(&self, transaction_id: Uuid) -> Result<Vec<Pass>, DbError> {
        let rows: Vec<SqliteTxPassRow> = sqlx::query_as(&format!(
            "SELECT {PASS_COLUMNS} FROM passes WHERE transaction_id = ? ORDER BY created_at ASC"
        ))
        .bind(transaction_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// PostgreSQL implementation.
pub struct PgTransactionRepository {
    pool: sqlx::PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn create_with_passes(
        &self,
        transaction: &PassTransaction,
        passes: &[Pass],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO pass_transactions (id, token, cashier_id, total_cents, note, starts_on, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.token)
        .bind(transaction.cashier_id)
        .bind(transaction.total_cents)
        .bind(&transaction.note)
        .bind(transaction.starts_on)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await?;

        for pass in passes {
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
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PassTransaction>, DbError> {
        let row: Option<PgTxRow> = sqlx::query_as(&format!(
            "SELECT {TX_COLUMNS} FROM pass_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<PassTransaction>, DbError> {
        let row: Option<PgTxRow> = sqlx::query_as(&format!(
            "SELECT {TX_COLUMNS} FROM pass_transactions WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        filter: &TransactionFilter,
        page: &PageRequest,
    ) -> Result<Page<PassTransaction>, DbError> {
        let mut conditions = vec!["1=1".to_string()];
        let mut param_idx = 1;

        if filter.cashier_id.is_some() {
            conditions.push(format!("cashier_id = ${param_idx}"));
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
        if filter.search.is_some() {
            conditions.push(format!("token ILIKE ${param_idx} ESCAPE '\\'"));
            param_idx += 1;
        }
        let clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM pass_transactions WHERE {clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(cashier_id) = filter.cashier_id {
            count_query = count_query.bind(cashier_id);
        }
        if let Some(since) = filter.since {
            count_query = count_query.bind(since);
        }
        if let Some(until) = filter.until {
            count_query = count_query.bind(until);
        }
        if let Some(search) = &filter.search {
            count_query = count_query.bind(make_like_pattern(search));
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT {TX_COLUMNS} FROM pass_transactions WHERE {clause} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            param_idx,
            param_idx + 1
        );
        let mut page_query = sqlx::query_as::<_, PgTxRow>(&page_sql);
        if let Some(cashier_id) = filter.cashier_id {
            page_query = page_query.bind(cashier_id);
        }
        if let Some(since) = filter.since {
            page_query = page_query.bind(since);
        }
        if let Some(until) = filter.until {
            page_query = page_query.bind(until);
        }
        if let Some(search) = &filter.search {
            page_query = page_query.bind(make_like_pattern(search));
        }
        page_query = page_query
            .bind(i64::from(page.limit()))
            .bind(i64::from(page.offset()));

        let rows: Vec<PgTxRow> = page_query.fetch_all(&self.pool).await?;
        let items: Result<Vec<PassTransaction>, DbError> =
            rows.into_iter().map(TryInto::try_into).collect();

        Ok(Page::new(items?, total as u64, page))
    }

    async fn passes_for(&self, transaction_id: Uuid) -> Result<Vec<Pass>, DbError> {
        let rows: Vec<PgTxPassRow> = sqlx::query_as(&format!(
            "SELECT {PASS_COLUMNS} FROM passes WHERE transaction_id = $1 ORDER BY created_at ASC"
        ))
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// Row-mapping helpers.

#[derive(sqlx::FromRow)]
struct SqliteTxRow {
    id: String,
    token: String,
    cashier_id: String,
    total_cents: i64,
    note: Option<String>,
    starts_on: String,
    created_at: String,
}

impl TryFrom<SqliteTxRow> for PassTransaction {
    type Error = DbError;

    fn try_from(row: SqliteTxRow) -> Result<Self, Self::Error> {
        Ok(PassTransaction {
            id: parse_uuid(&row.id)?,
            token: row.token,
            cashier_id: parse_uuid(&row.cashier_id)?,
            total_cents: row.total_cents,
            note: row.note,
            starts_on: parse_date(&row.starts_on)?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgTxRow {
    id: Uuid,
    token: String,
    cashier_id: Uuid,
    total_cents: i64,
    note: Option<String>,
    starts_on: NaiveDate,
    created_at: DateTime<Utc>,
}

impl TryFrom<PgTxRow> for PassTransaction {
    type Error = DbError;

    fn try_from(row: PgTxRow) -> Result<Self, Self::Error> {
        Ok(PassTransaction {
            id: row.id,
            token: row.token,
            cashier_id: row.cashier_id,
            total_cents: row.total_cents,
            note: row.note,
            starts_on: row.starts_on,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SqliteTxPassRow {
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

impl TryFrom<SqliteTxPassRow> for Pass {
    type Error = DbError;

    fn try_from(row: SqliteTxPassRow) -> Result<Self, Self::Error> {
        Ok(Pass {
            id: parse_uuid(&row.id)?,
            number: row.number,
            contractor_id: parse_uuid(&row.contractor_id)?,
            store_id: parse_uuid(&row.store_id)?,
            pass_type_id: parse_uuid(&row.pass_type_id)?,
            transaction_id: row.transaction_id.as_deref().map(parse_uuid).transpose()?,
            starts_on: parse_date(&row.starts_on)?,
            ends_on: parse_date(&row.ends_on)?,
            status: row
                .status
                .parse()
                .map_err(|_| DbError::Serialization(format!("Invalid pass status: {}", row.status)))?,
            is_archived: row.is_archived,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgTxPassRow {
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

impl TryFrom<PgTxPassRow> for Pass {
    type Error = DbError;

    fn try_from(row: PgTxPassRow) -> Result<Self, Self::Error> {
        Ok(Pass {
            id: row.id,
            number: row.number,
            contractor_id: row.contractor_id,
            store_id: row.store_id,
            pass_type_id: row.pass_type_id,
            transaction_id: row.transaction_id,
            starts_on: row.starts_on,
            ends_on: row.ends_on,
            status: row
                .status
                .parse()
                .map_err(|_| DbError::Serialization(format!("Invalid pass status: {}", row.status)))?,
            is_archived: row.is_archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, User};
    use crate::contractor::Contractor;
    use crate::db::{
        create_contractor_repository, create_pass_catalog_repository, create_pool_with_options,
        create_store_repository, create_user_repository, run_migrations, PoolOptions,
    };
    use crate::pass::{PassGroup, PassType};
    use crate::store::Store;

    async fn test_pool() -> DbPool {
        let url = format!(
            "sqlite:file:test_transactions_{}?mode=memory&cache=shared",
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

    struct Fixture {
        cashier: User,
        contractor: Contractor,
        store: Store,
        pass_type: PassType,
    }

    async fn fixture(pool: &DbPool) -> Fixture {
        let cashier = User::new("cashier", "cashier@example.com", "h", Role::Cashier);
        create_user_repository(pool).create(&cashier).await.unwrap();

        let contractor = Contractor::new("Tx Worker", "TX0000001");
        create_contractor_repository(pool)
            .create(&contractor)
            .await
            .unwrap();

        let store = Store::new("Tx Store");
        create_store_repository(pool).create(&store).await.unwrap();

        let catalog = create_pass_catalog_repository(pool);
        let group = PassGroup::new("Monthly", 0);
        catalog.create_group(&group).await.unwrap();
        let pass_type = PassType::new(group.id, "Standard", 100_00, 30);
        catalog.create_type(&pass_type).await.unwrap();

        Fixture {
            cashier,
            contractor,
            store,
            pass_type,
        }
    }

    #[tokio::test]
    async fn create_with_passes_is_atomic() {
        let pool = test_pool().await;
        let repo = create_transaction_repository(&pool);
        let fx = fixture(&pool).await;

        let starts = Utc::now().date_naive();
        let tx = PassTransaction::new(fx.cashier.id, 200_00, starts);
        let mut first = Pass::issue(fx.contractor.id, fx.store.id, &fx.pass_type, starts);
        first.transaction_id = Some(tx.id);
        let mut second = Pass::issue(fx.contractor.id, fx.store.id, &fx.pass_type, starts);
        second.transaction_id = Some(tx.id);
        // Force a uniqueness collision on the second insert
        second.number = first.number.clone();

        let result = repo
            .create_with_passes(&tx, &[first.clone(), second])
            .await;
        assert!(matches!(result, Err(DbError::Unique(_))));

        // The rollback removed the transaction row too
        assert!(repo.get(tx.id).await.unwrap().is_none());
        assert!(repo.get_by_token(&tx.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn round_trip_with_passes() {
        let pool = test_pool().await;
        let repo = create_transaction_repository(&pool);
        let fx = fixture(&pool).await;

        let starts = Utc::now().date_naive();
        let tx = PassTransaction::new(fx.cashier.id, 100_00, starts);
        let mut pass = Pass::issue(fx.contractor.id, fx.store.id, &fx.pass_type, starts);
        pass.transaction_id = Some(tx.id);

        repo.create_with_passes(&tx, &[pass.clone()]).await.unwrap();

        let loaded = repo.get_by_token(&tx.token).await.unwrap().unwrap();
        assert_eq!(loaded.total_cents, 100_00);

        let passes = repo.passes_for(tx.id).await.unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].number, pass.number);
    }

    #[tokio::test]
    async fn list_filters_by_cashier() {
        let pool = test_pool().await;
        let repo = create_transaction_repository(&pool);
        let fx = fixture(&pool).await;

        let other = User::new("other", "other@example.com", "h", Role::Cashier);
        create_user_repository(&pool).create(&other).await.unwrap();

        let starts = Utc::now().date_naive();
        repo.create_with_passes(&PassTransaction::new(fx.cashier.id, 100_00, starts), &[])
            .await
            .unwrap();
        repo.create_with_passes(&PassTransaction::new(other.id, 50_00, starts), &[])
            .await
            .unwrap();

        let mine = repo
            .list(
                &TransactionFilter {
                    cashier_id: Some(fx.cashier.id),
                    ..Default::default()
                },
                &PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(mine.total, 1);
        assert_eq!(mine.items[0].total_cents, 100_00);
    }
}
