//! User repository.

use super::{make_like_pattern, DbError, DbPool};
use crate::auth::{Role, User, UserFilter, UserUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for user persistence.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User, DbError>;

    async fn get(&self, id: Uuid) -> Result<Option<User>, DbError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, DbError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, DbError>;

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, DbError>;

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<User, DbError>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DbError>;

    async fn update_last_login(&self, id: Uuid) -> Result<(), DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    /// Returns true if any user exists (first-run seeding check).
    async fn any_exist(&self) -> Result<bool, DbError>;
}

/// Picks the repository implementation matching the pool backend.
pub fn create_user_repository(pool: &DbPool) -> Box<dyn UserRepository> {
    match pool {
        DbPool::Sqlite(pool) => Box::new(SqliteUserRepository::new(pool.clone())),
        DbPool::Postgres(pool) => Box::new(PgUserRepository::new(pool.clone())),
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, role, display_name, enabled, last_login_at, created_at, updated_at";

/// SQLite implementation.
pub struct SqliteUserRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &User) -> Result<User, DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, display_name, enabled, last_login_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.display_name)
        .bind(user.enabled)
        .bind(user.last_login_at.map(|t| t.to_rfc3339()))
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(user.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>, DbError> {
        let row: Option<SqliteUserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let row: Option<SqliteUserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let row: Option<SqliteUserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, DbError> {
        let mut query = format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1");
        let mut params: Vec<String> = Vec::new();

        if let Some(role) = &filter.role {
            query.push_str(" AND role = ?");
            params.push(role.as_str().to_string());
        }
        if let Some(enabled) = filter.enabled {
            query.push_str(" AND enabled = ?");
            params.push(if enabled { "1" } else { "0" }.to_string());
        }
        if let Some(search) = &filter.search {
            query.push_str(
                " AND (username LIKE ? ESCAPE '\\' OR email LIKE ? ESCAPE '\\' OR display_name LIKE ? ESCAPE '\\')",
            );
            let pattern = make_like_pattern(search);
            params.push(pattern.clone());
            params.push(pattern.clone());
            params.push(pattern);
        }

        query.push_str(" ORDER BY username ASC");

        let mut sqlx_query = sqlx::query_as::<_, SqliteUserRow>(&query);
        for param in params {
            sqlx_query = sqlx_query.bind(param);
        }

        let rows: Vec<SqliteUserRow> = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<User, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))?;

        let username = update.username.as_ref().unwrap_or(&existing.username);
        let email = update.email.as_ref().unwrap_or(&existing.email);
        let role = update.role.unwrap_or(existing.role);
        let display_name = match &update.display_name {
            Some(dn) => dn.clone(),
            None => existing.display_name.clone(),
        };
        let enabled = update.enabled.unwrap_or(existing.enabled);

        sqlx::query(
            r#"
            UPDATE users SET username = ?, email = ?, role = ?, display_name = ?, enabled = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(role.as_str())
        .bind(&display_name)
        .bind(enabled)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn any_exist(&self) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

/// PostgreSQL implementation.
pub struct PgUserRepository {
    pool: sqlx::PgPool,
}

impl PgUserRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> Result<User, DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, display_name, enabled, last_login_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.display_name)
        .bind(user.enabled)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(user.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>, DbError> {
        let row: Option<PgUserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let row: Option<PgUserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let row: Option<PgUserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, DbError> {
        let mut conditions = vec!["1=1".to_string()];
        let mut param_idx = 1;

        if filter.role.is_some() {
            conditions.push(format!("role = ${param_idx}"));
            param_idx += 1;
        }
        if filter.enabled.is_some() {
            conditions.push(format!("enabled = ${param_idx}"));
            param_idx += 1;
        }
        if filter.search.is_some() {
            conditions.push(format!(
                "(username ILIKE ${} ESCAPE '\\' OR email ILIKE ${} ESCAPE '\\' OR display_name ILIKE ${} ESCAPE '\\')",
                param_idx,
                param_idx + 1,
                param_idx + 2
            ));
        }

        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} ORDER BY username ASC",
            conditions.join(" AND ")
        );

        let mut sqlx_query = sqlx::query_as::<_, PgUserRow>(&query);
        if let Some(role) = &filter.role {
            sqlx_query = sqlx_query.bind(role.as_str());
        }
        if let Some(enabled) = filter.enabled {
            sqlx_query = sqlx_query.bind(enabled);
        }
        if let Some(search) = &filter.search {
            let pattern = make_like_pattern(search);
            sqlx_query = sqlx_query
                .bind(pattern.clone())
                .bind(pattern.clone())
                .bind(pattern);
        }

        let rows: Vec<PgUserRow> = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<User, DbError> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))?;

        let username = update.username.as_ref().unwrap_or(&existing.username);
        let email = update.email.as_ref().unwrap_or(&existing.email);
        let role = update.role.unwrap_or(existing.role);
        let display_name = match &update.display_name {
            Some(dn) => dn.clone(),
            None => existing.display_name.clone(),
        };
        let enabled = update.enabled.unwrap_or(existing.enabled);

        sqlx::query(
            r#"
            UPDATE users SET username = $1, email = $2, role = $3, display_name = $4, enabled = $5, updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(role.as_str())
        .bind(&display_name)
        .bind(enabled)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
                .bind(password_hash)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn any_exist(&self) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

// Row-mapping helpers.

#[derive(sqlx::FromRow)]
struct SqliteUserRow {
    id: String,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    display_name: Option<String>,
    enabled: bool,
    last_login_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SqliteUserRow> for User {
    type Error = DbError;

    fn try_from(row: SqliteUserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_uuid(&row.id)?,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: parse_role(&row.role)?,
            display_name: row.display_name,
            enabled: row.enabled,
            last_login_at: row.last_login_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PgUserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    display_name: Option<String>,
    enabled: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PgUserRow> for User {
    type Error = DbError;

    fn try_from(row: PgUserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: parse_role(&row.role)?,
            display_name: row.display_name,
            enabled: row.enabled,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(s).map_err(|e| DbError::Serialization(format!("Invalid UUID: {e}")))
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(format!("Invalid timestamp: {e}")))
}

pub(crate) fn parse_date(s: &str) -> Result<chrono::NaiveDate, DbError> {
    s.parse()
        .map_err(|e| DbError::Serialization(format!("Invalid date: {e}")))
}

fn parse_role(s: &str) -> Result<Role, DbError> {
    s.parse::<Role>()
        .map_err(|_| DbError::Serialization(format!("Invalid role: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool_with_options, run_migrations, PoolOptions};

    async fn test_pool() -> DbPool {
        let url = format!(
            "sqlite:file:test_users_{}?mode=memory&cache=shared",
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
    async fn create_get_round_trip() {
        let pool = test_pool().await;
        let repo = create_user_repository(&pool);

        let user = User::new("kassir1", "kassir1@example.com", "hash", Role::Cashier);
        repo.create(&user).await.unwrap();

        let loaded = repo.get(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.username, "kassir1");
        assert_eq!(loaded.role, Role::Cashier);
        assert!(loaded.enabled);

        let by_name = repo.get_by_username("kassir1").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_username_is_unique_violation() {
        let pool = test_pool().await;
        let repo = create_user_repository(&pool);

        let a = User::new("dup", "a@example.com", "hash", Role::Viewer);
        let b = User::new("dup", "b@example.com", "hash", Role::Viewer);
        repo.create(&a).await.unwrap();

        assert!(matches!(
            repo.create(&b).await,
            Err(DbError::Unique(_))
        ));
    }

    #[tokio::test]
    async fn update_applies_partial_fields() {
        let pool = test_pool().await;
        let repo = create_user_repository(&pool);

        let user = User::new("op", "op@example.com", "hash", Role::Viewer);
        repo.create(&user).await.unwrap();

        let updated = repo
            .update(
                user.id,
                &UserUpdate {
                    role: Some(Role::Cashier),
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.role, Role::Cashier);
        assert!(!updated.enabled);
        // Untouched fields survive
        assert_eq!(updated.email, "op@example.com");
    }

    #[tokio::test]
    async fn list_filters_by_search() {
        let pool = test_pool().await;
        let repo = create_user_repository(&pool);

        repo.create(&User::new("anna", "anna@example.com", "h", Role::Viewer))
            .await
            .unwrap();
        repo.create(&User::new("boris", "boris@example.com", "h", Role::Viewer))
            .await
            .unwrap();

        let filter = UserFilter {
            search: Some("ann".to_string()),
            ..Default::default()
        };
        let found = repo.list(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "anna");
    }

    #[tokio::test]
    async fn any_exist_and_delete() {
        let pool = test_pool().await;
        let repo = create_user_repository(&pool);

        assert!(!repo.any_exist().await.unwrap());

        let user = User::new("temp", "temp@example.com", "h", Role::Viewer);
        repo.create(&user).await.unwrap();
        assert!(repo.any_exist().await.unwrap());

        assert!(repo.delete(user.id).await.unwrap());
        assert!(!repo.delete(user.id).await.unwrap());
    }
}
