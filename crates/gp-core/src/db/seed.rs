//! First-run database seeding.

use super::{create_directory_repository, create_user_repository, DbError, DbPool};
use crate::auth::{password::hash_password, Role, User};
use crate::directory::{DirectoryEntry, DirectoryKind};
use rand::Rng;
use tracing::{info, warn};

/// Ensures a default admin user exists.
///
/// When the users table is empty, creates `admin` with the password from
/// `GATEPASS_ADMIN_PASSWORD`, or a generated one.
///
/// Returns `Ok(Some(password))` when a new admin was created with a
/// generated password, `Ok(None)` otherwise.
pub async fn ensure_admin_user(pool: &DbPool) -> Result<Option<String>, DbError> {
    let user_repo = create_user_repository(pool);

    if user_repo.any_exist().await? {
        info!("Users already exist, skipping admin seed");
        return Ok(None);
    }

    let (password, generated) = match std::env::var("GATEPASS_ADMIN_PASSWORD") {
        Ok(p) if !p.is_empty() => (p, false),
        _ => {
            warn!("No GATEPASS_ADMIN_PASSWORD set, generating a random admin password");
            (generate_password(), true)
        }
    };

    let password_hash =
        hash_password(&password).map_err(|e| DbError::Configuration(e.to_string()))?;
    let admin = User::new("admin", "admin@localhost", password_hash, Role::Admin);
    user_repo.create(&admin).await?;

    info!("Created default admin user");

    Ok(if generated { Some(password) } else { None })
}

/// Seeds an empty directory table with a minimal starting set so the
/// forms have something to offer on a fresh install.
pub async fn seed_directories(pool: &DbPool) -> Result<usize, DbError> {
    let repo = create_directory_repository(pool);

    let defaults: &[(DirectoryKind, &[&str])] = &[
        (DirectoryKind::Position, &["Seller", "Loader", "Cleaner"]),
        (DirectoryKind::Building, &["A", "B"]),
        (DirectoryKind::Floor, &["1", "2"]),
    ];

    let mut created = 0;
    for (kind, names) in defaults {
        if !repo.list(*kind, true).await?.is_empty() {
            continue;
        }
        for name in *names {
            repo.create(&DirectoryEntry::new(*kind, *name)).await?;
            created += 1;
        }
    }

    if created > 0 {
        info!(entries = created, "Seeded directory defaults");
    }
    Ok(created)
}

/// Generates a 16-character password with all required character classes.
fn generate_password() -> String {
    const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const DIGITS: &[u8] = b"0123456789";

    let mut rng = rand::thread_rng();
    let mut password = Vec::with_capacity(16);

    password.push(UPPER[rng.gen_range(0..UPPER.len())]);
    password.push(LOWER[rng.gen_range(0..LOWER.len())]);
    password.push(DIGITS[rng.gen_range(0..DIGITS.len())]);

    let all: Vec<u8> = [UPPER, LOWER, DIGITS].concat();
    for _ in 0..13 {
        password.push(all[rng.gen_range(0..all.len())]);
    }

    for i in (1..password.len()).rev() {
        let j = rng.gen_range(0..=i);
        password.swap(i, j);
    }

    String::from_utf8(password).expect("password bytes are ASCII")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::validate_password_strength;
    use crate::db::{create_pool_with_options, run_migrations, PoolOptions};
    use uuid::Uuid;

    async fn test_pool() -> DbPool {
        let url = format!(
            "sqlite:file:test_seed_{}?mode=memory&cache=shared",
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

    #[test]
    fn generated_password_passes_strength_check() {
        let password = generate_password();
        assert_eq!(password.len(), 16);
        assert!(validate_password_strength(&password).is_empty());
    }

    #[tokio::test]
    async fn admin_seed_runs_once() {
        let pool = test_pool().await;
        std::env::remove_var("GATEPASS_ADMIN_PASSWORD");

        let first = ensure_admin_user(&pool).await.unwrap();
        assert!(first.is_some());

        // Second run is a no-op
        let second = ensure_admin_user(&pool).await.unwrap();
        assert!(second.is_none());

        let repo = create_user_repository(&pool);
        let admin = repo.get_by_username("admin").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn directory_seed_is_idempotent() {
        let pool = test_pool().await;

        let created = seed_directories(&pool).await.unwrap();
        assert!(created > 0);

        let again = seed_directories(&pool).await.unwrap();
        assert_eq!(again, 0);
    }
}
