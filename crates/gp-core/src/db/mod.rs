//! Database layer for Gatepass.
//!
//! Repositories follow one pattern: a backend-neutral trait, a SQLite
//! implementation (development, tests), a PostgreSQL implementation
//! (production), and a factory that picks one from the [`DbPool`].
//! SQLite stores UUIDs, timestamps, and dates as TEXT; PostgreSQL uses
//! native types.

mod error;
mod pagination;
mod pool;
mod schema;

pub mod contractor_repo;
pub mod directory_repo;
pub mod history_repo;
pub mod pass_repo;
pub mod pass_type_repo;
pub mod queue_repo;
pub mod report_repo;
pub mod seed;
pub mod store_repo;
pub mod transaction_repo;
pub mod user_repo;

pub use error::DbError;
pub use pagination::{Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use pool::{
    create_pool, create_pool_with_options, escape_like_pattern, make_like_pattern, DbPool,
    PoolOptions,
};
pub use schema::run_migrations;

pub use contractor_repo::{create_contractor_repository, ContractorRepository};
pub use directory_repo::{create_directory_repository, DirectoryRepository};
pub use history_repo::{create_history_repository, HistoryRepository};
pub use pass_repo::{create_pass_repository, PassRepository};
pub use pass_type_repo::{create_pass_catalog_repository, PassCatalogRepository};
pub use queue_repo::{create_queue_repository, QueueRepository};
pub use report_repo::{
    create_report_repository, ExpiringPass, PassTypeRevenue, ReportRepository, SummaryReport,
};
pub use seed::{ensure_admin_user, seed_directories};
pub use store_repo::{create_store_repository, StoreRepository};
pub use transaction_repo::{create_transaction_repository, TransactionRepository};
pub use user_repo::{create_user_repository, UserRepository};
