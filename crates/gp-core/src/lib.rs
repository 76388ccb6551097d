//! # gp-core
//!
//! Core domain models and persistence for Gatepass, the pass-management
//! back office. This crate provides the entity types (contractors, stores,
//! the pass catalog, transactions, queue tokens), authentication
//! primitives, the in-process event bus, and the SQLx database layer with
//! SQLite and PostgreSQL backends.

pub mod auth;
pub mod contractor;
pub mod db;
pub mod directory;
pub mod events;
pub mod history;
pub mod pass;
pub mod queue;
pub mod store;
pub mod transaction;

pub use auth::password::{
    hash_password, validate_password_strength, verify_password, PasswordError,
};
pub use auth::{Role, User, UserFilter, UserUpdate};
pub use contractor::{Contractor, ContractorFilter, ContractorUpdate};
pub use directory::{DirectoryEntry, DirectoryKind};
pub use events::{BackofficeEvent, EventBus};
pub use history::{EntityKind, HistoryAction, HistoryEntry, HistoryFilter};
pub use pass::{Pass, PassFilter, PassGroup, PassStatus, PassType, PassTypeUpdate};
pub use queue::{QueueToken, QueueTokenFilter, TokenStatus};
pub use store::{Store, StoreFilter, StoreUpdate};
pub use transaction::{PassTransaction, TransactionFilter};
