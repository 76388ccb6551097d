//! Contractor (worker/visitor) records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A worker or visitor who can be issued passes.
///
/// The passport number is the natural key: the database enforces its
/// uniqueness and the API surfaces collisions as conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contractor {
    /// Unique identifier.
    pub id: Uuid,
    /// Full name as printed in the passport.
    pub full_name: String,
    /// Passport number (unique).
    pub passport_number: String,
    /// Contact phone.
    pub phone: Option<String>,
    /// Citizenship directory entry.
    pub citizenship_id: Option<Uuid>,
    /// Nationality directory entry.
    pub nationality_id: Option<Uuid>,
    /// Position directory entry.
    pub position_id: Option<Uuid>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Soft-archival flag; archived contractors are hidden from default
    /// listings but stay resolvable by id.
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contractor {
    /// Creates a new active contractor.
    pub fn new(full_name: impl Into<String>, passport_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            passport_number: passport_number.into(),
            phone: None,
            citizenship_id: None,
            nationality_id: None,
            position_id: None,
            notes: None,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a contractor; `None` fields are left unchanged.
///
/// `Option<Option<T>>` fields distinguish "leave as is" (`None`) from
/// "clear the value" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct ContractorUpdate {
    pub full_name: Option<String>,
    pub passport_number: Option<String>,
    pub phone: Option<Option<String>>,
    pub citizenship_id: Option<Option<Uuid>>,
    pub nationality_id: Option<Option<Uuid>>,
    pub position_id: Option<Option<Uuid>>,
    pub notes: Option<Option<String>>,
}

/// Filter for contractor listings.
#[derive(Debug, Clone, Default)]
pub struct ContractorFilter {
    /// Matches name, passport number, or phone.
    pub search: Option<String>,
    /// When false (default) archived contractors are excluded.
    pub include_archived: bool,
    pub position_id: Option<Uuid>,
}
