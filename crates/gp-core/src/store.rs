//! Store (trading place) records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A store in the market: a named trading place located by building,
/// floor, line, and store number directory entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    /// Unique identifier.
    pub id: Uuid,
    /// Store name (unique).
    pub name: String,
    /// Store-number directory entry.
    pub store_number_id: Option<Uuid>,
    /// Building directory entry.
    pub building_id: Option<Uuid>,
    /// Floor directory entry.
    pub floor_id: Option<Uuid>,
    /// Line directory entry.
    pub line_id: Option<Uuid>,
    /// Name of the store owner.
    pub owner_name: Option<String>,
    /// Contact phone.
    pub contact_phone: Option<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Creates a new active store.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            store_number_id: None,
            building_id: None,
            floor_id: None,
            line_id: None,
            owner_name: None,
            contact_phone: None,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a store; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct StoreUpdate {
    pub name: Option<String>,
    pub store_number_id: Option<Option<Uuid>>,
    pub building_id: Option<Option<Uuid>>,
    pub floor_id: Option<Option<Uuid>>,
    pub line_id: Option<Option<Uuid>>,
    pub owner_name: Option<Option<String>>,
    pub contact_phone: Option<Option<String>>,
}

/// Filter for store listings.
#[derive(Debug, Clone, Default)]
pub struct StoreFilter {
    /// Matches name or owner name.
    pub search: Option<String>,
    pub include_archived: bool,
    pub building_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_defaults() {
        let s = Store::new("Textile Row 14");
        assert_eq!(s.name, "Textile Row 14");
        assert!(!s.is_archived);
        assert!(s.building_id.is_none());
    }
}
