//! Reference directories.
//!
//! The back office keeps seven small lookup catalogs: citizenships,
//! nationalities, positions, buildings, floors, lines, and store numbers.
//! They share one shape and one table, distinguished by [`DirectoryKind`];
//! entry names are unique within a kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which reference catalog an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryKind {
    Citizenship,
    Nationality,
    Position,
    Building,
    Floor,
    Line,
    StoreNumber,
}

impl DirectoryKind {
    /// All catalogs, in presentation order.
    pub const ALL: [DirectoryKind; 7] = [
        DirectoryKind::Citizenship,
        DirectoryKind::Nationality,
        DirectoryKind::Position,
        DirectoryKind::Building,
        DirectoryKind::Floor,
        DirectoryKind::Line,
        DirectoryKind::StoreNumber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DirectoryKind::Citizenship => "citizenship",
            DirectoryKind::Nationality => "nationality",
            DirectoryKind::Position => "position",
            DirectoryKind::Building => "building",
            DirectoryKind::Floor => "floor",
            DirectoryKind::Line => "line",
            DirectoryKind::StoreNumber => "store_number",
        }
    }
}

impl fmt::Display for DirectoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DirectoryKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "citizenship" | "citizenships" => Ok(DirectoryKind::Citizenship),
            "nationality" | "nationalities" => Ok(DirectoryKind::Nationality),
            "position" | "positions" => Ok(DirectoryKind::Position),
            "building" | "buildings" => Ok(DirectoryKind::Building),
            "floor" | "floors" => Ok(DirectoryKind::Floor),
            "line" | "lines" => Ok(DirectoryKind::Line),
            "store_number" | "store_numbers" => Ok(DirectoryKind::StoreNumber),
            _ => Err(()),
        }
    }
}

/// A single entry in one of the reference catalogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: Uuid,
    pub kind: DirectoryKind,
    /// Entry name, unique within the kind.
    pub name: String,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DirectoryEntry {
    /// Creates a new active entry.
    pub fn new(kind: DirectoryKind, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }
}
