//! The pass catalog and issued passes.
//!
//! Pass types describe what can be sold at the till: a price and a
//! validity duration, grouped into pass groups for presentation. An
//! issued [`Pass`] ties a contractor, a store, and a pass type together
//! for a validity window.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A group of pass types, used to organize the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassGroup {
    pub id: Uuid,
    /// Group name (unique).
    pub name: String,
    /// Ordering weight for presentation; lower sorts first.
    pub sort_order: i32,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PassGroup {
    pub fn new(name: impl Into<String>, sort_order: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            sort_order,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A sellable pass type: price and validity duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassType {
    pub id: Uuid,
    /// Owning group.
    pub group_id: Uuid,
    /// Type name, unique within the group.
    pub name: String,
    /// Price in minor currency units.
    pub cost_cents: i64,
    /// Validity length in days, counted from the start date inclusive.
    pub duration_days: i32,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PassType {
    pub fn new(
        group_id: Uuid,
        name: impl Into<String>,
        cost_cents: i64,
        duration_days: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            group_id,
            name: name.into(),
            cost_cents,
            duration_days,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Computes the last valid day for a pass starting on `starts_on`.
    ///
    /// A one-day pass starting today ends today.
    pub fn ends_on(&self, starts_on: NaiveDate) -> NaiveDate {
        starts_on + chrono::Duration::days(i64::from(self.duration_days.max(1)) - 1)
    }
}

/// Partial update for a pass type.
#[derive(Debug, Clone, Default)]
pub struct PassTypeUpdate {
    pub name: Option<String>,
    pub group_id: Option<Uuid>,
    pub cost_cents: Option<i64>,
    pub duration_days: Option<i32>,
}

/// Lifecycle status of an issued pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    /// Valid for entry within its date window.
    #[default]
    Open,
    /// Explicitly closed; no longer valid regardless of dates.
    Closed,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Open => "open",
            PassStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for PassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PassStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(PassStatus::Open),
            "closed" => Ok(PassStatus::Closed),
            _ => Err(()),
        }
    }
}

/// An issued pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pass {
    pub id: Uuid,
    /// Human-readable pass number printed on the card (unique).
    pub number: String,
    pub contractor_id: Uuid,
    pub store_id: Uuid,
    pub pass_type_id: Uuid,
    /// Transaction that paid for this pass, when sold at the till.
    pub transaction_id: Option<Uuid>,
    /// First valid day.
    pub starts_on: NaiveDate,
    /// Last valid day.
    pub ends_on: NaiveDate,
    pub status: PassStatus,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pass {
    /// Creates a new open pass with a generated number.
    pub fn issue(
        contractor_id: Uuid,
        store_id: Uuid,
        pass_type: &PassType,
        starts_on: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            number: generate_pass_number(),
            contractor_id,
            store_id,
            pass_type_id: pass_type.id,
            transaction_id: None,
            starts_on,
            ends_on: pass_type.ends_on(starts_on),
            status: PassStatus::Open,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the pass is open and `date` falls inside its window.
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.status == PassStatus::Open && date >= self.starts_on && date <= self.ends_on
    }
}

/// Alphabet for generated pass numbers. Skips characters that are easy to
/// misread on a printed card (0/O, 1/I/L).
const NUMBER_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Generates a pass number of the form `P-XXXXXXXX`.
pub fn generate_pass_number() -> String {
    let mut rng = rand::thread_rng();
    let tail: String = (0..8)
        .map(|_| NUMBER_ALPHABET[rng.gen_range(0..NUMBER_ALPHABET.len())] as char)
        .collect();
    format!("P-{}", tail)
}

/// Filter for pass listings.
#[derive(Debug, Clone, Default)]
pub struct PassFilter {
    pub contractor_id: Option<Uuid>,
    pub store_id: Option<Uuid>,
    pub status: Option<PassStatus>,
    /// Matches the pass number.
    pub search: Option<String>,
    pub include_archived: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn ends_on_is_inclusive() {
        let group = PassGroup::new("Monthly", 0);
        let ty = PassType::new(group.id, "Standard 30", 150_00, 30);
        assert_eq!(ty.ends_on(date(2024, 3, 1)), date(2024, 3, 30));

        let day = PassType::new(group.id, "Day pass", 10_00, 1);
        assert_eq!(day.ends_on(date(2024, 3, 1)), date(2024, 3, 1));
    }

    #[test]
    fn zero_duration_is_clamped_to_one_day() {
        let group = PassGroup::new("Odd", 0);
        let ty = PassType::new(group.id, "Zero", 0, 0);
        assert_eq!(ty.ends_on(date(2024, 3, 1)), date(2024, 3, 1));
    }

    #[test]
    fn validity_window() {
        let group = PassGroup::new("Weekly", 0);
        let ty = PassType::new(group.id, "Week", 50_00, 7);
        let mut pass = Pass::issue(Uuid::new_v4(), Uuid::new_v4(), &ty, date(2024, 3, 4));

        assert!(pass.is_valid_on(date(2024, 3, 4)));
        assert!(pass.is_valid_on(date(2024, 3, 10)));
        assert!(!pass.is_valid_on(date(2024, 3, 11)));
        assert!(!pass.is_valid_on(date(2024, 3, 3)));

        pass.status = PassStatus::Closed;
        assert!(!pass.is_valid_on(date(2024, 3, 5)));
    }

    #[test]
    fn generated_numbers_have_expected_shape() {
        let n = generate_pass_number();
        assert!(n.starts_with("P-"));
        assert_eq!(n.len(), 10);
        assert!(!n.contains('0') && !n.contains('O') && !n.contains('1'));
    }

    #[test]
    fn status_round_trip() {
        assert_eq!("open".parse::<PassStatus>(), Ok(PassStatus::Open));
        assert_eq!("Closed".parse::<PassStatus>(), Ok(PassStatus::Closed));
        assert!("expired".parse::<PassStatus>().is_err());
    }
}
