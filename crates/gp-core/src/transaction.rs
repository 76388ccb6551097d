//! Cashier transactions.
//!
//! A transaction bundles one or more contractor/store/pass-type
//! selections paid together at the till under a single receipt token.
//! Creating a transaction issues one pass per item; the whole bundle is
//! written in a single database transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A completed cashier transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassTransaction {
    pub id: Uuid,
    /// Receipt token printed for the customer (unique).
    pub token: String,
    /// Cashier who rang the transaction up.
    pub cashier_id: Uuid,
    /// Sum of the selected pass types' costs, in minor units.
    pub total_cents: i64,
    pub note: Option<String>,
    /// First valid day for the passes in this bundle.
    pub starts_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl PassTransaction {
    /// Creates a transaction shell with a generated receipt token.
    ///
    /// The total is supplied by the caller once the pass type costs have
    /// been resolved; the repository persists transaction and passes
    /// atomically.
    pub fn new(cashier_id: Uuid, total_cents: i64, starts_on: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: generate_receipt_token(),
            cashier_id,
            total_cents,
            note: None,
            starts_on,
            created_at: Utc::now(),
        }
    }
}

/// Generates a receipt token of the form `T-XXXXXXXXXX`.
pub fn generate_receipt_token() -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    let tail: String = (0..10)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("T-{}", tail)
}

/// Filter for transaction listings.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub cashier_id: Option<Uuid>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
    /// Matches the receipt token.
    pub search: Option<String>,
}
