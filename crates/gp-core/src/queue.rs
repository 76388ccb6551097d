//! Service queue tokens.
//!
//! A queue token represents a person's turn at a service window. Tokens
//! are numbered per day, tagged with the service kind, owned by the user
//! who issued them, and move through exactly one transition:
//! Active → Closed. Every change is broadcast to connected clients so
//! they can refetch the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status of a queue token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    /// Waiting to be served.
    #[default]
    Active,
    /// Served or abandoned; terminal.
    Closed,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TokenStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(TokenStatus::Active),
            "closed" => Ok(TokenStatus::Closed),
            _ => Err(()),
        }
    }
}

/// A ticket in the service queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueToken {
    pub id: Uuid,
    /// Position number, sequential within the issue day.
    pub number: i64,
    /// Service kind the token queues for (e.g. "passes", "payments").
    pub kind: String,
    /// User who issued the token and owns the turn.
    pub issued_by: Uuid,
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
    /// Set when the token is closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// User who closed the token.
    pub closed_by: Option<Uuid>,
}

impl QueueToken {
    /// Creates an active token. The day-sequential number is assigned by
    /// the repository at insert time; callers pass a placeholder.
    pub fn new(kind: impl Into<String>, issued_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            number: 0,
            kind: kind.into(),
            issued_by,
            status: TokenStatus::Active,
            created_at: Utc::now(),
            closed_at: None,
            closed_by: None,
        }
    }

    /// Returns true if this token may still be closed.
    pub fn is_active(&self) -> bool {
        self.status == TokenStatus::Active
    }
}

/// Filter for queue token listings.
#[derive(Debug, Clone, Default)]
pub struct QueueTokenFilter {
    pub status: Option<TokenStatus>,
    pub kind: Option<String>,
    /// Restrict to tokens issued by this user.
    pub issued_by: Option<Uuid>,
    /// Restrict to tokens created today.
    pub today_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_token_is_active() {
        let token = QueueToken::new("passes", Uuid::new_v4());
        assert!(token.is_active());
        assert!(token.closed_at.is_none());
        assert!(token.closed_by.is_none());
    }

    #[test]
    fn status_round_trip() {
        assert_eq!("active".parse::<TokenStatus>(), Ok(TokenStatus::Active));
        assert_eq!("CLOSED".parse::<TokenStatus>(), Ok(TokenStatus::Closed));
        assert!("pending".parse::<TokenStatus>().is_err());
    }
}
