//! Change history.
//!
//! Mutations to the main entities are recorded as append-only history
//! entries: who did what to which record, with a JSON detail blob for
//! the changed fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which entity a history entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contractor,
    Store,
    Pass,
    Transaction,
    QueueToken,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Contractor => "contractor",
            EntityKind::Store => "store",
            EntityKind::Pass => "pass",
            EntityKind::Transaction => "transaction",
            EntityKind::QueueToken => "queue_token",
            EntityKind::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contractor" => Ok(EntityKind::Contractor),
            "store" => Ok(EntityKind::Store),
            "pass" => Ok(EntityKind::Pass),
            "transaction" => Ok(EntityKind::Transaction),
            "queue_token" => Ok(EntityKind::QueueToken),
            "user" => Ok(EntityKind::User),
            _ => Err(()),
        }
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    Archived,
    Restored,
    Closed,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Updated => "updated",
            HistoryAction::Archived => "archived",
            HistoryAction::Restored => "restored",
            HistoryAction::Closed => "closed",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(HistoryAction::Created),
            "updated" => Ok(HistoryAction::Updated),
            "archived" => Ok(HistoryAction::Archived),
            "restored" => Ok(HistoryAction::Restored),
            "closed" => Ok(HistoryAction::Closed),
            _ => Err(()),
        }
    }
}

/// One append-only history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub action: HistoryAction,
    /// Username of the actor, "system" for seeding and maintenance.
    pub actor: String,
    /// Changed fields or other context.
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: Uuid,
        action: HistoryAction,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_kind,
            entity_id,
            action,
            actor: actor.into(),
            details: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Filter for history listings.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<Uuid>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}
