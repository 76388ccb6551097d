//! Authentication and authorization types for Gatepass.
//!
//! Provides the user model, the role ladder used for access control
//! throughout the API, and password hashing utilities.

pub mod password;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User role for role-based access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access: user management, catalogs, and everything below.
    Admin,
    /// Operates the till: transactions, pass issuance, queue handling.
    Cashier,
    /// Read-only access to listings and reports.
    #[default]
    Viewer,
}

impl Role {
    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Cashier => "cashier",
            Role::Viewer => "viewer",
        }
    }

    /// Returns true if this role covers the permissions of `required`.
    pub fn covers(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Cashier, Role::Cashier | Role::Viewer) => true,
            (Role::Viewer, Role::Viewer) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "cashier" => Ok(Role::Cashier),
            "viewer" => Ok(Role::Viewer),
            _ => Err(()),
        }
    }
}

/// A back-office user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: Uuid,
    /// Username for login (unique).
    pub username: String,
    /// Email address (unique).
    pub email: String,
    /// Argon2id password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Access role.
    pub role: Role,
    /// Display name shown in listings and history.
    pub display_name: Option<String>,
    /// Whether the account may log in.
    pub enabled: bool,
    /// Last successful login.
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new enabled user.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role,
            display_name: None,
            enabled: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the display name, falling back to the username.
    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    /// Returns true if the user's role covers `required`.
    pub fn covers(&self, required: Role) -> bool {
        self.role.covers(required)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Partial update for a user; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub display_name: Option<Option<String>>,
    pub enabled: Option<bool>,
}

/// Filter for listing users.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub enabled: Option<bool>,
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ladder() {
        assert!(Role::Admin.covers(Role::Admin));
        assert!(Role::Admin.covers(Role::Cashier));
        assert!(Role::Admin.covers(Role::Viewer));

        assert!(!Role::Cashier.covers(Role::Admin));
        assert!(Role::Cashier.covers(Role::Cashier));
        assert!(Role::Cashier.covers(Role::Viewer));

        assert!(!Role::Viewer.covers(Role::Admin));
        assert!(!Role::Viewer.covers(Role::Cashier));
        assert!(Role::Viewer.covers(Role::Viewer));
    }

    #[test]
    fn role_round_trip() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("CASHIER".parse::<Role>(), Ok(Role::Cashier));
        assert_eq!("viewer".parse::<Role>(), Ok(Role::Viewer));
        assert!("manager".parse::<Role>().is_err());
        assert_eq!(Role::Cashier.as_str(), "cashier");
    }

    #[test]
    fn user_display_fallback() {
        let mut user = User::new("ivanov", "ivanov@example.com", "hash", Role::Cashier);
        assert_eq!(user.display(), "ivanov");

        user.display_name = Some("I. Ivanov".to_string());
        assert_eq!(user.display(), "I. Ivanov");
    }

    #[test]
    fn password_hash_not_serialized() {
        let user = User::new("op", "op@example.com", "secret-hash", Role::Viewer);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
