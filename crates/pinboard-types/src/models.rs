use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A user identity record. `email` is the key used to match an externally
/// authenticated session to its local record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Subject id issued by the identity provider.
    pub uid: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub hint: String,
    pub points: i64,
    pub role: Role,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// An endorsement/complaint event worth one point to the receiver.
///
/// Giver and receiver are embedded account snapshots resolved at read time,
/// never stored redundantly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub id: Uuid,
    pub giver: Account,
    pub receiver: Account,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub reactions: Option<u32>,
}

impl Pin {
    pub fn involves(&self, account_id: Uuid) -> bool {
        self.giver.id == account_id || self.receiver.id == account_id
    }
}

/// A purchasable cosmetic. A price of 0 marks a default/free item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub price: i64,
    pub hint: String,
}

impl Avatar {
    pub fn is_free(&self) -> bool {
        self.price == 0
    }
}

/// Allow-list entry consulted by the invite-only access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub email: String,
    pub created_at: DateTime<Utc>,
}
