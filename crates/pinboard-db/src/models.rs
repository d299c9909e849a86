//! Database row types. These map directly to SQLite rows and stay distinct
//! from the pinboard-types models; `into_*` converts at the boundary.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use pinboard_types::models::{Account, Avatar, Invite, Pin, Role};

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: String,
    pub uid: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub hint: String,
    pub points: i64,
    pub role: String,
}

/// A pin joined with both of its accounts.
#[derive(Debug, Clone)]
pub struct PinRow {
    pub id: String,
    pub reason: String,
    pub reactions: Option<i64>,
    pub created_at: String,
    pub giver: AccountRow,
    pub receiver: AccountRow,
}

#[derive(Debug, Clone)]
pub struct AvatarRow {
    pub id: String,
    pub name: String,
    pub image: String,
    pub price: i64,
    pub hint: String,
}

#[derive(Debug, Clone)]
pub struct InviteRow {
    pub email: String,
    pub created_at: String,
}

impl AccountRow {
    pub fn into_account(self) -> Account {
        Account {
            id: parse_id(&self.id, "account"),
            role: self.role.parse().unwrap_or_else(|e| {
                warn!("Corrupt role on account '{}': {}", self.id, e);
                Role::User
            }),
            uid: self.uid,
            name: self.name,
            email: self.email,
            avatar: self.avatar,
            hint: self.hint,
            points: self.points,
        }
    }
}

impl PinRow {
    pub fn into_pin(self) -> Pin {
        Pin {
            id: parse_id(&self.id, "pin"),
            created_at: parse_timestamp(&self.created_at),
            reactions: self.reactions.map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX)),
            reason: self.reason,
            giver: self.giver.into_account(),
            receiver: self.receiver.into_account(),
        }
    }
}

impl AvatarRow {
    pub fn into_avatar(self) -> Avatar {
        Avatar {
            id: parse_id(&self.id, "avatar"),
            name: self.name,
            image: self.image,
            price: self.price,
            hint: self.hint,
        }
    }
}

impl InviteRow {
    pub fn into_invite(self) -> Invite {
        Invite {
            created_at: parse_timestamp(&self.created_at),
            email: self.email,
        }
    }
}

fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::default()
    })
}

/// Accepts RFC 3339 (what we write) and SQLite's own `datetime('now')`
/// format, which has no timezone and is UTC.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
