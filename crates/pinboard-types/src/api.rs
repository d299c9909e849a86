use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Avatar, Role};

/// Longest accepted pin reason, in characters.
pub const MAX_REASON_LEN: usize = 500;

// -- Accounts --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewAccount {
    pub uid: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub role: Role,
}

impl NewAccount {
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && self.email.contains('@')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleUpdate {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvatarSelection {
    pub avatar: String,
    pub hint: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeletedCount {
    pub deleted: usize,
}

// -- Pins --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewPin {
    pub giver_id: Uuid,
    pub receiver_id: Uuid,
    pub reason: String,
}

impl NewPin {
    /// The trimmed reason, or `None` when it is blank or too long.
    pub fn clean_reason(&self) -> Option<String> {
        let reason = self.reason.trim();
        (!reason.is_empty() && reason.chars().count() <= MAX_REASON_LEN).then(|| reason.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReactionTally {
    pub reactions: u32,
}

// -- Avatars --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewAvatar {
    pub name: String,
    pub image: String,
    pub price: i64,
    #[serde(default)]
    pub hint: String,
}

impl NewAvatar {
    pub fn is_valid(&self) -> bool {
        avatar_fields_valid(&self.name, self.price)
    }
}

impl Avatar {
    pub fn is_valid(&self) -> bool {
        avatar_fields_valid(&self.name, self.price)
    }
}

fn avatar_fields_valid(name: &str, price: i64) -> bool {
    !name.trim().is_empty() && price >= 0
}

// -- Invites --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewInvite {
    pub email: String,
}

impl NewInvite {
    /// The trimmed email, or `None` when it can't be an address.
    pub fn clean_email(&self) -> Option<String> {
        clean_invite_email(&self.email)
    }
}

pub fn clean_invite_email(email: &str) -> Option<String> {
    let email = email.trim();
    email.contains('@').then(|| email.to_string())
}
