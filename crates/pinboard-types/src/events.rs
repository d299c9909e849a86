use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote tables that publish row-change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Accounts,
    Pins,
    Avatars,
    Invites,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Accounts, Table::Pins, Table::Avatars, Table::Invites];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Pins => "pins",
            Self::Avatars => "avatars",
            Self::Invites => "invites",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row changed in a remote table. Carries no row payload: subscribers
/// re-fetch the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChange {
    pub table: Table,
    pub kind: ChangeKind,
    pub row_id: Option<String>,
}

impl TableChange {
    pub fn new(table: Table, kind: ChangeKind, row_id: impl ToString) -> Self {
        Self {
            table,
            kind,
            row_id: Some(row_id.to_string()),
        }
    }

    /// A change whose affected row isn't known to the publisher.
    pub fn whole_table(table: Table, kind: ChangeKind) -> Self {
        Self {
            table,
            kind,
            row_id: None,
        }
    }
}

/// Events sent over the realtime WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    /// Server confirms the subscription set
    Ready { tables: Vec<Table> },

    /// A row changed in one of the subscribed tables
    Change(TableChange),
}

/// Commands sent FROM client TO server over the realtime WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeCommand {
    /// Replace the set of tables this connection receives changes for.
    Subscribe { tables: Vec<Table> },
}
