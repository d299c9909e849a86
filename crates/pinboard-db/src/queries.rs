use crate::Database;
use crate::models::{AccountRow, AvatarRow, InviteRow, PinRow};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row};

use pinboard_types::api::{NewAccount, NewAvatar};
use pinboard_types::models::{Avatar, Role};

const ACCOUNT_COLUMNS: &str = "id, uid, name, email, avatar, hint, points, role";

const PIN_SELECT: &str = "SELECT p.id, p.reason, p.reactions, p.created_at,
            g.id, g.uid, g.name, g.email, g.avatar, g.hint, g.points, g.role,
            r.id, r.uid, r.name, r.email, r.avatar, r.hint, r.points, r.role
     FROM pins p
     JOIN accounts g ON g.id = p.giver_id
     JOIN accounts r ON r.id = p.receiver_id";

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Database {
    // -- Accounts --

    pub fn list_accounts(&self) -> Result<Vec<AccountRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM accounts ORDER BY created_at, rowid",
                ACCOUNT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], |row| account_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_account(&self, id: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "id", id))
    }

    /// Case-insensitive lookup by the identity key.
    pub fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "email", email))
    }

    pub fn insert_account(&self, id: &str, account: &NewAccount) -> Result<AccountRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, uid, name, email, avatar, hint, points, role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                rusqlite::params![
                    id,
                    account.uid,
                    account.name,
                    account.email,
                    account.avatar,
                    account.hint,
                    account.role.as_str(),
                ],
            )?;
            query_account(conn, "id", id)?
                .ok_or_else(|| anyhow::anyhow!("Account vanished after insert: {}", id))
        })
    }

    pub fn set_account_role(&self, id: &str, role: Role) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE accounts SET role = ?1 WHERE id = ?2",
                (role.as_str(), id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_account_avatar(&self, id: &str, avatar: &str, hint: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE accounts SET avatar = ?1, hint = ?2 WHERE id = ?3",
                (avatar, hint, id),
            )?;
            Ok(changed > 0)
        })
    }

    /// Removes every pin the account gave or received, taking one point back
    /// from the receiver of each, in a single transaction.
    pub fn delete_pins_for_account(&self, account_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE accounts SET points = points - (
                     SELECT COUNT(*) FROM pins
                     WHERE pins.receiver_id = accounts.id
                       AND (pins.giver_id = ?1 OR pins.receiver_id = ?1)
                 )
                 WHERE id IN (
                     SELECT receiver_id FROM pins WHERE giver_id = ?1 OR receiver_id = ?1
                 )",
                [account_id],
            )?;
            let deleted = tx.execute(
                "DELETE FROM pins WHERE giver_id = ?1 OR receiver_id = ?1",
                [account_id],
            )?;
            tx.commit()?;
            Ok(deleted)
        })
    }

    /// Fails with a foreign key violation while pins still reference the account.
    pub fn delete_account(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    // -- Pins --

    /// Newest first.
    pub fn list_pins(&self) -> Result<Vec<PinRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{} ORDER BY p.created_at DESC, p.rowid DESC", PIN_SELECT))?;
            let rows = stmt
                .query_map([], pin_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_pin(&self, id: &str) -> Result<Option<PinRow>> {
        self.with_conn(|conn| query_pin(conn, id))
    }

    /// Insert a pin and credit the receiver one point in a single transaction.
    /// Returns `None` when either account does not exist.
    pub fn award_pin(
        &self,
        id: &str,
        giver_id: &str,
        receiver_id: &str,
        reason: &str,
    ) -> Result<Option<PinRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let known: i64 = tx.query_row(
                "SELECT COUNT(*) FROM accounts WHERE id IN (?1, ?2)",
                (giver_id, receiver_id),
                |row| row.get(0),
            )?;
            let expected = if giver_id == receiver_id { 1 } else { 2 };
            if known < expected {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO pins (id, giver_id, receiver_id, reason, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, giver_id, receiver_id, reason, now_timestamp()],
            )?;
            tx.execute(
                "UPDATE accounts SET points = points + 1 WHERE id = ?1",
                [receiver_id],
            )?;
            tx.commit()?;

            query_pin(conn, id)
        })
    }

    /// Delete a pin and take the point back from its receiver in a single
    /// transaction. Returns `false` when the pin does not exist.
    pub fn revoke_pin(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let receiver_id: Option<String> = tx
                .query_row("SELECT receiver_id FROM pins WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            let Some(receiver_id) = receiver_id else {
                return Ok(false);
            };

            tx.execute("DELETE FROM pins WHERE id = ?1", [id])?;
            tx.execute(
                "UPDATE accounts SET points = points - 1 WHERE id = ?1",
                [&receiver_id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Bump the reaction tally. Returns the new tally, or `None` for an unknown pin.
    pub fn add_pin_reaction(&self, id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "UPDATE pins SET reactions = COALESCE(reactions, 0) + 1 WHERE id = ?1 RETURNING reactions",
                [id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    // -- Avatars --

    pub fn list_avatars(&self) -> Result<Vec<AvatarRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, image, price, hint FROM avatars ORDER BY price, name",
            )?;
            let rows = stmt
                .query_map([], avatar_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn insert_avatar(&self, id: &str, avatar: &NewAvatar) -> Result<AvatarRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO avatars (id, name, image, price, hint) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, avatar.name, avatar.image, avatar.price, avatar.hint],
            )?;
            Ok(AvatarRow {
                id: id.to_string(),
                name: avatar.name.clone(),
                image: avatar.image.clone(),
                price: avatar.price,
                hint: avatar.hint.clone(),
            })
        })
    }

    pub fn update_avatar(&self, avatar: &Avatar) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE avatars SET name = ?1, image = ?2, price = ?3, hint = ?4 WHERE id = ?5",
                rusqlite::params![
                    avatar.name,
                    avatar.image,
                    avatar.price,
                    avatar.hint,
                    avatar.id.to_string(),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_avatar(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM avatars WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    // -- Invites --

    pub fn list_invites(&self) -> Result<Vec<InviteRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT email, created_at FROM invites ORDER BY created_at, email")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(InviteRow {
                        email: row.get(0)?,
                        created_at: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_invite(&self, email: &str) -> Result<Option<InviteRow>> {
        self.with_conn(|conn| query_invite(conn, email))
    }

    /// Idempotent: inviting an already invited email returns the existing row.
    pub fn insert_invite(&self, email: &str) -> Result<InviteRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO invites (email, created_at) VALUES (?1, ?2)",
                (email, now_timestamp()),
            )?;
            query_invite(conn, email)?
                .ok_or_else(|| anyhow::anyhow!("Invite vanished after insert: {}", email))
        })
    }

    pub fn delete_invite(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM invites WHERE email = ?1", [email])?;
            Ok(deleted > 0)
        })
    }
}

fn account_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(offset)?,
        uid: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        email: row.get(offset + 3)?,
        avatar: row.get(offset + 4)?,
        hint: row.get(offset + 5)?,
        points: row.get(offset + 6)?,
        role: row.get(offset + 7)?,
    })
}

fn pin_from_row(row: &Row<'_>) -> rusqlite::Result<PinRow> {
    Ok(PinRow {
        id: row.get(0)?,
        reason: row.get(1)?,
        reactions: row.get(2)?,
        created_at: row.get(3)?,
        giver: account_from_row(row, 4)?,
        receiver: account_from_row(row, 12)?,
    })
}

fn avatar_from_row(row: &Row<'_>) -> rusqlite::Result<AvatarRow> {
    Ok(AvatarRow {
        id: row.get(0)?,
        name: row.get(1)?,
        image: row.get(2)?,
        price: row.get(3)?,
        hint: row.get(4)?,
    })
}

/// `column` is one of our own constants, never caller input.
fn query_account(conn: &Connection, column: &str, value: &str) -> Result<Option<AccountRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM accounts WHERE {} = ?1",
        ACCOUNT_COLUMNS, column
    ))?;
    let row = stmt.query_row([value], |row| account_from_row(row, 0)).optional()?;
    Ok(row)
}

fn query_pin(conn: &Connection, id: &str) -> Result<Option<PinRow>> {
    let mut stmt = conn.prepare(&format!("{} WHERE p.id = ?1", PIN_SELECT))?;
    let row = stmt.query_row([id], pin_from_row).optional()?;
    Ok(row)
}

fn query_invite(conn: &Connection, email: &str) -> Result<Option<InviteRow>> {
    let row = conn
        .query_row(
            "SELECT email, created_at FROM invites WHERE email = ?1",
            [email],
            |row| {
                Ok(InviteRow {
                    email: row.get(0)?,
                    created_at: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
