use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id          TEXT PRIMARY KEY,
            uid         TEXT NOT NULL,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
            avatar      TEXT NOT NULL DEFAULT '',
            hint        TEXT NOT NULL DEFAULT '',
            points      INTEGER NOT NULL DEFAULT 0,
            role        TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- No ON DELETE CASCADE: callers remove dependent pins before the account.
        CREATE TABLE IF NOT EXISTS pins (
            id           TEXT PRIMARY KEY,
            giver_id     TEXT NOT NULL REFERENCES accounts(id),
            receiver_id  TEXT NOT NULL REFERENCES accounts(id),
            reason       TEXT NOT NULL,
            reactions    INTEGER,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_pins_giver
            ON pins(giver_id);

        CREATE INDEX IF NOT EXISTS idx_pins_receiver
            ON pins(receiver_id);

        CREATE INDEX IF NOT EXISTS idx_pins_created
            ON pins(created_at);

        CREATE TABLE IF NOT EXISTS avatars (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            image       TEXT NOT NULL,
            price       INTEGER NOT NULL DEFAULT 0 CHECK (price >= 0),
            hint        TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS invites (
            email       TEXT PRIMARY KEY COLLATE NOCASE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
