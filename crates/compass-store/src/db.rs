use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// Open the SQLite database at `path` with WAL and a bounded busy timeout,
/// so concurrent readers never block a store call indefinitely.
pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Initialise all tables. Safe to call on every startup — `IF NOT EXISTS`
/// makes it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                TEXT PRIMARY KEY NOT NULL,
            telegram_chat_id  INTEGER NOT NULL UNIQUE,
            language          TEXT NOT NULL DEFAULT 'zh-CN',
            timezone          TEXT NOT NULL DEFAULT 'Asia/Shanghai',
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS goals (
            id          TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL REFERENCES users(id),
            title       TEXT NOT NULL DEFAULT '',
            status      TEXT NOT NULL DEFAULT 'draft',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_goals_user_status
            ON goals (user_id, status);

        CREATE TABLE IF NOT EXISTS planning_sessions (
            id               TEXT PRIMARY KEY NOT NULL,
            goal_id          TEXT NOT NULL UNIQUE REFERENCES goals(id),
            state            TEXT NOT NULL DEFAULT 'idle',
            slot_completion  TEXT NOT NULL DEFAULT '{}',
            turn_count       INTEGER NOT NULL DEFAULT 0,
            last_intent      TEXT,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_turns (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id         TEXT NOT NULL REFERENCES planning_sessions(id),
            role               TEXT NOT NULL,
            content            TEXT NOT NULL,
            intent             TEXT,
            intent_confidence  REAL,
            created_at         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turns_session
            ON conversation_turns (session_id, id);

        CREATE TABLE IF NOT EXISTS message_dedup (
            update_id    INTEGER PRIMARY KEY NOT NULL,
            chat_id      INTEGER NOT NULL,
            received_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bot_runtime_states (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    )?;
    Ok(())
}
