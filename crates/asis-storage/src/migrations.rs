//! Database schema migrations.
//!
//! Applies the initial schema: conversations, messages, tasks,
//! shopping_items, calendar_events, agent_actions and schema_migrations.

use rusqlite::Connection;
use tracing::info;

use asis_core::error::AsisError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), AsisError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| AsisError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| AsisError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
///
/// Timestamps are Unix seconds. Only messages are owned by another row
/// (their conversation); every other table stands alone.
fn apply_v1(conn: &Connection) -> Result<(), AsisError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY NOT NULL,
            title       TEXT NOT NULL DEFAULT '',
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY NOT NULL,
            conversation_id TEXT NOT NULL
                            REFERENCES conversations (id) ON DELETE CASCADE,
            role            TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content         TEXT NOT NULL,
            audio_path      TEXT,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT PRIMARY KEY NOT NULL,
            title           TEXT NOT NULL,
            description     TEXT,
            due_date        INTEGER,
            reminder_date   INTEGER,
            completed       INTEGER NOT NULL DEFAULT 0,
            priority        INTEGER NOT NULL DEFAULT 1 CHECK (priority BETWEEN 1 AND 3),
            category        TEXT,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_completed
            ON tasks (completed, created_at);

        CREATE TABLE IF NOT EXISTS shopping_items (
            id              TEXT PRIMARY KEY NOT NULL,
            name            TEXT NOT NULL,
            quantity        TEXT NOT NULL DEFAULT '1',
            category        TEXT,
            purchased       INTEGER NOT NULL DEFAULT 0,
            notes           TEXT,
            price_estimate  REAL,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_shopping_purchased
            ON shopping_items (purchased, created_at);

        CREATE TABLE IF NOT EXISTS calendar_events (
            id                  TEXT PRIMARY KEY NOT NULL,
            external_id         TEXT,
            title               TEXT NOT NULL,
            description         TEXT,
            start_time          INTEGER NOT NULL,
            end_time            INTEGER NOT NULL,
            meet_link           TEXT,
            attendee_email      TEXT,
            attendee_name       TEXT,
            reminder_enabled    INTEGER NOT NULL DEFAULT 1,
            reminder_time       INTEGER,
            status              TEXT NOT NULL DEFAULT 'scheduled'
                                CHECK (status IN ('scheduled', 'completed', 'cancelled')),
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_calendar_start
            ON calendar_events (status, start_time);

        CREATE TABLE IF NOT EXISTS agent_actions (
            id          TEXT PRIMARY KEY NOT NULL,
            action_type TEXT NOT NULL,
            target      TEXT,
            content     TEXT,
            status      TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'completed', 'failed')),
            created_at  INTEGER NOT NULL,
            executed_at INTEGER,
            error       TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_agent_actions_created
            ON agent_actions (created_at DESC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| AsisError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_priority_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO tasks (id, title, priority, created_at, updated_at)
             VALUES ('t', 'x', 7, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_messages_cascade_with_conversation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO conversations (id, title, created_at, updated_at) VALUES ('c', 't', 0, 0);
             INSERT INTO messages (id, conversation_id, role, content, created_at)
                 VALUES ('m', 'c', 'user', 'salut', 0);
             DELETE FROM conversations WHERE id = 'c';",
        )
        .unwrap();

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
