//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use wakeprompt_core::error::WakepromptError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), WakepromptError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| {
        WakepromptError::Persistence(format!("Failed to create migrations table: {}", e))
    })?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            WakepromptError::Persistence(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: alarms");
    }

    if current_version < 2 {
        apply_v2(conn)?;
        info!("Applied migration v2: alarm update time");
    }

    Ok(())
}

/// Version 1: alarm records.
fn apply_v1(conn: &Connection) -> Result<(), WakepromptError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS alarms (
            id                  TEXT PRIMARY KEY NOT NULL,
            fire_time           INTEGER NOT NULL,
            voice               TEXT NOT NULL,
            prompt              TEXT,
            enabled             INTEGER NOT NULL DEFAULT 1,
            state               TEXT NOT NULL
                                CHECK (state IN ('draft', 'generating_text', 'generating_audio',
                                                 'arming_primary_alarm', 'arming_fallback_alarm',
                                                 'armed', 'completed', 'error_blocked')),
            generated_text      TEXT,
            audio_filename      TEXT,
            audio_duration_secs REAL,
            last_generated_at   INTEGER,
            fired_mode          TEXT CHECK (fired_mode IN ('primary', 'fallback')),
            failure_reason      TEXT,
            created_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_alarms_created_at
            ON alarms (created_at DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'alarms');
        ",
    )
    .map_err(|e| WakepromptError::Persistence(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}

/// Version 2: last-change time, used to tell live pipelines from orphans.
fn apply_v2(conn: &Connection) -> Result<(), WakepromptError> {
    conn.execute_batch(
        "
        ALTER TABLE alarms ADD COLUMN updated_at INTEGER NOT NULL DEFAULT 0;
        UPDATE alarms SET updated_at = created_at;

        INSERT INTO schema_migrations (version, name) VALUES (2, 'alarm_updated_at');
        ",
    )
    .map_err(|e| WakepromptError::Persistence(format!("Migration v2 failed: {}", e)))?;
    Ok(())
}
