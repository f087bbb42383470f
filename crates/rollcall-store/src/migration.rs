//! Ledger schema for SQLite.
//!
//! Versions are applied in order inside one transaction and recorded in
//! `schema_migrations`.

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Latest ledger schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Bring the ledger schema up to [`CURRENT_VERSION`]. Safe to rerun.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// v1: directory, events, activities and enrollments.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Directory of participants referenced by enrollments
        CREATE TABLE participants (
            participant_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT
        );

        CREATE TABLE events (
            event_id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL,               -- PADRAO | RAPIDO
            start_date TEXT,                  -- YYYY-MM-DD
            start_time TEXT,
            end_date TEXT,
            end_time TEXT,
            share_token TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'ABERTO',
            geo_lat REAL,
            geo_lon REAL,
            background_ref TEXT,
            background_width INTEGER,
            background_height INTEGER,
            template TEXT                     -- JSON, native form
        );

        CREATE TABLE activities (
            activity_id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL REFERENCES events(event_id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            speaker TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            date TEXT,
            time TEXT,
            hours INTEGER NOT NULL DEFAULT 0,
            capacity INTEGER NOT NULL DEFAULT -1,  -- -1 = unlimited
            geo_lat REAL,
            geo_lon REAL,
            fast_checkin INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE enrollments (
            enrollment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            activity_id INTEGER NOT NULL REFERENCES activities(activity_id) ON DELETE CASCADE,
            event_id INTEGER NOT NULL,
            participant_id TEXT NOT NULL,
            participant_name TEXT NOT NULL,   -- snapshot at creation
            attended INTEGER NOT NULL DEFAULT 0,
            alternate_address TEXT,
            verification_hash TEXT,
            checkin_lat REAL,
            checkin_lon REAL,
            delivery_status TEXT NOT NULL DEFAULT 'pending',
            delivered_at INTEGER,
            created_at INTEGER NOT NULL,

            UNIQUE(activity_id, participant_id)
        );

        CREATE INDEX idx_activities_event ON activities(event_id);
        CREATE INDEX idx_enrollments_event_participant ON enrollments(event_id, participant_id);
        CREATE UNIQUE INDEX idx_enrollments_hash ON enrollments(verification_hash);
        "#,
    )?;

    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
