//! Database module for SQLite persistence.
//!
//! SQLite holds the `events`, `eventAttendees` and `tickets` collections. Every
//! write is announced on a broadcast change feed that live projections follow.

mod repository;
mod store;

pub use repository::*;
pub use store::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            organization_id TEXT NOT NULL,
            architecture TEXT NOT NULL,
            sessions TEXT NOT NULL DEFAULT '[]',
            tickets TEXT NOT NULL DEFAULT '[]',
            time_slots TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // `session_id` is the record's own field; `resolved_session_id` is filled at
    // ingestion from whichever reference the record carries and backs the index.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS event_attendees (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            resolved_session_id TEXT,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            tickets TEXT,
            ticket_type TEXT,
            session_id TEXT,
            selected_session TEXT,
            selected_date TEXT,
            selected_time_slot TEXT,
            individual_amount REAL,
            original_booking TEXT,
            payment_status TEXT,
            checked_in INTEGER NOT NULL DEFAULT 0,
            check_in_time TEXT,
            checked_in_by TEXT,
            ticket_ids TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            session_id TEXT,
            user_email TEXT NOT NULL,
            user_name TEXT,
            ticket_type TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            used_at TEXT,
            checked_in_by TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_events_organization ON events(organization_id);
        CREATE INDEX IF NOT EXISTS idx_attendees_event_created ON event_attendees(event_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_attendees_event_session ON event_attendees(event_id, resolved_session_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_tickets_event_session ON tickets(event_id, session_id);
        CREATE INDEX IF NOT EXISTS idx_tickets_email ON tickets(event_id, user_email, status);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
