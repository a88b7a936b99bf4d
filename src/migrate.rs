//! Schema migrations.
//!
//! Migrations are numbered and strictly additive. Each applied version is
//! recorded in `schema_versions`; opening a database only runs the versions
//! it has not seen, so an older file gains the missing tables without losing
//! data, and a database written by a newer binary is refused.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

struct Migration {
    version: i64,
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "documents",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                doc_type TEXT NOT NULL,
                content TEXT NOT NULL,
                tags_json TEXT NOT NULL DEFAULT '[]',
                metadata_json TEXT NOT NULL DEFAULT '[]',
                last_modified INTEGER NOT NULL,
                pinned INTEGER NOT NULL DEFAULT 0,
                remote_ref TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(doc_type)",
            "CREATE INDEX IF NOT EXISTS idx_documents_last_modified ON documents(last_modified DESC)",
            "CREATE INDEX IF NOT EXISTS idx_documents_remote_ref ON documents(remote_ref)",
        ],
    },
    Migration {
        version: 2,
        name: "embeddings",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                document_id TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                vector BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            )
            "#],
    },
    Migration {
        version: 3,
        name: "type_schemas_and_tags",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS type_schemas (
                name TEXT PRIMARY KEY,
                color TEXT NOT NULL,
                properties_json TEXT NOT NULL DEFAULT '[]'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tag_configs (
                name TEXT PRIMARY KEY,
                color TEXT NOT NULL
            )
            "#,
        ],
    },
    Migration {
        version: 4,
        name: "sync_cursors",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS sync_cursors (
                name TEXT PRIMARY KEY,
                cursor TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#],
    },
    Migration {
        version: 5,
        name: "mirrored_messages",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS mirrored_messages (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL DEFAULT '',
                snippet TEXT NOT NULL DEFAULT '',
                received_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_mirrored_received_at ON mirrored_messages(received_at DESC)",
        ],
    },
];

/// The newest schema version this binary knows.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Highest applied version, 0 for a fresh database.
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_versions")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every pending migration. Returns the number applied.
pub async fn apply_migrations(pool: &SqlitePool) -> Result<usize> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current = current_version(pool).await?;
    let latest = latest_version();
    if current > latest {
        bail!(
            "database schema version {} is newer than supported version {}",
            current,
            latest
        );
    }

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_versions (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(version = migration.version, name = migration.name, "applied migration");
        applied += 1;
    }
    Ok(applied)
}

/// Open the configured database, migrate it, and close the pool.
pub async fn run_migrations(config: &Config) -> Result<usize> {
    let pool = db::connect(config).await?;
    let applied = apply_migrations(&pool).await?;
    pool.close().await;
    Ok(applied)
}
