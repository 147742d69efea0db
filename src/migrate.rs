//! Database schema migrations.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running migrations
//! repeatedly is safe.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per distinct content hash. Rows are never removed; deletion
    // only sets deleted_at.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hash BLOB NOT NULL UNIQUE,
            deleted_at INTEGER,
            repository INTEGER NOT NULL DEFAULT 1,
            perceptual_hash INTEGER,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_tags (
            item_id INTEGER NOT NULL,
            namespace TEXT NOT NULL DEFAULT '',
            subtag TEXT NOT NULL,
            PRIMARY KEY (item_id, namespace, subtag),
            FOREIGN KEY (item_id) REFERENCES items(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS duplicate_candidates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id_1 INTEGER NOT NULL,
            item_id_2 INTEGER NOT NULL,
            distance REAL NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(item_id_1, item_id_2),
            CHECK (item_id_1 < item_id_2),
            FOREIGN KEY (item_id_1) REFERENCES items(id),
            FOREIGN KEY (item_id_2) REFERENCES items(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS duplicate_decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id_1 INTEGER NOT NULL,
            item_id_2 INTEGER NOT NULL,
            resolution TEXT NOT NULL,
            decided_at INTEGER NOT NULL,
            CHECK (item_id_1 < item_id_2),
            FOREIGN KEY (item_id_1) REFERENCES items(id),
            FOREIGN KEY (item_id_2) REFERENCES items(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_unhashed ON items(id) WHERE perceptual_hash IS NULL AND deleted_at IS NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_decisions_pair ON duplicate_decisions(item_id_1, item_id_2)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
