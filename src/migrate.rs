//! Schema declaration and idempotent application.
//!
//! Every statement is `IF NOT EXISTS` (or guarded by a `sqlite_master`
//! lookup for the FTS5 table), so applying the schema to a database that
//! already has it is a no-op apart from the `schema_version` marker.

use sqlx::SqliteConnection;

use crate::error::Result;

/// Version written to `schema_version` by this build of the crate.
pub const CURRENT_VERSION: i64 = 1;

pub const CURRENT_DESCRIPTION: &str = "initial schema: series, issues, creators, covers, title search";

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY,
        description TEXT NOT NULL,
        applied_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS series (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS issues (
        id INTEGER PRIMARY KEY,
        digital_id INTEGER,
        title TEXT NOT NULL CHECK (length(title) > 0),
        issue_number TEXT NOT NULL DEFAULT '',
        description TEXT,
        modified TEXT,
        page_count INTEGER CHECK (page_count IS NULL OR page_count >= 0),
        detail_url TEXT NOT NULL CHECK (length(detail_url) > 0),
        series_id INTEGER REFERENCES series(id) ON DELETE RESTRICT,
        on_sale_date TEXT,
        unlimited_date TEXT,
        year_page INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS creators (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS issue_creators (
        issue_id INTEGER NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
        creator_id INTEGER NOT NULL REFERENCES creators(id) ON DELETE RESTRICT,
        role TEXT NOT NULL,
        PRIMARY KEY (issue_id, creator_id, role)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS covers (
        issue_id INTEGER PRIMARY KEY REFERENCES issues(id) ON DELETE CASCADE,
        path TEXT NOT NULL,
        extension TEXT
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_issues_series_id ON issues(series_id)",
    "CREATE INDEX IF NOT EXISTS idx_issues_year_page ON issues(year_page)",
    "CREATE INDEX IF NOT EXISTS idx_issues_on_sale_date ON issues(on_sale_date)",
    "CREATE INDEX IF NOT EXISTS idx_issue_creators_creator_id ON issue_creators(creator_id)",
    "CREATE INDEX IF NOT EXISTS idx_issue_creators_role ON issue_creators(role)",
];

/// Brings the connection's database to the current schema.
///
/// Runs on whatever connection it is handed, so the build calls it inside
/// its transaction and `marvel init` calls it inside a short one of its own.
pub async fn apply_schema(conn: &mut SqliteConnection) -> Result<()> {
    for ddl in TABLES {
        sqlx::query(*ddl).execute(&mut *conn).await?;
    }

    // FTS5 CREATE is not idempotent natively, so we check first
    if !has_search_index(&mut *conn).await? {
        // rowid is the issue id
        sqlx::query("CREATE VIRTUAL TABLE issues_fts USING fts5(title)")
            .execute(&mut *conn)
            .await?;
    }

    for ddl in INDEXES {
        sqlx::query(*ddl).execute(&mut *conn).await?;
    }

    record_version(&mut *conn).await?;
    Ok(())
}

/// Upserts the current version row with a fresh `applied_at`.
///
/// Keyed by version so repeated builds keep exactly one row per version.
pub async fn record_version(conn: &mut SqliteConnection) -> Result<()> {
    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    sqlx::query(
        r#"
        INSERT INTO schema_version (version, description, applied_at) VALUES (?, ?, ?)
        ON CONFLICT(version) DO UPDATE SET
            description = excluded.description,
            applied_at = excluded.applied_at
        "#,
    )
    .bind(CURRENT_VERSION)
    .bind(CURRENT_DESCRIPTION)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Highest applied version, or 0 for a database that was never initialised.
pub async fn current_version(conn: &mut SqliteConnection) -> Result<i64> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(&mut *conn)
    .await?;
    if !exists {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&mut *conn)
        .await?;
    Ok(version.unwrap_or(0))
}

pub async fn has_search_index(conn: &mut SqliteConnection) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='issues_fts'",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

/// Replaces the search index contents with the current issue titles.
pub async fn rebuild_search_index(conn: &mut SqliteConnection) -> Result<u64> {
    sqlx::query("DELETE FROM issues_fts")
        .execute(&mut *conn)
        .await?;
    let done = sqlx::query("INSERT INTO issues_fts (rowid, title) SELECT id, title FROM issues")
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected())
}

/// CLI entry point for `marvel init`.
pub async fn run_init(db_path: &std::path::Path) -> anyhow::Result<()> {
    let pool = crate::db::connect(db_path).await?;
    let mut tx = pool.begin().await?;
    apply_schema(&mut *tx).await?;
    tx.commit().await?;
    pool.close().await;

    println!("Database initialized at {}", db_path.display());
    println!("  schema version: {}", CURRENT_VERSION);
    println!("ok");
    Ok(())
}
