//! Build pipeline: intermediate records → committed database artifact.
//!
//! A build never writes to the target file directly. It stages a copy of
//! the current target (or an empty file) next to it, loads every record
//! into the copy inside one transaction, rebuilds the title index, stamps
//! `schema_version`, commits, and only then renames the copy over the
//! target. Any failure drops the staged file, so the target is exactly as
//! it was before the build started.

use sqlx::SqliteConnection;
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::db;
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::IssueRecord;
use crate::records::RecordReader;
use crate::resolve::IdentityResolver;

/// Counters reported by a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub records: u64,
    pub batches: u64,
    pub series_written: u64,
    pub creators_written: u64,
    pub associations: u64,
    pub covers: u64,
    pub series_linked_late: u64,
    pub series_unresolved: u64,
    pub indexed: u64,
}

/// Runs a full build of `input` into `target`.
pub async fn build_database(input: &Path, target: &Path, batch_size: usize) -> Result<BuildReport> {
    if batch_size == 0 {
        return Err(Error::InvalidInput("batch size must be > 0".to_string()));
    }
    let started = Instant::now();
    let reader = RecordReader::open(input)?;

    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let staged = tempfile::Builder::new()
        .prefix(".marvel-build-")
        .suffix(".db")
        .tempfile_in(&dir)?;
    if target.exists() {
        std::fs::copy(target, staged.path())?;
        debug!(target = %target.display(), "staged copy of existing database");
    }

    let pool = db::connect(staged.path()).await?;
    let loaded = load_all(&pool, reader, batch_size).await;
    pool.close().await;
    let report = loaded?;

    commit_staged(staged, target)?;

    info!(
        records = report.records,
        batches = report.batches,
        elapsed_ms = started.elapsed().as_millis() as u64,
        target = %target.display(),
        "build committed"
    );
    Ok(report)
}

/// Flushes the staged database to disk, then renames it over `target`.
fn commit_staged(staged: NamedTempFile, target: &Path) -> Result<()> {
    staged.as_file().sync_all()?;
    staged.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

async fn load_all(
    pool: &sqlx::SqlitePool,
    reader: RecordReader,
    batch_size: usize,
) -> Result<BuildReport> {
    let mut tx = pool.begin().await?;
    migrate::apply_schema(&mut *tx).await?;

    let mut resolver = IdentityResolver::new();
    let mut report = BuildReport::default();
    let mut batch: Vec<IssueRecord> = Vec::with_capacity(batch_size);

    for item in reader {
        let (_, record) = item?;
        batch.push(record);
        if batch.len() == batch_size {
            write_batch(&mut *tx, &mut resolver, &batch, &mut report).await?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        write_batch(&mut *tx, &mut resolver, &batch, &mut report).await?;
    }

    let links = resolver.finish(&mut *tx).await?;
    report.series_linked_late = links.linked;
    report.series_unresolved = links.unresolved;

    report.indexed = migrate::rebuild_search_index(&mut *tx).await?;
    migrate::record_version(&mut *tx).await?;

    // dropping tx without commit rolls everything back
    tx.commit().await?;
    Ok(report)
}

async fn write_batch(
    conn: &mut SqliteConnection,
    resolver: &mut IdentityResolver,
    batch: &[IssueRecord],
    report: &mut BuildReport,
) -> Result<()> {
    for record in batch {
        write_record(&mut *conn, resolver, record, report).await?;
    }
    report.batches += 1;
    info!(
        records = report.records,
        batch = report.batches,
        "batch loaded"
    );
    Ok(())
}

/// Writes one record: series, creators, issue, associations, cover.
pub async fn write_record(
    conn: &mut SqliteConnection,
    resolver: &mut IdentityResolver,
    record: &IssueRecord,
    report: &mut BuildReport,
) -> Result<()> {
    if let (Some(series_id), Some(name)) = (record.series_id, record.series_name.as_deref()) {
        if resolver.resolve_series(&mut *conn, series_id, name).await? {
            report.series_written += 1;
        }
    }

    for credit in &record.creators {
        if resolver
            .resolve_creator(&mut *conn, credit.creator_id, &credit.creator_name)
            .await?
        {
            report.creators_written += 1;
        }
    }

    let series_id = resolver.series_link(record.id, record.series_id);
    upsert_issue(&mut *conn, record, series_id).await?;

    // Replace the issue's associations so a changed credit list does not
    // leave stale rows behind.
    sqlx::query("DELETE FROM issue_creators WHERE issue_id = ?")
        .bind(record.id)
        .execute(&mut *conn)
        .await?;
    for credit in &record.creators {
        let done = sqlx::query(
            "INSERT INTO issue_creators (issue_id, creator_id, role) VALUES (?, ?, ?) ON CONFLICT(issue_id, creator_id, role) DO NOTHING",
        )
        .bind(record.id)
        .bind(credit.creator_id)
        .bind(&credit.role)
        .execute(&mut *conn)
        .await?;
        report.associations += done.rows_affected();
    }

    match record.cover_path.as_deref() {
        Some(path) => {
            sqlx::query(
                r#"
                INSERT INTO covers (issue_id, path, extension) VALUES (?, ?, ?)
                ON CONFLICT(issue_id) DO UPDATE SET
                    path = excluded.path,
                    extension = excluded.extension
                "#,
            )
            .bind(record.id)
            .bind(path)
            .bind(&record.cover_extension)
            .execute(&mut *conn)
            .await?;
            report.covers += 1;
        }
        None => {
            sqlx::query("DELETE FROM covers WHERE issue_id = ?")
                .bind(record.id)
                .execute(&mut *conn)
                .await?;
        }
    }

    report.records += 1;
    Ok(())
}

async fn upsert_issue(
    conn: &mut SqliteConnection,
    record: &IssueRecord,
    series_id: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO issues (
            id, digital_id, title, issue_number, description, modified, page_count,
            detail_url, series_id, on_sale_date, unlimited_date, year_page
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            digital_id = excluded.digital_id,
            title = excluded.title,
            issue_number = excluded.issue_number,
            description = excluded.description,
            modified = excluded.modified,
            page_count = excluded.page_count,
            detail_url = excluded.detail_url,
            series_id = excluded.series_id,
            on_sale_date = excluded.on_sale_date,
            unlimited_date = excluded.unlimited_date,
            year_page = excluded.year_page
        "#,
    )
    .bind(record.id)
    .bind(record.digital_id)
    .bind(&record.title)
    .bind(&record.issue_number)
    .bind(&record.description)
    .bind(&record.modified)
    .bind(record.page_count)
    .bind(&record.detail_url)
    .bind(series_id)
    .bind(&record.on_sale_date)
    .bind(&record.unlimited_date)
    .bind(record.year_page)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// CLI entry point for `marvel build`.
pub async fn run_build(input: &Path, target: &Path, batch_size: usize) -> anyhow::Result<()> {
    let report = build_database(input, target, batch_size).await?;

    println!("build {}", input.display());
    println!("  records loaded: {}", report.records);
    println!("  batches: {}", report.batches);
    println!("  series written: {}", report.series_written);
    println!("  creators written: {}", report.creators_written);
    println!("  associations: {}", report.associations);
    println!("  covers: {}", report.covers);
    if report.series_unresolved > 0 {
        println!("  unresolved series links: {}", report.series_unresolved);
    }
    println!("  indexed titles: {}", report.indexed);
    println!("  database: {}", target.display());
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_commit_staged_replaces_target() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("marvel.db");
        std::fs::write(&target, b"old").unwrap();

        let mut staged = tempfile::Builder::new()
            .prefix(".marvel-build-")
            .tempfile_in(tmp.path())
            .unwrap();
        staged.write_all(b"new contents").unwrap();
        let staged_path = staged.path().to_path_buf();

        commit_staged(staged, &target).unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new contents");
        assert!(!staged_path.exists());
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("issues.jsonl");
        std::fs::write(&input, "").unwrap();
        let err = build_database(&input, &tmp.path().join("marvel.db"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!tmp.path().join("marvel.db").exists());
    }
}
