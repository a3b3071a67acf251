//! Database statistics for `marvel info`.
//!
//! A quick look at a built artifact: schema version, when it was last
//! built, row counts per table and a per-year breakdown of issues.

use anyhow::{bail, Result};
use sqlx::Row;
use std::path::Path;

use crate::db;
use crate::migrate;

struct YearStats {
    year: Option<i64>,
    issues: i64,
    series: i64,
    available: i64,
}

/// Run the info command: query the database and print a summary.
pub async fn run_info(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        bail!(
            "database not found at {}; run `marvel init` or `marvel build` first",
            db_path.display()
        );
    }
    let pool = db::connect_read_only(db_path, 1).await?;

    let mut conn = pool.acquire().await?;
    let version = migrate::current_version(&mut conn).await?;
    let has_index = migrate::has_search_index(&mut conn).await?;
    drop(conn);

    if version == 0 {
        pool.close().await;
        bail!("{} has no schema; run `marvel init` first", db_path.display());
    }

    let applied_at: Option<String> =
        sqlx::query_scalar("SELECT applied_at FROM schema_version WHERE version = ?")
            .bind(version)
            .fetch_optional(&pool)
            .await?;

    let mut counts = Vec::new();
    for table in ["issues", "series", "creators", "issue_creators", "covers"] {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&pool)
            .await?;
        counts.push((table, n));
    }
    let indexed: i64 = if has_index {
        sqlx::query_scalar("SELECT COUNT(*) FROM issues_fts")
            .fetch_one(&pool)
            .await?
    } else {
        0
    };

    let db_size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    println!("Marvel Metadata — Database Info");
    println!("===============================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Schema:      v{}", version);
    if let Some(ref at) = applied_at {
        println!("  Last build:  {}", at);
    }
    println!();
    for (table, n) in &counts {
        println!("  {:<15} {}", format!("{}:", table), n);
    }
    println!(
        "  {:<15} {}",
        "search index:",
        if has_index {
            indexed.to_string()
        } else {
            "missing".to_string()
        }
    );

    let year_rows = sqlx::query(
        r#"
        SELECT year_page AS year,
               COUNT(*) AS issues,
               COUNT(DISTINCT series_id) AS series,
               SUM(CASE WHEN unlimited_date IS NOT NULL THEN 1 ELSE 0 END) AS available
        FROM issues
        GROUP BY year_page
        ORDER BY year_page IS NULL, year_page ASC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let years: Vec<YearStats> = year_rows
        .iter()
        .map(|row| YearStats {
            year: row.get("year"),
            issues: row.get("issues"),
            series: row.get("series"),
            available: row.get("available"),
        })
        .collect();

    if !years.is_empty() {
        println!();
        println!("  By year:");
        println!(
            "  {:<8} {:>8} {:>8} {:>10}",
            "YEAR", "ISSUES", "SERIES", "UNLIMITED"
        );
        println!("  {}", "-".repeat(38));
        for y in &years {
            let label = y.year.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<8} {:>8} {:>8} {:>10}",
                label, y.issues, y.series, y.available
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
