//! Title search over the FTS5 index.
//!
//! Free text is turned into an FTS5 expression where every word of two or
//! more characters must prefix-match a title token. Hyphens split words so
//! `spider-man` finds "Spider-Man" and "Spider Man" alike. Results are
//! ordered by bm25 rank, ties broken by ascending issue id.

use serde::Serialize;
use sqlx::Row;
use std::path::Path;

use crate::catalog::{issue_summary, Catalog};
use crate::db;
use crate::error::{Error, Result};
use crate::models::IssueSummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub issue: IssueSummary,
    /// Negated bm25 rank; higher is better.
    pub score: f64,
}

/// Builds the FTS5 MATCH expression for `query`, or `None` when no word
/// is long enough to search on.
pub fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .replace('-', " ")
        .split_whitespace()
        .filter(|w| w.chars().count() >= 2 && w.chars().any(char::is_alphanumeric))
        .map(|w| format!("\"{}\"*", w.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

impl Catalog {
    /// Ranked issues whose titles match every word of `query`.
    pub async fn search_issues(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>> {
        if limit < 1 {
            return Err(Error::InvalidInput("limit must be >= 1".to_string()));
        }
        let expr = match_expression(query).ok_or_else(|| {
            Error::InvalidInput("query needs at least one word of two or more characters".to_string())
        })?;

        let rows = sqlx::query(
            r#"
            SELECT i.id, i.title, i.issue_number, i.detail_url, i.series_id,
                   s.name AS series_name, i.on_sale_date, i.unlimited_date, i.year_page,
                   issues_fts.rank AS rank
            FROM issues_fts
            JOIN issues i ON i.id = issues_fts.rowid
            LEFT JOIN series s ON s.id = i.series_id
            WHERE issues_fts MATCH ?
            ORDER BY issues_fts.rank ASC, i.id ASC
            LIMIT ?
            "#,
        )
        .bind(expr)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                SearchHit {
                    issue: issue_summary(row),
                    score: -rank,
                }
            })
            .collect())
    }
}

/// CLI entry point for `marvel search`.
pub async fn run_search(db_path: &Path, query: &str, limit: i64) -> anyhow::Result<()> {
    if match_expression(query).is_none() {
        println!("No results.");
        return Ok(());
    }

    let pool = db::connect_read_only(db_path, 1).await?;
    let catalog = Catalog::new(pool.clone());
    let hits = catalog.search_issues(query, limit).await;
    pool.close().await;
    let hits = hits?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.issue.title);
        if let Some(ref series) = hit.issue.series_name {
            println!("    series: {}", series);
        }
        if let Some(ref date) = hit.issue.on_sale_date {
            println!("    on sale: {}", date);
        }
        println!("    url: {}", hit.issue.detail_url);
        println!("    id: {}", hit.issue.id);
        println!();
    }
    Ok(())
}
