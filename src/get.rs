//! Issue retrieval by id for the `marvel get` command.
//!
//! The HTTP layer serves the same data through [`Catalog::get_issue`];
//! this module only renders it for a terminal.

use anyhow::Result;
use std::path::Path;

use crate::catalog::Catalog;
use crate::db;
use crate::models::IssueDetail;

async fn fetch_issue(db_path: &Path, id: i64) -> Result<IssueDetail> {
    let pool = db::connect_read_only(db_path, 1).await?;
    let issue = Catalog::new(pool.clone()).get_issue(id).await;
    pool.close().await;
    Ok(issue?)
}

/// CLI entry point: prints the issue or exits 1 when it cannot be found.
pub async fn run_get(db_path: &Path, id: i64) -> Result<()> {
    let issue = match fetch_issue(db_path, id).await {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("--- Issue ---");
    println!("id:           {}", issue.id);
    println!("title:        {}", issue.title);
    if !issue.issue_number.is_empty() {
        println!("number:       {}", issue.issue_number);
    }
    if let Some(ref series) = issue.series {
        println!("series:       {} ({})", series.name, series.id);
    }
    if let Some(ref date) = issue.on_sale_date {
        println!("on_sale:      {}", date);
    }
    if let Some(ref date) = issue.unlimited_date {
        println!("unlimited:    {}", date);
    }
    if let Some(pages) = issue.page_count {
        println!("pages:        {}", pages);
    }
    println!("url:          {}", issue.detail_url);
    if let Some(ref cover) = issue.cover {
        match cover.extension {
            Some(ref ext) => println!("cover:        {}.{}", cover.path, ext),
            None => println!("cover:        {}", cover.path),
        }
    }
    println!();

    if let Some(ref description) = issue.description {
        println!("--- Description ---");
        println!("{}", description);
        println!();
    }

    println!("--- Creators ({}) ---", issue.creators.len());
    for credit in &issue.creators {
        println!("{:<14} {} ({})", credit.role, credit.name, credit.id);
    }

    Ok(())
}
