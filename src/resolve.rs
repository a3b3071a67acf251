//! Identity resolution for series and creators.
//!
//! Entities are keyed only by their source-provided id. The first time an
//! id is met in a build its row is upserted; every later sighting in the
//! same build is a no-op, so a creator credited on hundreds of issues is
//! written once and keeps the name from its first record. Names that
//! differ between ids are never merged.

use std::collections::{HashMap, HashSet};
use sqlx::SqliteConnection;
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Default)]
pub struct IdentityResolver {
    series: HashSet<i64>,
    creators: HashSet<i64>,
    /// issue id -> series id for links whose series had no name at the
    /// time the issue was written.
    pending_series: HashMap<i64, i64>,
}

/// Outcome of [`IdentityResolver::finish`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkReport {
    pub linked: u64,
    pub unresolved: u64,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a named series row exists. Returns whether a write happened.
    pub async fn resolve_series(
        &mut self,
        conn: &mut SqliteConnection,
        id: i64,
        name: &str,
    ) -> Result<bool> {
        if self.series.contains(&id) {
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO series (id, name) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(id)
        .bind(name)
        .execute(&mut *conn)
        .await?;
        self.series.insert(id);
        Ok(true)
    }

    /// Ensures a creator row exists. Returns whether a write happened.
    pub async fn resolve_creator(
        &mut self,
        conn: &mut SqliteConnection,
        id: i64,
        name: &str,
    ) -> Result<bool> {
        if self.creators.contains(&id) {
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO creators (id, name) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(id)
        .bind(name)
        .execute(&mut *conn)
        .await?;
        self.creators.insert(id);
        Ok(true)
    }

    /// Decides the series link to store with an issue right now.
    ///
    /// A series already written in this build links immediately. Anything
    /// else is stored as null and remembered; [`finish`](Self::finish)
    /// links it once every record has been seen, so the outcome does not
    /// depend on record order.
    pub fn series_link(&mut self, issue_id: i64, series_id: Option<i64>) -> Option<i64> {
        let series_id = series_id?;
        if self.series.contains(&series_id) {
            self.pending_series.remove(&issue_id);
            Some(series_id)
        } else {
            self.pending_series.insert(issue_id, series_id);
            None
        }
    }

    /// Links pending issues whose series now exists, from this build or an
    /// earlier one. The rest stay null.
    pub async fn finish(&mut self, conn: &mut SqliteConnection) -> Result<LinkReport> {
        let mut report = LinkReport::default();
        let mut pending: Vec<(i64, i64)> = self.pending_series.drain().collect();
        pending.sort_unstable();

        for (issue_id, series_id) in pending {
            let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM series WHERE id = ?")
                .bind(series_id)
                .fetch_one(&mut *conn)
                .await?;
            if exists {
                sqlx::query("UPDATE issues SET series_id = ? WHERE id = ?")
                    .bind(series_id)
                    .bind(issue_id)
                    .execute(&mut *conn)
                    .await?;
                report.linked += 1;
            } else {
                warn!(issue_id, series_id, "series reference has no name and no existing row; leaving unresolved");
                report.unresolved += 1;
            }
        }
        Ok(report)
    }
}
