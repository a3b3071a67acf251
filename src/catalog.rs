//! Read-only query layer over a built database.
//!
//! [`Catalog`] owns the connection pool handed to it at startup; every
//! operation borrows a connection for the duration of one query and is
//! free of side effects. Lookups by id return [`Error::NotFound`] when the
//! id does not exist, which is distinct from an existing entity with an
//! empty result list.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{
    CreatorDetail, CreatorIssue, CreatorListItem, Cover, Credit, IssueDetail, IssueFilter,
    IssueSummary, Page, RoleCount, SeriesListItem, SeriesRef, SeriesSummary,
};

const SUMMARY_COLUMNS: &str = r#"
    i.id, i.title, i.issue_number, i.detail_url, i.series_id, s.name AS series_name,
    i.on_sale_date, i.unlimited_date, i.year_page
"#;

#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

/// Result of [`Catalog::health`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub database: &'static str,
    pub schema_version: i64,
    pub issue_count: i64,
}

impl Health {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Full issue: series summary, cover and every creator credit.
    pub async fn get_issue(&self, id: i64) -> Result<IssueDetail> {
        let row = sqlx::query(
            r#"
            SELECT i.id, i.digital_id, i.title, i.issue_number, i.description, i.modified,
                   i.page_count, i.detail_url, i.series_id, s.name AS series_name,
                   i.on_sale_date, i.unlimited_date, i.year_page,
                   c.path AS cover_path, c.extension AS cover_extension
            FROM issues i
            LEFT JOIN series s ON s.id = i.series_id
            LEFT JOIN covers c ON c.issue_id = i.id
            WHERE i.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::NotFound { entity: "issue", id })?;

        let creators = sqlx::query(
            r#"
            SELECT c.id, c.name, ic.role
            FROM issue_creators ic
            JOIN creators c ON c.id = ic.creator_id
            WHERE ic.issue_id = ?
            ORDER BY ic.role, c.name, c.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| Credit {
            id: r.get("id"),
            name: r.get("name"),
            role: r.get("role"),
        })
        .collect();

        let series = match (
            row.get::<Option<i64>, _>("series_id"),
            row.get::<Option<String>, _>("series_name"),
        ) {
            (Some(id), Some(name)) => Some(SeriesRef { id, name }),
            _ => None,
        };
        let cover = row
            .get::<Option<String>, _>("cover_path")
            .map(|path| Cover {
                path,
                extension: row.get("cover_extension"),
            });

        Ok(IssueDetail {
            id: row.get("id"),
            digital_id: row.get("digital_id"),
            title: row.get("title"),
            issue_number: row.get("issue_number"),
            description: row.get("description"),
            modified: row.get("modified"),
            page_count: row.get("page_count"),
            detail_url: row.get("detail_url"),
            on_sale_date: row.get("on_sale_date"),
            unlimited_date: row.get("unlimited_date"),
            year_page: row.get("year_page"),
            series,
            cover,
            creators,
        })
    }

    /// One page of issues in id order.
    pub async fn list_issues(&self, filter: &IssueFilter, page: Page) -> Result<Vec<IssueSummary>> {
        let sql = format!(
            r#"
            SELECT {SUMMARY_COLUMNS}
            FROM issues i
            LEFT JOIN series s ON s.id = i.series_id
            WHERE (? IS NULL OR i.year_page = ?)
              AND (? IS NULL OR i.series_id = ?)
              AND (? IS NULL OR (i.unlimited_date IS NOT NULL) = ?)
            ORDER BY i.id ASC
            LIMIT ? OFFSET ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.year)
            .bind(filter.year)
            .bind(filter.series_id)
            .bind(filter.series_id)
            .bind(filter.available)
            .bind(filter.available)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(issue_summary).collect())
    }

    /// One page of series with their issue counts, ordered by name.
    pub async fn list_series(&self, page: Page) -> Result<Vec<SeriesListItem>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.name, COUNT(i.id) AS issue_count
            FROM series s
            LEFT JOIN issues i ON i.series_id = s.id
            GROUP BY s.id
            ORDER BY s.name ASC, s.id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| SeriesListItem {
                id: r.get("id"),
                name: r.get("name"),
                issue_count: r.get("issue_count"),
            })
            .collect())
    }

    pub async fn get_series(&self, id: i64) -> Result<SeriesSummary> {
        let row = sqlx::query(
            r#"
            SELECT s.id, s.name, COUNT(i.id) AS issue_count,
                   MIN(i.on_sale_date) AS first_issue_date,
                   MAX(i.on_sale_date) AS last_issue_date
            FROM series s
            LEFT JOIN issues i ON i.series_id = s.id
            WHERE s.id = ?
            GROUP BY s.id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::NotFound { entity: "series", id })?;

        Ok(SeriesSummary {
            id: row.get("id"),
            name: row.get("name"),
            issue_count: row.get("issue_count"),
            first_issue_date: row.get("first_issue_date"),
            last_issue_date: row.get("last_issue_date"),
        })
    }

    /// Every issue in a series, in on-sale order (undated last).
    pub async fn get_series_issues(&self, series_id: i64) -> Result<Vec<IssueSummary>> {
        self.ensure_exists("series", "series", series_id).await?;

        let sql = format!(
            r#"
            SELECT {SUMMARY_COLUMNS}
            FROM issues i
            LEFT JOIN series s ON s.id = i.series_id
            WHERE i.series_id = ?
            ORDER BY i.on_sale_date IS NULL, i.on_sale_date ASC, i.id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(series_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(issue_summary).collect())
    }

    /// One page of creators, optionally only those credited with `role`.
    ///
    /// With a role filter, `issue_count` counts issues in that role.
    pub async fn list_creators(&self, role: Option<&str>, page: Page) -> Result<Vec<CreatorListItem>> {
        let rows = match role.map(|r| r.trim().to_lowercase()) {
            Some(role) => {
                sqlx::query(
                    r#"
                    SELECT c.id, c.name, COUNT(DISTINCT ic.issue_id) AS issue_count
                    FROM creators c
                    JOIN issue_creators ic ON ic.creator_id = c.id
                    WHERE ic.role = ?
                    GROUP BY c.id
                    ORDER BY c.name ASC, c.id ASC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(role)
                .bind(page.limit)
                .bind(page.offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT c.id, c.name, COUNT(DISTINCT ic.issue_id) AS issue_count
                    FROM creators c
                    LEFT JOIN issue_creators ic ON ic.creator_id = c.id
                    GROUP BY c.id
                    ORDER BY c.name ASC, c.id ASC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(page.limit)
                .bind(page.offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|r| CreatorListItem {
                id: r.get("id"),
                name: r.get("name"),
                issue_count: r.get("issue_count"),
            })
            .collect())
    }

    /// Creator with a per-role breakdown of issue counts.
    pub async fn get_creator(&self, id: i64) -> Result<CreatorDetail> {
        let row = sqlx::query("SELECT id, name FROM creators WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound { entity: "creator", id })?;

        let roles = sqlx::query(
            r#"
            SELECT role, COUNT(DISTINCT issue_id) AS issue_count
            FROM issue_creators
            WHERE creator_id = ?
            GROUP BY role
            ORDER BY issue_count DESC, role ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| RoleCount {
            role: r.get("role"),
            issue_count: r.get("issue_count"),
        })
        .collect();

        let total_issues: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT issue_id) FROM issue_creators WHERE creator_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(CreatorDetail {
            id: row.get("id"),
            name: row.get("name"),
            roles,
            total_issues,
        })
    }

    /// Every issue the creator is credited on, once each with all roles held,
    /// in on-sale order (undated last) then id.
    pub async fn get_creator_issues(&self, creator_id: i64) -> Result<Vec<CreatorIssue>> {
        self.ensure_exists("creator", "creators", creator_id).await?;

        let sql = format!(
            r#"
            SELECT {SUMMARY_COLUMNS}, ic.role
            FROM issue_creators ic
            JOIN issues i ON i.id = ic.issue_id
            LEFT JOIN series s ON s.id = i.series_id
            WHERE ic.creator_id = ?
            ORDER BY i.on_sale_date IS NULL, i.on_sale_date ASC, i.id ASC, ic.role ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(creator_id)
            .fetch_all(&self.pool)
            .await?;

        let mut out: Vec<CreatorIssue> = Vec::new();
        for row in &rows {
            let role: String = row.get("role");
            let id: i64 = row.get("id");
            match out.last_mut() {
                Some(last) if last.issue.id == id => last.roles.push(role),
                _ => out.push(CreatorIssue {
                    issue: issue_summary(row),
                    roles: vec![role],
                }),
            }
        }
        Ok(out)
    }

    /// Database reachability for the external health check.
    pub async fn health(&self) -> Health {
        let probe = async {
            let mut conn = self.pool.acquire().await?;
            let version = migrate::current_version(&mut conn).await?;
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issues")
                .fetch_one(&mut *conn)
                .await?;
            Ok::<_, Error>((version, count))
        };

        match probe.await {
            Ok((schema_version, issue_count)) => Health {
                status: "ok",
                database: "ok",
                schema_version,
                issue_count,
            },
            Err(e) => {
                tracing::warn!(error = %e, "health probe failed");
                Health {
                    status: "degraded",
                    database: "error",
                    schema_version: 0,
                    issue_count: 0,
                }
            }
        }
    }

    async fn ensure_exists(&self, entity: &'static str, table: &str, id: i64) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar(&format!("SELECT COUNT(*) > 0 FROM {} WHERE id = ?", table))
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(())
        } else {
            Err(Error::NotFound { entity, id })
        }
    }
}

pub(crate) fn issue_summary(r: &SqliteRow) -> IssueSummary {
    IssueSummary {
        id: r.get("id"),
        title: r.get("title"),
        issue_number: r.get("issue_number"),
        detail_url: r.get("detail_url"),
        series_id: r.get("series_id"),
        series_name: r.get("series_name"),
        on_sale_date: r.get("on_sale_date"),
        unlimited_date: r.get("unlimited_date"),
        year_page: r.get("year_page"),
    }
}
