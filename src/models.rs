//! Core data models.
//!
//! [`IssueRecord`] is the flattened, self-contained shape written to the
//! intermediate JSONL store and read back by the loader. The remaining
//! types are the read models returned by the query layer.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One normalized issue, one line of the intermediate store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: i64,
    #[serde(default)]
    pub digital_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub issue_number: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub page_count: Option<i64>,
    pub detail_url: String,
    #[serde(default)]
    pub series_id: Option<i64>,
    #[serde(default)]
    pub series_name: Option<String>,
    #[serde(default)]
    pub on_sale_date: Option<String>,
    #[serde(default)]
    pub unlimited_date: Option<String>,
    #[serde(default)]
    pub year_page: Option<i64>,
    #[serde(default)]
    pub cover_path: Option<String>,
    #[serde(default)]
    pub cover_extension: Option<String>,
    #[serde(default)]
    pub creators: Vec<CreatorCredit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorCredit {
    pub creator_id: i64,
    pub creator_name: String,
    pub role: String,
}

impl IssueRecord {
    /// Re-checks the invariants the loader relies on. Lines in the
    /// intermediate store may have been edited by hand.
    pub fn validate(&self) -> Result<()> {
        let fail = |field: &'static str, reason: &str| Error::MalformedRecord {
            line: None,
            source_id: Some(self.id),
            field,
            reason: reason.to_string(),
        };

        if self.title.trim().is_empty() {
            return Err(fail("title", "must not be empty"));
        }
        if self.detail_url.trim().is_empty() {
            return Err(fail("detail_url", "must not be empty"));
        }
        if matches!(self.page_count, Some(n) if n < 0) {
            return Err(fail("page_count", "must not be negative"));
        }
        if self.cover_path.as_deref().is_some_and(|p| p.is_empty()) {
            return Err(fail("cover_path", "must not be empty when present"));
        }
        for credit in &self.creators {
            if credit.creator_name.trim().is_empty() {
                return Err(fail("creators", "contains a credit without a name"));
            }
            if credit.role.trim().is_empty() {
                return Err(fail("creators", "contains a credit without a role"));
            }
        }
        Ok(())
    }
}

/// Offset/limit window supplied by the caller of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Result<Self> {
        if limit < 1 {
            return Err(Error::InvalidInput("limit must be >= 1".to_string()));
        }
        if offset < 0 {
            return Err(Error::InvalidInput("offset must be >= 0".to_string()));
        }
        Ok(Self { limit, offset })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueFilter {
    pub year: Option<i64>,
    pub series_id: Option<i64>,
    /// `Some(true)` keeps issues with a digital-availability date.
    pub available: Option<bool>,
}

/// Compact issue row used by every listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    pub id: i64,
    pub title: String,
    pub issue_number: String,
    pub detail_url: String,
    pub series_id: Option<i64>,
    pub series_name: Option<String>,
    pub on_sale_date: Option<String>,
    pub unlimited_date: Option<String>,
    pub year_page: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cover {
    pub path: String,
    pub extension: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Credit {
    pub id: i64,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDetail {
    pub id: i64,
    pub digital_id: Option<i64>,
    pub title: String,
    pub issue_number: String,
    pub description: Option<String>,
    pub modified: Option<String>,
    pub page_count: Option<i64>,
    pub detail_url: String,
    pub on_sale_date: Option<String>,
    pub unlimited_date: Option<String>,
    pub year_page: Option<i64>,
    pub series: Option<SeriesRef>,
    pub cover: Option<Cover>,
    pub creators: Vec<Credit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesListItem {
    pub id: i64,
    pub name: String,
    pub issue_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
    pub id: i64,
    pub name: String,
    pub issue_count: i64,
    pub first_issue_date: Option<String>,
    pub last_issue_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorListItem {
    pub id: i64,
    pub name: String,
    pub issue_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCount {
    pub role: String,
    pub issue_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorDetail {
    pub id: i64,
    pub name: String,
    pub roles: Vec<RoleCount>,
    /// Distinct issues across all roles.
    pub total_issues: i64,
}

/// An issue credited to one creator, with every role they held on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatorIssue {
    #[serde(flatten)]
    pub issue: IssueSummary,
    pub roles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> IssueRecord {
        IssueRecord {
            id: 1,
            digital_id: None,
            title: "Avengers (2012) #1".to_string(),
            issue_number: "1".to_string(),
            description: None,
            modified: None,
            page_count: Some(32),
            detail_url: "https://www.marvel.com/comics/issue/1".to_string(),
            series_id: Some(100),
            series_name: Some("Avengers (2012 - 2015)".to_string()),
            on_sale_date: Some("2012-12-05".to_string()),
            unlimited_date: None,
            year_page: Some(2012),
            cover_path: None,
            cover_extension: None,
            creators: vec![CreatorCredit {
                creator_id: 200,
                creator_name: "Jonathan Hickman".to_string(),
                role: "writer".to_string(),
            }],
        }
    }

    #[test]
    fn test_minimal_line_defaults_optional_fields() {
        let rec: IssueRecord =
            serde_json::from_str(r#"{"id": 5, "title": "X #1", "detail_url": "u"}"#).unwrap();
        assert_eq!(rec.issue_number, "");
        assert!(rec.creators.is_empty());
        assert!(rec.series_id.is_none());
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        let mut rec = record();
        rec.title = "  ".to_string();
        let err = rec.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedRecord {
                source_id: Some(1),
                field: "title",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_negative_page_count() {
        let mut rec = record();
        rec.page_count = Some(-1);
        assert!(rec.validate().is_err());
    }

    #[test]
    fn test_line_preserves_every_field() {
        let rec = record();
        let line = serde_json::to_string(&rec).unwrap();
        assert!(!line.contains('\n'));
        let back: IssueRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_page_rejects_bad_window() {
        assert!(Page::new(0, 0).is_err());
        assert!(Page::new(10, -1).is_err());
        assert_eq!(Page::new(10, 20).unwrap().offset, 20);
    }
}
