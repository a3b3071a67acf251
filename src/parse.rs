//! Record parser: raw issue payloads to normalized [`IssueRecord`]s.
//!
//! Only `id`, `title` and `detailUrl` are required. Every other field is
//! optional and falls back to an empty or null value when missing or
//! malformed, so a sparse upstream record still produces a row.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::decode;
use crate::error::{Error, Result};
use crate::models::{CreatorCredit, IssueRecord};
use crate::records::{self, RecordWriter};

/// Normalizes one raw (already decoded) issue object.
///
/// `year_page`, when given, overrides any `_year_page` already present.
pub fn parse_issue(raw: &Value, year_page: Option<i64>) -> Result<IssueRecord> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::malformed("id", "record is not a JSON object"))?;

    let id = match obj.get("id") {
        Some(v) => as_int(v).ok_or_else(|| Error::malformed("id", "is not an integer"))?,
        None => return Err(Error::malformed("id", "is missing")),
    };
    let fail = |field: &'static str, reason: &str| Error::MalformedRecord {
        line: None,
        source_id: Some(id),
        field,
        reason: reason.to_string(),
    };

    let title = match obj.get("title") {
        Some(Value::String(s)) => normalize_title_spacing(s),
        Some(_) => return Err(fail("title", "is not a string")),
        None => return Err(fail("title", "is missing")),
    };
    if title.is_empty() {
        return Err(fail("title", "is empty"));
    }

    let detail_url = match obj.get("detailUrl") {
        Some(Value::String(s)) if !s.trim().is_empty() => normalize_marvel_url(s.trim()),
        Some(Value::String(_)) => return Err(fail("detailUrl", "is empty")),
        Some(_) => return Err(fail("detailUrl", "is not a string")),
        None => return Err(fail("detailUrl", "is missing")),
    };

    let series = obj.get("series").and_then(Value::as_object);
    let dates = obj.get("dates").and_then(Value::as_object);
    let cover = obj.get("cover").and_then(Value::as_object);

    let cover_path = cover.and_then(|c| non_empty_str(c.get("path")));
    let record = IssueRecord {
        id,
        digital_id: obj.get("digitalId").and_then(as_int).filter(|n| *n > 0),
        title,
        issue_number: obj
            .get("issue")
            .and_then(scalar_to_string)
            .unwrap_or_default(),
        description: non_empty_str(obj.get("description")),
        modified: non_empty_str(obj.get("modified")),
        page_count: obj.get("pageCount").and_then(as_int).filter(|n| *n >= 0),
        detail_url,
        series_id: series.and_then(|s| s.get("id")).and_then(as_int),
        series_name: series.and_then(|s| non_empty_str(s.get("name"))),
        on_sale_date: dates.and_then(|d| iso_date(d.get("onSale"))),
        unlimited_date: dates.and_then(|d| iso_date(d.get("unlimited"))),
        year_page: year_page.or_else(|| obj.get("_year_page").and_then(as_int)),
        cover_extension: cover
            .filter(|_| cover_path.is_some())
            .and_then(|c| non_empty_str(c.get("ext"))),
        cover_path,
        creators: parse_creators(id, obj),
    };

    Ok(record)
}

fn parse_creators(issue_id: i64, obj: &Map<String, Value>) -> Vec<CreatorCredit> {
    let Some(list) = obj.get("creators").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut credits = Vec::with_capacity(list.len());
    for entry in list {
        let creator_id = entry.get("id").and_then(as_int);
        let creator_name = non_empty_str(entry.get("name"));
        let (Some(creator_id), Some(creator_name)) = (creator_id, creator_name) else {
            debug!(issue_id, "dropping creator entry without id or name");
            continue;
        };
        let role = entry.get("role").map(role_name).unwrap_or_default();
        if role.is_empty() {
            debug!(issue_id, creator_id, "dropping creator entry without role");
            continue;
        }
        if seen.insert((creator_id, role.clone())) {
            credits.push(CreatorCredit {
                creator_id,
                creator_name,
                role,
            });
        }
    }
    credits
}

/// Maps integer role codes to names; string roles are kept as given.
pub fn role_name(role: &Value) -> String {
    match role {
        Value::String(s) => s.trim().to_lowercase(),
        other => match as_int(other) {
            Some(1) => "penciler".to_string(),
            Some(2) => "cover artist".to_string(),
            Some(3) => "writer".to_string(),
            Some(4) => "letterer".to_string(),
            Some(5) => "colorist".to_string(),
            Some(6) => "editor".to_string(),
            Some(7) => "inker".to_string(),
            Some(8) => "penciler (cover)".to_string(),
            Some(n) => format!("unknown ({})", n),
            None => String::new(),
        },
    }
}

/// Canonical form: https, www.marvel.com.
pub fn normalize_marvel_url(url: &str) -> String {
    url.replace("http://", "https://")
        .replace("https://marvel.com/", "https://www.marvel.com/")
}

/// Collapses whitespace runs and puts a space between `)` and `#`.
pub fn normalize_title_spacing(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(")#", ") #")
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Keeps the leading `YYYY-MM-DD` of an ISO timestamp when it is a real date.
fn iso_date(v: Option<&Value>) -> Option<String> {
    let s = v.and_then(Value::as_str)?.trim();
    let prefix = s.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// CLI entry point for `marvel parse`.
///
/// Decodes one saved year-page payload and writes its issues to the
/// intermediate store.
pub fn run_parse(input: &Path, output: &Path, year: Option<i64>, append: bool) -> anyhow::Result<()> {
    use anyhow::Context;

    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read payload: {}", input.display()))?;
    let payload: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", input.display()))?;

    let decoded = decode::decode_issues(&payload)?;
    info!(input = %input.display(), decoded = decoded.len(), "decoded payload");

    let mut writer = if append {
        RecordWriter::append(output)?
    } else {
        RecordWriter::create(output)?
    };
    for raw in &decoded {
        let record = parse_issue(raw, year)?;
        writer.write(&record)?;
    }
    let written = writer.finish()?;
    let total = records::count_records(output)?;

    println!("parse {}", input.display());
    println!("  issues decoded: {}", decoded.len());
    println!("  records written: {}", written);
    println!("  records in file: {}", total);
    println!("  output: {}", output.display());
    println!("ok");
    Ok(())
}
