//! Error types shared by the build pipeline and the query layer.
//!
//! The CLI and server bootstrap work in `anyhow`; everything underneath
//! returns [`Error`] so callers can tell a missing row from a broken
//! database.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A raw payload or intermediate line is missing a required field or
    /// carries one with the wrong shape.
    #[error("malformed record{}: field `{field}` {reason}", location(.line, .source_id))]
    MalformedRecord {
        line: Option<usize>,
        source_id: Option<i64>,
        field: &'static str,
        reason: String,
    },

    /// A write was rejected by a storage-level constraint.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            line: None,
            source_id: None,
            field,
            reason: reason.into(),
        }
    }

    /// Attaches the intermediate-file line number to a `MalformedRecord`.
    pub fn at_line(self, n: usize) -> Self {
        match self {
            Error::MalformedRecord {
                source_id,
                field,
                reason,
                ..
            } => Error::MalformedRecord {
                line: Some(n),
                source_id,
                field,
                reason,
            },
            other => other,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            use sqlx::error::ErrorKind;
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return Error::ConstraintViolation(db_err.message().to_string());
                }
                _ => {}
            }
        }
        Error::Database(err)
    }
}

fn location(line: &Option<usize>, source_id: &Option<i64>) -> String {
    let mut out = String::new();
    if let Some(id) = source_id {
        out.push_str(&format!(" (issue {})", id));
    }
    if let Some(line) = line {
        out.push_str(&format!(" at line {}", line));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message_names_field_and_source() {
        let err = Error::MalformedRecord {
            line: Some(7),
            source_id: Some(42),
            field: "title",
            reason: "is missing".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("issue 42"));
        assert!(msg.contains("line 7"));
        assert!(msg.contains("`title`"));
    }

    #[test]
    fn test_at_line_only_touches_malformed() {
        let err = Error::malformed("id", "is missing").at_line(3);
        assert!(matches!(err, Error::MalformedRecord { line: Some(3), .. }));

        let err = Error::InvalidInput("x".into()).at_line(3);
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_not_found_message() {
        let err = Error::NotFound {
            entity: "series",
            id: 100,
        };
        assert_eq!(err.to_string(), "series not found: 100");
    }
}
