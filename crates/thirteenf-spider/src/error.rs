//! Error types for the 13F spider.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("postgres error: {}", postgres_message(.0))]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed xml: {0}")]
    MalformedXml(String),

    #[error("malformed index line {line_no}: {line:?}")]
    MalformedIndexLine { line_no: usize, line: String },

    #[error("no submission block found in {0}")]
    MissingSubmission(PathBuf),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid date in {field}: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("invalid number in row {row}, {field}: {value:?}")]
    InvalidNumber {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("invalid CIK: {0:?}")]
    InvalidCik(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same idempotent request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
            }
            Error::Status { status, .. } => crate::client::is_retryable(*status),
            _ => false,
        }
    }
}

/// The server's own message (with detail and constraint) when there is one; `tokio-postgres`
/// alone only says "db error".
fn postgres_message(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => {
            let mut msg = format!("{}: {}", db.severity(), db.message());
            if let Some(detail) = db.detail() {
                msg.push_str(&format!(", detail({detail})"));
            }
            if let Some(constraint) = db.constraint() {
                msg.push_str(&format!(", constraint({constraint})"));
            }
            msg
        }
        None => err.to_string(),
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
