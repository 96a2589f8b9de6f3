use std::path::PathBuf;

use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Malformed record in {source_name} (line {line}): {detail}")]
    MalformedRecord {
        source_name: String,
        line: u64,
        detail: String,
    },

    #[error("Duplicate opportunity {opp_id} in {source_name}")]
    DuplicateOpportunity { source_name: String, opp_id: i64 },

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn malformed(source_name: &str, line: u64, detail: impl Into<String>) -> Self {
        AppError::MalformedRecord {
            source_name: source_name.to_string(),
            line,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
