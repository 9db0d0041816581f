use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serve::StoreError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("SQL error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Storage problems are fatal to the request; there is nothing to retry
/// against a local file. Bad query-string input never reaches this point,
/// it is normalized to defaults at parse time.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::error!("request failed: {self}");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
