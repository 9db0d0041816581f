//! Read-only access to the imported toxicology table.
//!
//! The API never writes: [`ToxStore`] wraps a small read-only `SqlitePool`
//! and is constructed once at startup, then injected into request handlers.
//! The import job (in the edge crate) owns the writable side.

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::{path::Path, time::Duration};
use thiserror::Error;

/// The one table the import job produces.
pub const TABLE: &str = "tox_data";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Handle on the toxicology data store. Cheap to clone; all clones share
/// one pool.
#[derive(Debug, Clone)]
pub struct ToxStore {
    pool: SqlitePool,
}

impl ToxStore {
    /// Open the SQLite file read-only.
    ///
    /// Fails if the file does not exist; the import job must have run
    /// first. A missing or half-configured database is a setup problem,
    /// not something to retry.
    #[tracing::instrument(skip_all)]
    pub async fn open(path: &Path) -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(0)
            .max_connections(3) // SQLite likes small pools
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(opts)
            .await
            .map_err(StoreError::Connect)?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Bind values for dynamically assembled read queries. User input only ever
/// travels through these, never through query text.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(String),
    Integer(i64),
    Real(f64),
}
