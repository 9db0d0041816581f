//! Offline CSV → SQLite import job.
//!
//! Reads a spreadsheet export, normalizes the headers into SQL-friendly
//! column names, and rebuilds the `tox_data` table wholesale inside one
//! transaction. The API process only ever sees the old table or the new
//! one, never a half-written state.

use crate::error::Error;
use regex::Regex;
use sea_query::{Alias, ColumnDef, SqliteQueryBuilder, Table};
use serve::TABLE;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    ConnectOptions, SqliteConnection,
};
use std::{path::Path, sync::LazyLock, time::Duration};
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, Error>;

/// The LC50 column gets REAL affinity; everything else stays TEXT.
const LC50_COLUMN: &str = "lc50_mm";

#[derive(Debug)]
pub struct ImportReport {
    pub rows: usize,
    pub columns: Vec<String>,
}

static HEADER_JUNK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Make a spreadsheet header SQL friendly: trim, lowercase, collapse runs
/// of anything non-alphanumeric into `_`, strip leading/trailing `_`.
/// `"LC50 (mM)"` becomes `lc50_mm`.
pub fn normalize_header(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    HEADER_JUNK
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

#[tracing::instrument(skip_all)]
pub async fn run(input: &Path, db: &Path) -> Result<ImportReport> {
    // Spreadsheet exports are frequently ragged; short rows read as NULLs.
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(input)?;
    let columns: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    validate_columns(&columns)?;
    let lc50_idx = columns.iter().position(|c| c == LC50_COLUMN);

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<Option<String>> = (0..columns.len())
            .map(|i| {
                record
                    .get(i)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
            .collect();
        // Completely empty rows are spreadsheet noise.
        if cells.iter().all(Option::is_none) {
            continue;
        }
        rows.push(cells);
    }

    let mut conn = SqliteConnectOptions::new()
        .filename(db)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .connect()
        .await?;

    // One write transaction for drop + create + inserts.
    sqlx::query("BEGIN IMMEDIATE").execute(&mut conn).await?;
    match replace_table(&mut conn, &columns, lc50_idx, &rows).await {
        Ok(()) => {
            sqlx::query("COMMIT").execute(&mut conn).await?;
        }
        Err(e) => {
            // Best-effort rollback; surface the original error.
            let _ = sqlx::query("ROLLBACK").execute(&mut conn).await;
            return Err(e);
        }
    }

    debug!("imported columns: {:?}", columns);
    info!("import complete: {} rows", rows.len());
    Ok(ImportReport {
        rows: rows.len(),
        columns,
    })
}

fn validate_columns(columns: &[String]) -> Result<()> {
    for (i, name) in columns.iter().enumerate() {
        if name.is_empty() {
            return Err(Error::Import(format!(
                "header {} normalizes to an empty column name",
                i + 1
            )));
        }
        if columns[..i].contains(name) {
            return Err(Error::Import(format!("duplicate column name: {name}")));
        }
    }
    Ok(())
}

async fn replace_table(
    conn: &mut SqliteConnection,
    columns: &[String],
    lc50_idx: Option<usize>,
    rows: &[Vec<Option<String>>],
) -> Result<()> {
    let drop_sql = Table::drop()
        .table(Alias::new(TABLE))
        .if_exists()
        .to_string(SqliteQueryBuilder);
    sqlx::query(&drop_sql).execute(&mut *conn).await?;

    let create_sql = build_create_table_sql(columns, lc50_idx);
    sqlx::query(&create_sql).execute(&mut *conn).await?;

    if rows.is_empty() {
        return Ok(());
    }

    let insert_sql = build_insert_sql(columns);
    for row in rows {
        let mut q = sqlx::query(&insert_sql);
        for (i, cell) in row.iter().enumerate() {
            if Some(i) == lc50_idx {
                // Non-numeric measurements become NULL, never an error.
                q = q.bind(cell.as_deref().and_then(|v| v.parse::<f64>().ok()));
            } else {
                q = q.bind(cell.clone());
            }
        }
        q.execute(&mut *conn).await?;
    }
    Ok(())
}

fn build_create_table_sql(columns: &[String], lc50_idx: Option<usize>) -> String {
    let mut stmt = Table::create();
    stmt.table(Alias::new(TABLE));
    for (i, name) in columns.iter().enumerate() {
        let mut col = ColumnDef::new(Alias::new(name));
        if Some(i) == lc50_idx {
            col.double();
        } else {
            col.text();
        }
        stmt.col(col);
    }
    stmt.to_string(SqliteQueryBuilder)
}

fn build_insert_sql(columns: &[String]) -> String {
    // Column names passed validate_columns() and contain only [a-z0-9_],
    // but can still collide with SQL keywords or start with a digit, so
    // quote them the same way the sea-query DDL does. Cell values are
    // always bound, never interpolated.
    let idents = columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!("INSERT INTO {TABLE} ({idents}) VALUES ({placeholders})")
}
