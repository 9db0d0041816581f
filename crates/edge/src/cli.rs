use crate::error::Error;
use crate::http::build_app;
use crate::import;
use chrono::Utc;
use clap::{builder::ValueHint, Parser, Subcommand};
use domain::setting::Settings;
use serve::ToxStore;
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{error, info};

pub type Result<T> = std::result::Result<T, Error>;

/// toxserve CLI — serve the toxicology API or run the offline import.
#[tokio::main(flavor = "multi_thread")]
#[tracing::instrument(skip_all)]
pub async fn start() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(cmd) => do_serve(cmd).await,
        Commands::Import(cmd) => do_import(cmd).await,
    };

    result.map_or_else(
        |e| {
            error!("toxserve failed: {}", e);
            ExitCode::FAILURE
        },
        |_| ExitCode::SUCCESS,
    )
}

#[tracing::instrument(skip_all)]
async fn do_serve(cmd: ServeCmd) -> Result<()> {
    let then = Utc::now();
    let settings = load_settings(&cmd.dir)?;
    info!(
        "Settings parsed in {} milliseconds",
        Utc::now().timestamp_millis() - then.timestamp_millis()
    );

    let db_path = cmd.dir.join(&settings.database.path);
    let then = Utc::now();
    let store = ToxStore::open(&db_path).await?;
    info!(
        "Store opened ({}) in {} milliseconds",
        db_path.display(),
        Utc::now().timestamp_millis() - then.timestamp_millis()
    );

    let app = build_app(store);
    let listener = tokio::net::TcpListener::bind(settings.server.bind).await?;
    info!("Listening on {}", settings.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

#[tracing::instrument(skip_all)]
async fn do_import(cmd: ImportCmd) -> Result<()> {
    let then = Utc::now();
    let report = import::run(&cmd.input, &cmd.db).await?;
    info!(
        "Imported {} rows x {} columns into {} in {} milliseconds",
        report.rows,
        report.columns.len(),
        cmd.db.display(),
        Utc::now().timestamp_millis() - then.timestamp_millis()
    );
    Ok(())
}

/// Load `<dir>/settings.toml`; a missing file means all defaults.
fn load_settings(dir: &Path) -> Result<Settings> {
    let path = dir.join("settings.toml");
    if !path.exists() {
        return Ok(Settings::default());
    }

    let text = std::fs::read_to_string(&path)
        .map_err(|err| Error::Config(format!("Failed reading {}: {}", path.display(), err)))?;

    toml::from_str(&text).map_err(|err| {
        Error::Config(format!(
            "Invalid settings.toml at {}: {}",
            path.display(),
            err
        ))
    })
}

#[derive(Parser, Debug)]
#[command(name = "toxserve", version, about = "Toxicology dataset API server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API from the specified directory
    Serve(ServeCmd),
    /// Ingest a CSV export into the SQLite table (offline, replaces the table)
    Import(ImportCmd),
}

#[derive(Parser, Debug)]
pub struct ServeCmd {
    /// Target directory (or set TOXSERVE_DIR)
    ///
    /// Holds settings.toml (optional) and the imported database file.
    #[arg(
        value_name = "DIR",
        env = "TOXSERVE_DIR",
        required = true,
        value_hint = ValueHint::DirPath,
        value_parser = dir_must_exist
    )]
    pub dir: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ImportCmd {
    /// CSV file exported from the lab spreadsheet
    #[arg(
        value_name = "CSV",
        required = true,
        value_hint = ValueHint::FilePath,
        value_parser = file_must_exist
    )]
    pub input: PathBuf,

    /// SQLite file to (re)create the table in
    #[arg(long, value_name = "FILE", default_value = "tox.db")]
    pub db: PathBuf,
}

fn dir_must_exist(s: &str) -> std::result::Result<PathBuf, String> {
    let p = PathBuf::from(s);
    if !p.exists() {
        return Err(format!("Not found: {}", p.display()));
    }
    if !p.is_dir() {
        return Err(format!("Not a directory: {}", p.display()));
    }
    Ok(p)
}

fn file_must_exist(s: &str) -> std::result::Result<PathBuf, String> {
    let p = PathBuf::from(s);
    if !p.is_file() {
        return Err(format!("Not a file: {}", p.display()));
    }
    Ok(p)
}
