use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AlmaError {
    #[error("archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("archive returned status {status}: {message}")]
    ArchiveStatus { status: u16, message: String },

    #[error("unexpected archive response: {0}")]
    ArchiveResponse(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("insert into {table} failed: {message}")]
    Insert { table: String, message: String },

    #[error("schema mismatch: {0}")]
    #[diagnostic(help("provision the store with `alma-ingest init`"))]
    SchemaMismatch(String),

    #[error("unknown table: {0} (expected projects_data or links_list)")]
    InvalidTable(String),

    #[error("invalid date: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
