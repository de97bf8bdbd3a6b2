pub mod app;
pub mod archive;
pub mod columns;
pub mod config;
pub mod domain;
pub mod error;
pub mod ids;
pub mod ingest;
pub mod output;
pub mod retrieve;
pub mod schema;
pub mod store;
