use std::time::Duration;

use serde::Serialize;

use crate::archive::ArchiveClient;
use crate::config::{ResolvedConfig, SearchRequest};
use crate::domain::{LinkEntry, ProjectRecord, TableName};
use crate::error::AlmaError;
use crate::ingest::{self, IngestOptions, IngestReport};
use crate::retrieve;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    pub database: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub runs: Vec<IngestRunResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunResult {
    #[serde(flatten)]
    pub report: IngestReport,
    pub downloaded: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: Vec<TableName>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectsResult {
    pub projects: Vec<ProjectRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinksResult {
    pub links: Vec<LinkEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseDateResult {
    pub release_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Entry point for every store operation. Each call opens its own
/// connection and closes it before returning, on success or failure.
#[derive(Clone)]
pub struct App<A: ArchiveClient> {
    store: Store,
    archive: A,
}

impl<A: ArchiveClient> App<A> {
    pub fn new(store: Store, archive: A) -> Self {
        Self { store, archive }
    }

    pub fn init(&self, sink: &dyn ProgressSink) -> Result<InitResult, AlmaError> {
        sink.event(ProgressEvent {
            message: format!("phase=Store; provisioning {}", self.store.database_path()),
            elapsed: None,
        });
        self.store.provision()?;
        Ok(InitResult {
            database: self.store.database_path().to_string(),
        })
    }

    pub fn ingest(
        &self,
        search: &str,
        options: &IngestOptions,
        sink: &dyn ProgressSink,
    ) -> Result<IngestRunResult, AlmaError> {
        let outcome = {
            let mut db = self.store.open()?;
            ingest::ingest(&mut db, &self.archive, search, options, sink)?
        };

        let mut downloaded = Vec::new();
        if options.download {
            if options.save_links {
                let files = retrieve::retrieve(
                    &self.archive,
                    &outcome.links,
                    self.store.download_dir(),
                    sink,
                )?;
                downloaded = files.into_iter().map(|path| path.to_string()).collect();
            } else {
                tracing::warn!(search, "download requested without link resolution; nothing to fetch");
            }
        }

        Ok(IngestRunResult {
            report: outcome.report,
            downloaded,
        })
    }

    /// Runs every saved search from the config in order; stops at the first failure.
    pub fn ingest_all(
        &self,
        config: &ResolvedConfig,
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, AlmaError> {
        let runs = config
            .searches
            .iter()
            .map(|request: &SearchRequest| {
                self.ingest(&request.term, &IngestOptions::from(request), sink)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IngestResult { runs })
    }

    pub fn clear(
        &self,
        table: Option<TableName>,
        sink: &dyn ProgressSink,
    ) -> Result<ClearResult, AlmaError> {
        sink.event(ProgressEvent {
            message: match table {
                Some(table) => format!("phase=Store; clearing {table}"),
                None => "phase=Store; clearing all tables".to_string(),
            },
            elapsed: None,
        });
        let mut db = self.store.open()?;
        let cleared = db.clear(table)?;
        Ok(ClearResult { cleared })
    }

    pub fn projects(&self, sink: &dyn ProgressSink) -> Result<ProjectsResult, AlmaError> {
        sink.event(ProgressEvent {
            message: "phase=Store; reading projects_data".to_string(),
            elapsed: None,
        });
        let db = self.store.open()?;
        Ok(ProjectsResult {
            projects: db.projects()?,
        })
    }

    pub fn links(&self, sink: &dyn ProgressSink) -> Result<LinksResult, AlmaError> {
        sink.event(ProgressEvent {
            message: "phase=Store; reading links_list".to_string(),
            elapsed: None,
        });
        let db = self.store.open()?;
        Ok(LinksResult { links: db.links()? })
    }

    pub fn latest_release_date(
        &self,
        sink: &dyn ProgressSink,
    ) -> Result<ReleaseDateResult, AlmaError> {
        sink.event(ProgressEvent {
            message: "phase=Store; looking up latest release date".to_string(),
            elapsed: None,
        });
        let db = self.store.open()?;
        Ok(ReleaseDateResult {
            release_date: db.latest_release_date()?,
        })
    }
}
