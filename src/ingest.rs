//! Incremental ingestion: one archive query turned into `projects_data` rows,
//! followed by link resolution for every distinct member OUS id, all inside a
//! single store transaction.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::archive::ArchiveClient;
use crate::columns::{ColumnCollision, ColumnMap};
use crate::config::SearchRequest;
use crate::domain::{ColumnValue, MousId, StagedLink, TableName};
use crate::error::AlmaError;
use crate::ids::IdAllocator;
use crate::schema::MEMBER_OUS_ID_FIELD;
use crate::store::{Database, StoreTransaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub save_links: bool,
    pub download: bool,
    /// Accepted for compatibility with saved searches; the archive query
    /// does not filter on it.
    pub since: Option<NaiveDate>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            save_links: true,
            download: false,
            since: None,
        }
    }
}

impl From<&SearchRequest> for IngestOptions {
    fn from(request: &SearchRequest) -> Self {
        Self {
            save_links: request.save_links,
            download: request.download,
            since: request.since,
        }
    }
}

/// Inclusive range of identifiers written by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdRange {
    pub first: i64,
    pub last: i64,
}

impl IdRange {
    fn between(start: i64, next: i64) -> Option<Self> {
        (next > start).then_some(Self {
            first: start,
            last: next - 1,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub search: String,
    pub records: usize,
    pub project_ids: Option<IdRange>,
    pub unit_ids: Vec<String>,
    pub links: usize,
    pub link_ids: Option<IdRange>,
    pub collisions: Vec<ColumnCollision>,
    pub since_applied: bool,
}

/// Committed result of a run plus the links it resolved, for the retrieval stage.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub report: IngestReport,
    pub links: Vec<StagedLink>,
}

pub fn ingest<A: ArchiveClient + ?Sized>(
    db: &mut Database,
    archive: &A,
    search: &str,
    options: &IngestOptions,
    sink: &dyn ProgressSink,
) -> Result<IngestOutcome, AlmaError> {
    if let Some(since) = options.since {
        tracing::warn!(%since, "release date filter is not applied to archive queries");
    }

    let tx = db.transaction()?;
    let mut project_ids = IdAllocator::seed(tx.connection(), TableName::ProjectsData)?;
    let mut link_ids = IdAllocator::seed(tx.connection(), TableName::LinksList)?;
    let first_project = project_ids.peek();
    let first_link = link_ids.peek();

    sink.event(ProgressEvent {
        message: format!("phase=Query; searching archive for {search}"),
        elapsed: None,
    });
    let start = std::time::Instant::now();
    let records = archive.query_object(search)?;
    sink.event(ProgressEvent {
        message: format!("archive.response results={}", records.len()),
        elapsed: Some(start.elapsed()),
    });
    tracing::info!(search, results = records.len(), "archive query finished");

    let columns = records
        .first()
        .map(ColumnMap::from_record)
        .unwrap_or_default();

    sink.event(ProgressEvent {
        message: "phase=Store; saving project metadata".to_string(),
        elapsed: None,
    });
    let mut unit_ids = Vec::<MousId>::new();
    let mut seen = HashSet::<MousId>::new();
    for (idx, record) in records.iter().enumerate() {
        let id = project_ids.allocate();
        let fields = columns.translate(record)?;
        tx.insert_project(id, &fields)?;
        tracing::debug!(insertion = idx + 1, id, "inserted project row");

        match member_ous_id(&fields) {
            Some(unit) => {
                if seen.insert(unit.clone()) {
                    unit_ids.push(unit);
                }
            }
            None => tracing::warn!(id, "project row has no member ous id"),
        }
    }

    let mut links = Vec::new();
    if options.save_links {
        sink.event(ProgressEvent {
            message: format!("phase=Links; resolving {} unit ids", unit_ids.len()),
            elapsed: None,
        });
        for unit in &unit_ids {
            links.extend(resolve_links(&tx, archive, unit, &mut link_ids)?);
        }
    }

    tx.commit()?;

    let report = IngestReport {
        search: search.to_string(),
        records: records.len(),
        project_ids: IdRange::between(first_project, project_ids.peek()),
        unit_ids: unit_ids.iter().map(|unit| unit.to_string()).collect(),
        links: links.len(),
        link_ids: IdRange::between(first_link, link_ids.peek()),
        collisions: columns.collisions().to_vec(),
        since_applied: false,
    };
    tracing::info!(
        search,
        records = report.records,
        units = report.unit_ids.len(),
        links = report.links,
        "ingestion committed"
    );
    Ok(IngestOutcome { report, links })
}

/// Stages the links of one observation unit and inserts them with fresh ids.
/// The first failing insert aborts the batch.
pub fn resolve_links<A: ArchiveClient + ?Sized>(
    tx: &StoreTransaction<'_>,
    archive: &A,
    unit: &MousId,
    ids: &mut IdAllocator,
) -> Result<Vec<StagedLink>, AlmaError> {
    let parts = unit.unique_parts();
    if parts.is_empty() {
        tracing::warn!(%unit, "empty member ous id, nothing to stage");
        return Ok(Vec::new());
    }

    let links = archive.stage_data(&parts)?;
    for link in &links {
        let id = ids.allocate();
        tx.insert_link(id, link)?;
        tracing::debug!(id, uid = %link.uid, "inserted link row");
    }
    Ok(links)
}

fn member_ous_id(fields: &[(String, ColumnValue)]) -> Option<MousId> {
    fields
        .iter()
        .find(|(name, _)| name == MEMBER_OUS_ID_FIELD)
        .and_then(|(_, value)| value.as_text())
        .map(MousId::new)
}
