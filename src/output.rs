use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    ClearResult, IngestResult, InitResult, LinksResult, ProgressEvent, ProgressSink,
    ProjectsResult, ReleaseDateResult,
};
use crate::domain::ColumnValue;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Console,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human readable output: progress on stderr, results on stdout.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "[alma-ingest] {} ({} ms)",
                event.message,
                elapsed.as_millis()
            ),
            None => eprintln!("[alma-ingest] {}", event.message),
        }
    }
}

impl ConsoleOutput {
    pub fn print_init(result: &InitResult) {
        println!("provisioned {}", result.database);
    }

    pub fn print_ingest(result: &IngestResult) {
        for run in &result.runs {
            let report = &run.report;
            println!("search: {}", report.search);
            println!("  results: {}", report.records);
            if let Some(range) = report.project_ids {
                println!("  project ids: {}..={}", range.first, range.last);
            }
            println!("  unit ids: {}", report.unit_ids.len());
            println!("  links: {}", report.links);
            if let Some(range) = report.link_ids {
                println!("  link ids: {}..={}", range.first, range.last);
            }
            for collision in &report.collisions {
                println!(
                    "  column collision: {} <- {}",
                    collision.field,
                    collision.labels.join(", ")
                );
            }
            for path in &run.downloaded {
                println!("  downloaded: {path}");
            }
        }
    }

    pub fn print_clear(result: &ClearResult) {
        for table in &result.cleared {
            println!("cleared {table}");
        }
    }

    pub fn print_projects(result: &ProjectsResult) {
        for project in &result.projects {
            let fields = project
                .fields
                .iter()
                .filter_map(|(name, value)| match value {
                    ColumnValue::Text(text) => Some(format!("{name}={text}")),
                    ColumnValue::Masked(array) => Some(format!("{name}=<masked x{}>", array.data.len())),
                    ColumnValue::Null => None,
                })
                .collect::<Vec<_>>();
            println!("{}\t{}", project.id, fields.join("\t"));
        }
    }

    pub fn print_links(result: &LinksResult) {
        for link in &result.links {
            println!("{}\t{}\t{}\t{}", link.id, link.uid, link.size, link.url);
        }
    }

    pub fn print_release_date(result: &ReleaseDateResult) {
        if let Some(date) = &result.release_date {
            println!("{date}");
        }
    }
}
