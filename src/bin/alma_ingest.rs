use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use alma_ingest::app::{App, IngestResult};
use alma_ingest::archive::{AlmaHttpClient, ArchiveClient};
use alma_ingest::config::{ConfigLoader, ResolvedConfig, parse_date};
use alma_ingest::domain::{ArchiveRecord, MousId, StagedLink, TableName};
use alma_ingest::error::AlmaError;
use alma_ingest::ingest::IngestOptions;
use alma_ingest::output::{ConsoleOutput, JsonOutput, OutputMode};
use alma_ingest::store::Store;

#[derive(Parser)]
#[command(name = "alma-ingest")]
#[command(about = "Ingest ALMA archive project metadata and staged data links into SQLite")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Path to alma-ingest.json
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create the projects_data and links_list tables")]
    Init,
    #[command(about = "Query the archive and store projects and their links")]
    Ingest(IngestArgs),
    #[command(about = "Delete all rows from one or both tables")]
    Clear(ClearArgs),
    #[command(about = "Print every stored project row")]
    Projects,
    #[command(about = "Print every stored link row")]
    Links,
    #[command(about = "Print the most recent project release date")]
    LatestRelease,
}

#[derive(Args)]
struct IngestArgs {
    /// Object name to search for; without it every search in the config runs
    term: Option<String>,

    #[arg(long)]
    no_links: bool,

    #[arg(long)]
    download: bool,

    /// Release date (YYYY-MM-DD); recorded but not applied to the query
    #[arg(long)]
    since: Option<String>,
}

#[derive(Args)]
struct ClearArgs {
    #[arg(long, value_enum)]
    table: Option<TableName>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<AlmaError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AlmaError) -> u8 {
    match error {
        AlmaError::ConfigRead(_) | AlmaError::ConfigParse(_) | AlmaError::InvalidDate(_) => 2,
        AlmaError::InvalidTable(_) => 2,
        AlmaError::ArchiveHttp(_)
        | AlmaError::ArchiveStatus { .. }
        | AlmaError::ArchiveResponse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::from_config(&config);

    match cli.command {
        Commands::Ingest(args) => {
            let archive = AlmaHttpClient::new(&config.archive_url)?;
            run_ingest(args, App::new(store, archive), &config, output_mode)
        }
        Commands::Init => {
            let app = App::new(store, NopArchive);
            match output_mode {
                OutputMode::Json => {
                    let result = app.init(&JsonOutput)?;
                    JsonOutput::print(&result).into_diagnostic()
                }
                OutputMode::Console => {
                    let result = app.init(&ConsoleOutput)?;
                    ConsoleOutput::print_init(&result);
                    Ok(())
                }
            }
        }
        Commands::Clear(args) => {
            let app = App::new(store, NopArchive);
            match output_mode {
                OutputMode::Json => {
                    let result = app.clear(args.table, &JsonOutput)?;
                    JsonOutput::print(&result).into_diagnostic()
                }
                OutputMode::Console => {
                    let result = app.clear(args.table, &ConsoleOutput)?;
                    ConsoleOutput::print_clear(&result);
                    Ok(())
                }
            }
        }
        Commands::Projects => {
            let app = App::new(store, NopArchive);
            match output_mode {
                OutputMode::Json => {
                    let result = app.projects(&JsonOutput)?;
                    JsonOutput::print(&result).into_diagnostic()
                }
                OutputMode::Console => {
                    let result = app.projects(&ConsoleOutput)?;
                    ConsoleOutput::print_projects(&result);
                    Ok(())
                }
            }
        }
        Commands::Links => {
            let app = App::new(store, NopArchive);
            match output_mode {
                OutputMode::Json => {
                    let result = app.links(&JsonOutput)?;
                    JsonOutput::print(&result).into_diagnostic()
                }
                OutputMode::Console => {
                    let result = app.links(&ConsoleOutput)?;
                    ConsoleOutput::print_links(&result);
                    Ok(())
                }
            }
        }
        Commands::LatestRelease => {
            let app = App::new(store, NopArchive);
            match output_mode {
                OutputMode::Json => {
                    let result = app.latest_release_date(&JsonOutput)?;
                    JsonOutput::print(&result).into_diagnostic()
                }
                OutputMode::Console => {
                    let result = app.latest_release_date(&ConsoleOutput)?;
                    ConsoleOutput::print_release_date(&result);
                    Ok(())
                }
            }
        }
    }
}

fn run_ingest<A: ArchiveClient>(
    args: IngestArgs,
    app: App<A>,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let IngestArgs {
        term,
        no_links,
        download,
        since,
    } = args;

    let result = match term {
        Some(term) => {
            let options = IngestOptions {
                save_links: !no_links,
                download,
                since: since.as_deref().map(parse_date).transpose()?,
            };
            let run = match output_mode {
                OutputMode::Json => app.ingest(&term, &options, &JsonOutput),
                OutputMode::Console => app.ingest(&term, &options, &ConsoleOutput),
            };
            IngestResult { runs: vec![run?] }
        }
        None => {
            if config.searches.is_empty() {
                return Err(miette::Report::msg(
                    "no search term given and no searches configured (try `alma-ingest ingest <TERM>`)",
                ));
            }
            let result = match output_mode {
                OutputMode::Json => app.ingest_all(config, &JsonOutput),
                OutputMode::Console => app.ingest_all(config, &ConsoleOutput),
            };
            result?
        }
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print(&result).into_diagnostic(),
        OutputMode::Console => {
            ConsoleOutput::print_ingest(&result);
            Ok(())
        }
    }
}

#[derive(Clone, Copy)]
struct NopArchive;

impl ArchiveClient for NopArchive {
    fn query_object(&self, _object_name: &str) -> Result<Vec<ArchiveRecord>, AlmaError> {
        Err(AlmaError::ArchiveHttp(
            "archive client not configured".to_string(),
        ))
    }

    fn stage_data(&self, _uids: &[MousId]) -> Result<Vec<StagedLink>, AlmaError> {
        Err(AlmaError::ArchiveHttp(
            "archive client not configured".to_string(),
        ))
    }

    fn download_files(
        &self,
        _links: &[StagedLink],
        _cache_dir: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, AlmaError> {
        Err(AlmaError::ArchiveHttp(
            "archive client not configured".to_string(),
        ))
    }
}
