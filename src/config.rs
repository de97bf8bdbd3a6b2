use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AlmaError;
use crate::store::{DEFAULT_DATABASE, DEFAULT_DOWNLOAD_DIR};

pub const DEFAULT_CONFIG_FILE: &str = "alma-ingest.json";
pub const DEFAULT_ARCHIVE_URL: &str = "https://almascience.eso.org";
pub const ARCHIVE_URL_ENV: &str = "ALMA_ARCHIVE_URL";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default)]
    pub archive_url: Option<String>,
    #[serde(default)]
    pub searches: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SearchEntry {
    Shorthand(String),
    Detailed(SearchEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchEntryObject {
    pub term: String,
    #[serde(default)]
    pub save_links: Option<bool>,
    #[serde(default)]
    pub download: Option<bool>,
    #[serde(default)]
    pub since: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub term: String,
    pub save_links: bool,
    pub download: bool,
    pub since: Option<NaiveDate>,
}

impl SearchRequest {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            save_links: true,
            download: false,
            since: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub database: Utf8PathBuf,
    pub download_dir: Utf8PathBuf,
    pub archive_url: String,
    pub searches: Vec<SearchRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `alma-ingest.json` in the current directory when it
    /// exists. Without either, defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, AlmaError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| AlmaError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| AlmaError::ConfigParse(err.to_string()))?
        };

        let mut resolved = Self::resolve_config(config)?;
        if let Ok(url) = std::env::var(ARCHIVE_URL_ENV) {
            if !url.trim().is_empty() {
                resolved.archive_url = url.trim().to_string();
            }
        }
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, AlmaError> {
        let schema_version = config.schema_version.unwrap_or(SCHEMA_VERSION);
        if schema_version != SCHEMA_VERSION {
            return Err(AlmaError::ConfigParse(format!(
                "unsupported schema_version {schema_version} (expected {SCHEMA_VERSION})"
            )));
        }

        let searches = config
            .searches
            .into_iter()
            .map(|entry| match entry {
                SearchEntry::Shorthand(term) => Ok(SearchRequest::new(term)),
                SearchEntry::Detailed(obj) => Ok(SearchRequest {
                    term: obj.term,
                    save_links: obj.save_links.unwrap_or(true),
                    download: obj.download.unwrap_or(false),
                    since: obj.since.as_deref().map(parse_date).transpose()?,
                }),
            })
            .collect::<Result<Vec<_>, AlmaError>>()?;

        Ok(ResolvedConfig {
            database: Utf8PathBuf::from(config.database.as_deref().unwrap_or(DEFAULT_DATABASE)),
            download_dir: Utf8PathBuf::from(
                config
                    .download_dir
                    .as_deref()
                    .unwrap_or(DEFAULT_DOWNLOAD_DIR),
            ),
            archive_url: config
                .archive_url
                .unwrap_or_else(|| DEFAULT_ARCHIVE_URL.to_string()),
            searches,
        })
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, AlmaError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AlmaError::InvalidDate(value.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_config_shorthand() {
        let config = Config {
            searches: vec![SearchEntry::Shorthand("Orion KL".to_string())],
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.database, Utf8PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(resolved.archive_url, DEFAULT_ARCHIVE_URL);
        assert_eq!(resolved.searches, vec![SearchRequest::new("Orion KL")]);
    }

    #[test]
    fn unsupported_schema_version_is_rejected() {
        let config = Config {
            schema_version: Some(2),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, AlmaError::ConfigParse(message) if message.contains("schema_version 2"));
    }

    #[test]
    fn invalid_since_is_rejected() {
        let config = Config {
            searches: vec![SearchEntry::Detailed(SearchEntryObject {
                term: "M83".to_string(),
                save_links: None,
                download: None,
                since: Some("last tuesday".to_string()),
            })],
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, AlmaError::InvalidDate(_));
    }
}
