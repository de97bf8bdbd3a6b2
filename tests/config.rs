use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::NaiveDate;

use alma_ingest::config::{Config, ConfigLoader, SearchEntry, SearchEntryObject, SearchRequest};
use alma_ingest::error::AlmaError;

#[test]
fn parse_config_entries() {
    let config = Config {
        schema_version: Some(1),
        database: Some("data/alma.db".to_string()),
        download_dir: None,
        archive_url: Some("https://almascience.nrao.edu".to_string()),
        searches: vec![
            SearchEntry::Shorthand("Orion KL".to_string()),
            SearchEntry::Detailed(SearchEntryObject {
                term: "M83".to_string(),
                save_links: Some(false),
                download: Some(true),
                since: Some("2016-01-01".to_string()),
            }),
        ],
    };

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.database, Utf8PathBuf::from("data/alma.db"));
    assert_eq!(resolved.archive_url, "https://almascience.nrao.edu");
    assert_eq!(resolved.searches[0], SearchRequest::new("Orion KL"));
    assert_eq!(
        resolved.searches[1],
        SearchRequest {
            term: "M83".to_string(),
            save_links: false,
            download: true,
            since: NaiveDate::from_ymd_opt(2016, 1, 1),
        }
    );
}

#[test]
fn reads_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("alma-ingest.json");
    std::fs::write(
        &path,
        r#"{ "download_dir": "/data/alma", "searches": ["NGC 253", { "term": "Sgr B2", "download": true }] }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.download_dir, Utf8PathBuf::from("/data/alma"));
    assert_eq!(resolved.searches.len(), 2);
    assert!(resolved.searches[1].download);
    assert!(resolved.searches[1].save_links);
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, AlmaError::ConfigRead(_));
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("alma-ingest.json");
    std::fs::write(&path, "{ searches: ").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, AlmaError::ConfigParse(_));
}
