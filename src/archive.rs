use std::fs;
use std::io::Write;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::{ArchiveRecord, ColumnValue, MousId, StagedLink};
use crate::error::AlmaError;

/// Remote archive capability consumed by the pipeline.
pub trait ArchiveClient: Send + Sync {
    /// All project records whose target matches `object_name`.
    fn query_object(&self, object_name: &str) -> Result<Vec<ArchiveRecord>, AlmaError>;
    /// Staged download links for the given observation units.
    fn stage_data(&self, uids: &[MousId]) -> Result<Vec<StagedLink>, AlmaError>;
    /// Fetches every link into `cache_dir`, reusing files already cached there.
    fn download_files(
        &self,
        links: &[StagedLink],
        cache_dir: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, AlmaError>;
}

#[derive(Clone)]
pub struct AlmaHttpClient {
    client: Client,
    base_url: String,
}

impl AlmaHttpClient {
    pub fn new(base_url: &str) -> Result<Self, AlmaError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("alma-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AlmaError::ArchiveHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| AlmaError::ArchiveHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn tap_url(&self) -> String {
        format!("{}/tap/sync", self.base_url)
    }

    fn datalink_url(&self) -> String {
        format!("{}/datalink/sync", self.base_url)
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, AlmaError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "archive request failed".to_string());
        Err(AlmaError::ArchiveStatus { status, message })
    }

    fn get_table(&self, url: &str, query: &[(&str, &str)]) -> Result<TapTable, AlmaError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|err| AlmaError::ArchiveHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .json::<TapTable>()
            .map_err(|err| AlmaError::ArchiveResponse(err.to_string()))
    }

    fn download_one(&self, link: &StagedLink, cache_dir: &Utf8Path) -> Result<Utf8PathBuf, AlmaError> {
        let destination = cache_dir.join(file_name_for(&link.url)?);
        if is_cached(&destination, link.size) {
            tracing::info!(path = %destination, "already cached");
            return Ok(destination);
        }

        let response = self
            .client
            .get(&link.url)
            .send()
            .map_err(|err| AlmaError::ArchiveHttp(err.to_string()))?;
        let mut response = Self::handle_status(response)?;
        let mut temp = tempfile::Builder::new()
            .prefix("alma-ingest-download")
            .tempfile_in(cache_dir.as_std_path())
            .map_err(|err| AlmaError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut temp)
            .map_err(|err| AlmaError::ArchiveHttp(err.to_string()))?;
        temp.flush()
            .map_err(|err| AlmaError::Filesystem(err.to_string()))?;
        temp.persist(destination.as_std_path())
            .map_err(|err| AlmaError::Filesystem(err.to_string()))?;
        tracing::info!(path = %destination, "downloaded");
        Ok(destination)
    }
}

impl ArchiveClient for AlmaHttpClient {
    fn query_object(&self, object_name: &str) -> Result<Vec<ArchiveRecord>, AlmaError> {
        let adql = object_query(object_name);
        let table = self.get_table(
            &self.tap_url(),
            &[
                ("REQUEST", "doQuery"),
                ("LANG", "ADQL"),
                ("FORMAT", "json"),
                ("QUERY", adql.as_str()),
            ],
        )?;
        table.into_records()
    }

    fn stage_data(&self, uids: &[MousId]) -> Result<Vec<StagedLink>, AlmaError> {
        let mut links = Vec::new();
        for uid in uids {
            let table = self.get_table(
                &self.datalink_url(),
                &[("ID", uid.as_str()), ("RESPONSEFORMAT", "json")],
            )?;
            links.extend(staged_links(table.into_records()?, uid));
        }
        Ok(links)
    }

    fn download_files(
        &self,
        links: &[StagedLink],
        cache_dir: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, AlmaError> {
        links
            .iter()
            .map(|link| self.download_one(link, cache_dir))
            .collect()
    }
}

/// ObsCore columns fetched per observation, each aliased to the archive label
/// the column translator turns into a `projects_data` field.
pub const PROJECT_SELECT: &[(&str, &str)] = &[
    ("proposal_id", "Project code"),
    ("target_name", "Source name"),
    ("s_ra", "RA"),
    ("s_dec", "Dec"),
    ("gal_longitude", "Galactic longitude"),
    ("gal_latitude", "Galactic latitude"),
    ("band_list", "Band"),
    ("spatial_resolution", "Spatial resolution (arcsec)"),
    ("em_resolution", "Frequency resolution (kHz)"),
    ("antenna_arrays", "Array"),
    ("is_mosaic", "Mosaic"),
    ("t_exptime", "Integration (s)"),
    ("obs_release_date", "Release date"),
    ("frequency_support", "Frequency support"),
    ("velocity_resolution", "Velocity resolution (m/s)"),
    ("pol_states", "Pol products"),
    ("t_min", "Observation date"),
    ("obs_creator_name", "PI name"),
    ("schedblock_name", "SB name"),
    ("proposal_authors", "Proposal authors"),
    ("sensitivity_10kms", "Line sensitivity (10 km/s) (mJy/beam)"),
    ("cont_sensitivity_bandwidth", "Continuum sensitivity (mJy/beam)"),
    ("pwv", "PWV"),
    ("group_ous_uid", "Group ous id"),
    ("member_ous_uid", "Member ous id"),
    ("asdm_uid", "Asdm uid"),
    ("obs_title", "Project title"),
    ("type", "Project type"),
    ("scan_intent", "Scan intent"),
    ("s_fov", "Field of view (deg)"),
    ("spatial_scale_max", "Largest angular scale (arcsec)"),
    ("qa2_passed", "QA2 Status"),
    ("science_keyword", "Science keyword"),
    ("scientific_category", "Scientific category"),
    ("obs_id", "ASA project code"),
];

/// ADQL selecting every observation whose target name matches `object_name`.
pub fn object_query(object_name: &str) -> String {
    let columns = PROJECT_SELECT
        .iter()
        .map(|(column, label)| format!("{column} AS \"{label}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let escaped = object_name.trim().replace('\'', "''");
    format!("SELECT {columns} FROM ivoa.obscore WHERE target_name = '{escaped}'")
}

/// Table payload of a TAP sync query with `FORMAT=json`.
#[derive(Debug, Deserialize)]
pub struct TapTable {
    pub metadata: Vec<TapColumn>,
    pub data: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct TapColumn {
    pub name: String,
}

impl TapTable {
    pub fn into_records(self) -> Result<Vec<ArchiveRecord>, AlmaError> {
        let names = self
            .metadata
            .into_iter()
            .map(|column| column.name)
            .collect::<Vec<_>>();
        self.data
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                if row.len() != names.len() {
                    return Err(AlmaError::ArchiveResponse(format!(
                        "row {idx} has {} values for {} columns",
                        row.len(),
                        names.len()
                    )));
                }
                let columns = names
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(ColumnValue::from_json))
                    .collect();
                Ok(ArchiveRecord::new(columns))
            })
            .collect()
    }
}

/// Converts datalink rows into links. Service descriptors and error rows carry
/// no `access_url` and are skipped.
fn staged_links(records: Vec<ArchiveRecord>, uid: &MousId) -> Vec<StagedLink> {
    records
        .into_iter()
        .filter_map(|record| {
            if let Some(message) = record
                .get("error_message")
                .and_then(ColumnValue::as_text)
                .filter(|message| !message.trim().is_empty())
            {
                tracing::warn!(%uid, error = message, "datalink returned an error row");
                return None;
            }
            let Some(url) = record.get("access_url").and_then(ColumnValue::as_text) else {
                tracing::warn!(%uid, "datalink row without access_url");
                return None;
            };
            let size = record
                .get("content_length")
                .and_then(ColumnValue::as_text)
                .and_then(|value| value.parse::<f64>().ok())
                .unwrap_or_default();
            let link_uid = record
                .get("ID")
                .and_then(ColumnValue::as_text)
                .unwrap_or(uid.as_str());
            Some(StagedLink {
                url: url.to_string(),
                uid: link_uid.to_string(),
                size,
            })
        })
        .collect()
}

fn file_name_for(url: &str) -> Result<String, AlmaError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|err| AlmaError::ArchiveResponse(err.to_string()))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AlmaError::ArchiveResponse(format!("no file name in {url}")))
}

fn is_cached(path: &Utf8Path, expected_size: f64) -> bool {
    match fs::metadata(path.as_std_path()) {
        Ok(meta) => expected_size <= 0.0 || meta.len() as f64 == expected_size,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::columns::translate_label;
    use crate::schema::PROJECT_COLUMNS;

    #[test]
    fn escapes_object_names() {
        let query = object_query("Barnard's Star");
        assert!(query.starts_with("SELECT proposal_id AS \"Project code\", target_name AS \"Source name\""));
        assert!(query.ends_with("FROM ivoa.obscore WHERE target_name = 'Barnard''s Star'"));
    }

    #[test]
    fn selected_labels_cover_the_project_table() {
        let mut fields = PROJECT_SELECT
            .iter()
            .map(|(_, label)| translate_label(label))
            .collect::<Vec<_>>();
        fields.sort();
        let mut declared = PROJECT_COLUMNS
            .iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        declared.sort();
        assert_eq!(fields, declared);
    }

    #[test]
    fn datalink_descriptor_and_error_rows_are_skipped() {
        let table: TapTable = serde_json::from_value(json!({
            "metadata": [{"name": "ID"}, {"name": "access_url"}, {"name": "service_def"}, {"name": "error_message"}, {"name": "content_length"}],
            "data": [
                ["uid://A1", "https://almascience.eso.org/dataPortal/member.uid___A1.tar", null, null, 4096],
                ["uid://A1", null, "DataLinkService", null, null],
                ["uid://A1", "https://almascience.eso.org/dataPortal/missing.tar", null, "NotFoundFault: no such file", null]
            ]
        }))
        .unwrap();
        let links = staged_links(table.into_records().unwrap(), &MousId::new("uid://A1"));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].size, 4096.0);
    }

    #[test]
    fn decodes_tap_rows_in_column_order() {
        let table: TapTable = serde_json::from_value(json!({
            "metadata": [{"name": "Source name"}, {"name": "Frequency support"}, {"name": "Member ous id"}],
            "data": [["Orion", [84.0, null], "uid://A1"]]
        }))
        .unwrap();
        let records = table.into_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].columns[0].0, "Source name");
        assert_matches!(records[0].get("Frequency support"), Some(ColumnValue::Masked(_)));
        assert_eq!(
            records[0].get("Member ous id"),
            Some(&ColumnValue::Text("uid://A1".to_string()))
        );
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let table: TapTable = serde_json::from_value(json!({
            "metadata": [{"name": "a"}, {"name": "b"}],
            "data": [["only one"]]
        }))
        .unwrap();
        assert_matches!(table.into_records().unwrap_err(), AlmaError::ArchiveResponse(_));
    }

    #[test]
    fn staged_links_from_datalink_rows() {
        let table: TapTable = serde_json::from_value(json!({
            "metadata": [{"name": "ID"}, {"name": "access_url"}, {"name": "content_length"}],
            "data": [["uid://A1", "https://almascience.eso.org/dataPortal/member.uid___A1.tar", 2048]]
        }))
        .unwrap();
        let uid = MousId::new("uid://A1");
        let links = staged_links(table.into_records().unwrap(), &uid);
        assert_eq!(
            links,
            vec![StagedLink {
                url: "https://almascience.eso.org/dataPortal/member.uid___A1.tar".to_string(),
                uid: "uid://A1".to_string(),
                size: 2048.0,
            }]
        );
        assert_eq!(file_name_for(&links[0].url).unwrap(), "member.uid___A1.tar");
    }
}
