use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::{ArchiveRecord, ColumnValue};
use crate::error::AlmaError;

static UNIT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(.*\)").unwrap());

/// Normalizes a remote column label into a local field name:
/// `"Integration Time (s)"` becomes `"integration_time"`.
pub fn translate_label(label: &str) -> String {
    UNIT_SUFFIX
        .replace_all(label, "")
        .trim()
        .replace(' ', "_")
        .to_lowercase()
}

/// Two or more remote labels that normalize to the same field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCollision {
    pub field: String,
    pub labels: Vec<String>,
}

/// Translation table for one query result, built once from its column labels.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    translations: HashMap<String, String>,
    collisions: Vec<ColumnCollision>,
}

impl ColumnMap {
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut translations = HashMap::new();
        let mut by_field: Vec<(String, Vec<String>)> = Vec::new();
        for label in labels {
            let field = translate_label(label);
            match by_field.iter_mut().find(|(name, _)| *name == field) {
                Some((_, sources)) => {
                    if !sources.iter().any(|source| source == label) {
                        sources.push(label.to_string());
                    }
                }
                None => by_field.push((field.clone(), vec![label.to_string()])),
            }
            translations.insert(label.to_string(), field);
        }

        let collisions = by_field
            .into_iter()
            .filter(|(_, labels)| labels.len() > 1)
            .map(|(field, labels)| ColumnCollision { field, labels })
            .collect::<Vec<_>>();
        for collision in &collisions {
            tracing::warn!(
                field = %collision.field,
                labels = ?collision.labels,
                "distinct archive columns map to the same field; the last one wins"
            );
        }

        Self {
            translations,
            collisions,
        }
    }

    pub fn from_record(record: &ArchiveRecord) -> Self {
        Self::from_labels(record.columns.iter().map(|(label, _)| label.as_str()))
    }

    pub fn field(&self, label: &str) -> Option<&str> {
        self.translations.get(label).map(String::as_str)
    }

    pub fn collisions(&self) -> &[ColumnCollision] {
        &self.collisions
    }

    /// Renames every column of `record`. On a collision the later column
    /// overwrites the earlier one in place. A label the map was not built
    /// from means the result rows disagree on their columns.
    pub fn translate(&self, record: &ArchiveRecord) -> Result<Vec<(String, ColumnValue)>, AlmaError> {
        let mut fields: Vec<(String, ColumnValue)> = Vec::with_capacity(record.columns.len());
        for (label, value) in &record.columns {
            let field = self.field(label).ok_or_else(|| {
                AlmaError::ArchiveResponse(format!("column `{label}` missing from the first result row"))
            })?;
            match fields.iter_mut().find(|(name, _)| name == field) {
                Some(slot) => slot.1 = value.clone(),
                None => fields.push((field.to_string(), value.clone())),
            }
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn strips_units_and_spaces() {
        assert_eq!(translate_label("Integration Time (s)"), "integration_time");
        assert_eq!(translate_label("Frequency (GHz)"), "frequency");
        assert_eq!(translate_label("Member ous id"), "member_ous_id");
        assert_eq!(translate_label("  RA  "), "ra");
    }

    #[test]
    fn translation_is_deterministic() {
        let label = "Spatial resolution (arcsec)";
        assert_eq!(translate_label(label), translate_label(label));
    }

    #[test]
    fn collisions_are_reported_and_last_wins() {
        let record = ArchiveRecord::new(vec![
            ("Band".to_string(), ColumnValue::Text("3".to_string())),
            ("Band (GHz)".to_string(), ColumnValue::Text("100".to_string())),
            ("RA".to_string(), ColumnValue::Text("83.8".to_string())),
        ]);
        let map = ColumnMap::from_record(&record);
        assert_eq!(map.collisions().len(), 1);
        assert_eq!(map.collisions()[0].field, "band");

        let fields = map.translate(&record).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], ("band".to_string(), ColumnValue::Text("100".to_string())));
        assert_eq!(fields[1].0, "ra");
    }

    #[test]
    fn label_outside_the_map_is_rejected() {
        let first = ArchiveRecord::new(vec![(
            "Source name".to_string(),
            ColumnValue::Text("Orion".to_string()),
        )]);
        let other = ArchiveRecord::new(vec![(
            "Target".to_string(),
            ColumnValue::Text("M83".to_string()),
        )]);
        let map = ColumnMap::from_record(&first);
        assert_eq!(map.field("Source name"), Some("source_name"));
        assert_matches!(map.translate(&other).unwrap_err(), AlmaError::ArchiveResponse(_));
    }
}
