use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AlmaError;

/// Tables owned by the store. Maintenance operations only ever address a
/// table through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    #[value(name = "projects_data")]
    ProjectsData,
    #[value(name = "links_list")]
    LinksList,
}

impl TableName {
    pub const ALL: [TableName; 2] = [TableName::ProjectsData, TableName::LinksList];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::ProjectsData => "projects_data",
            TableName::LinksList => "links_list",
        }
    }

    pub fn id_column(&self) -> &'static str {
        match self {
            TableName::ProjectsData => "id_projects_data",
            TableName::LinksList => "id_link",
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TableName {
    type Err = AlmaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "projects_data" => Ok(TableName::ProjectsData),
            "links_list" => Ok(TableName::LinksList),
            _ => Err(AlmaError::InvalidTable(value.to_string())),
        }
    }
}

/// Member observation-unit-set identifier as reported by the archive, e.g.
/// `uid://A001/X12a/X3b`. One field may carry several sub-identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MousId(String);

impl MousId {
    pub fn new(value: impl Into<String>) -> Self {
        let value: String = value.into();
        Self(value.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sub-identifiers with duplicates removed, sorted.
    pub fn unique_parts(&self) -> Vec<MousId> {
        let mut parts = self
            .0
            .split(|ch: char| ch.is_whitespace() || ch == ',')
            .filter(|part| !part.is_empty())
            .map(|part| MousId(part.to_string()))
            .collect::<Vec<_>>();
        parts.sort();
        parts.dedup();
        parts
    }
}

impl fmt::Display for MousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Array value with a per-element mask; `true` marks an element as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedArray {
    pub data: Vec<Value>,
    pub mask: Vec<bool>,
}

impl MaskedArray {
    pub fn from_values(values: Vec<Value>) -> Self {
        let mask = values.iter().map(Value::is_null).collect();
        Self { data: values, mask }
    }

    pub fn masked_scalar() -> Self {
        Self {
            data: vec![Value::Null],
            mask: vec![true],
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AlmaError> {
        serde_json::to_vec(self).map_err(|err| AlmaError::Database(err.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AlmaError> {
        serde_json::from_slice(bytes).map_err(|err| AlmaError::Database(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Text(String),
    Masked(MaskedArray),
}

impl ColumnValue {
    /// Coerces an archive cell: arrays and nulls become masked values,
    /// everything else is stringified.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => ColumnValue::Masked(MaskedArray::masked_scalar()),
            Value::Array(values) => ColumnValue::Masked(MaskedArray::from_values(values)),
            Value::String(text) => ColumnValue::Text(text),
            other => ColumnValue::Text(other.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// One row of an archive query, columns in arrival order under their remote labels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArchiveRecord {
    pub columns: Vec<(String, ColumnValue)>,
}

impl ArchiveRecord {
    pub fn new(columns: Vec<(String, ColumnValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, label: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedLink {
    pub url: String,
    pub uid: String,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub id: i64,
    pub url: String,
    pub uid: String,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub id: i64,
    pub fields: BTreeMap<String, ColumnValue>,
}

impl ProjectRecord {
    pub fn field(&self, name: &str) -> Option<&ColumnValue> {
        self.fields.get(name)
    }
}
