//! Declared layout of the two store tables and validation of a live database
//! against it.

use rusqlite::Connection;

use crate::domain::{ColumnValue, TableName};
use crate::error::AlmaError;

/// Metadata fields of `projects_data`, in storage order, as produced by the
/// column translator from the archive's query labels.
pub const PROJECT_COLUMNS: &[&str] = &[
    "project_code",
    "source_name",
    "ra",
    "dec",
    "galactic_longitude",
    "galactic_latitude",
    "band",
    "spatial_resolution",
    "frequency_resolution",
    "array",
    "mosaic",
    "integration",
    "release_date",
    "frequency_support",
    "velocity_resolution",
    "pol_products",
    "observation_date",
    "pi_name",
    "sb_name",
    "proposal_authors",
    "line_sensitivity",
    "continuum_sensitivity",
    "pwv",
    "group_ous_id",
    "member_ous_id",
    "asdm_uid",
    "project_title",
    "project_type",
    "scan_intent",
    "field_of_view",
    "largest_angular_scale",
    "qa2_status",
    "science_keyword",
    "scientific_category",
    "asa_project_code",
];

pub const RELEASE_DATE_FIELD: &str = "release_date";
pub const MEMBER_OUS_ID_FIELD: &str = "member_ous_id";

pub const LINK_COLUMNS: &[&str] = &["url", "uid", "size"];

/// Creates both tables when they do not exist yet. Ingestion never calls this.
pub fn provision(conn: &Connection) -> Result<(), AlmaError> {
    let metadata = PROJECT_COLUMNS
        .iter()
        .map(|name| format!("    \"{name}\" TEXT"))
        .collect::<Vec<_>>()
        .join(",\n");
    let projects = format!(
        "CREATE TABLE IF NOT EXISTS projects_data (\n    id_projects_data INTEGER PRIMARY KEY,\n{metadata}\n)"
    );
    conn.execute(&projects, [])
        .map_err(|err| AlmaError::Database(format!("create projects_data: {err}")))?;
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS links_list (
            id_link INTEGER PRIMARY KEY,
            url TEXT NOT NULL,
            uid TEXT NOT NULL,
            size REAL
        )
        "#,
        [],
    )
    .map_err(|err| AlmaError::Database(format!("create links_list: {err}")))?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_links_uid ON links_list(uid)",
        [],
    )
    .map_err(|err| AlmaError::Database(format!("create idx_links_uid: {err}")))?;
    Ok(())
}

/// Live column lists of a database that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    project_fields: Vec<String>,
    link_fields: Vec<String>,
}

impl Schema {
    pub fn load(conn: &Connection) -> Result<Self, AlmaError> {
        let project_fields = validated_fields(conn, TableName::ProjectsData, PROJECT_COLUMNS)?;
        let link_fields = validated_fields(conn, TableName::LinksList, LINK_COLUMNS)?;
        Ok(Self {
            project_fields,
            link_fields,
        })
    }

    pub fn fields(&self, table: TableName) -> &[String] {
        match table {
            TableName::ProjectsData => &self.project_fields,
            TableName::LinksList => &self.link_fields,
        }
    }

    /// Builds a named-column insert for `fields` after checking every name
    /// against the table. Columns the record lacks stay NULL.
    pub fn insert_statement(
        &self,
        table: TableName,
        fields: &[(String, ColumnValue)],
    ) -> Result<String, AlmaError> {
        let known = self.fields(table);
        if let Some((unknown, _)) = fields
            .iter()
            .find(|(name, _)| !known.iter().any(|column| column == name))
        {
            return Err(AlmaError::SchemaMismatch(format!(
                "{table} has no column `{unknown}`"
            )));
        }

        let mut columns = vec![quote(table.id_column())];
        columns.extend(fields.iter().map(|(name, _)| quote(name)));
        let placeholders = (1..=columns.len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        ))
    }
}

fn validated_fields(
    conn: &Connection,
    table: TableName,
    declared: &[&str],
) -> Result<Vec<String>, AlmaError> {
    let columns = table_columns(conn, table)?;
    if columns.is_empty() {
        return Err(AlmaError::SchemaMismatch(format!(
            "table {table} does not exist"
        )));
    }
    if !columns.iter().any(|name| name == table.id_column()) {
        return Err(AlmaError::SchemaMismatch(format!(
            "{table} is missing identifier column {}",
            table.id_column()
        )));
    }
    let missing = declared
        .iter()
        .filter(|name| !columns.iter().any(|column| column == *name))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(AlmaError::SchemaMismatch(format!(
            "{table} is missing columns: {}",
            missing.join(", ")
        )));
    }
    Ok(columns
        .into_iter()
        .filter(|name| name != table.id_column())
        .collect())
}

fn table_columns(conn: &Connection, table: TableName) -> Result<Vec<String>, AlmaError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|err| AlmaError::Database(err.to_string()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|err| AlmaError::Database(err.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| AlmaError::Database(err.to_string()))?;
    Ok(names)
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
