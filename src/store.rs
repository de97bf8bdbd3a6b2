use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::config::ResolvedConfig;
use crate::domain::{ColumnValue, LinkEntry, MaskedArray, ProjectRecord, StagedLink, TableName};
use crate::error::AlmaError;
use crate::ids;
use crate::schema::{self, RELEASE_DATE_FIELD, Schema};

pub const DEFAULT_DATABASE: &str = ".db/alma.db";
pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/chiv-alma-downloader/";

/// Where the database file and the download cache live.
#[derive(Debug, Clone)]
pub struct Store {
    database_path: Utf8PathBuf,
    download_dir: Utf8PathBuf,
}

impl Store {
    pub fn new_with_paths(database_path: Utf8PathBuf, download_dir: Utf8PathBuf) -> Self {
        Self {
            database_path,
            download_dir,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new_with_paths(config.database.clone(), config.download_dir.clone())
    }

    pub fn database_path(&self) -> &Utf8Path {
        &self.database_path
    }

    pub fn download_dir(&self) -> &Utf8Path {
        &self.download_dir
    }

    /// Creates the tables if needed. Separate from [`Store::open`], which
    /// refuses a database that was never provisioned.
    pub fn provision(&self) -> Result<(), AlmaError> {
        if let Some(parent) = self.database_path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| AlmaError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(self.database_path.as_std_path())
            .map_err(|err| AlmaError::Database(format!("open {}: {err}", self.database_path)))?;
        schema::provision(&conn)
    }

    pub fn open(&self) -> Result<Database, AlmaError> {
        if !self.database_path.as_std_path().exists() {
            return Err(AlmaError::SchemaMismatch(format!(
                "database {} does not exist",
                self.database_path
            )));
        }
        let conn = Connection::open(self.database_path.as_std_path())
            .map_err(|err| AlmaError::Database(format!("open {}: {err}", self.database_path)))?;
        Database::from_connection(conn)
    }
}

/// An open connection whose schema has been validated. Dropping it closes the
/// connection; it is meant to live for one operation.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    schema: Schema,
}

impl Database {
    pub fn from_connection(conn: Connection) -> Result<Self, AlmaError> {
        let schema = Schema::load(&conn)?;
        Ok(Self { conn, schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn next_id(&self, table: TableName) -> Result<i64, AlmaError> {
        ids::next_id(&self.conn, table)
    }

    pub fn transaction(&mut self) -> Result<StoreTransaction<'_>, AlmaError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| AlmaError::Database(err.to_string()))?;
        Ok(StoreTransaction {
            tx,
            schema: &self.schema,
        })
    }

    /// Deletes every row of `table`, or of both tables when `None`.
    pub fn clear(&mut self, table: Option<TableName>) -> Result<Vec<TableName>, AlmaError> {
        let tables = match table {
            Some(table) => vec![table],
            None => TableName::ALL.to_vec(),
        };
        let tx = self
            .conn
            .transaction()
            .map_err(|err| AlmaError::Database(err.to_string()))?;
        for table in &tables {
            tx.execute(&format!("DELETE FROM {table}"), [])
                .map_err(|err| {
                    tracing::error!(%table, error = %err, "clear failed");
                    AlmaError::Database(format!("DELETE FROM {table}: {err}"))
                })?;
        }
        tx.commit()
            .map_err(|err| AlmaError::Database(err.to_string()))?;
        tracing::info!(tables = ?tables, "cleared store");
        Ok(tables)
    }

    pub fn projects(&self) -> Result<Vec<ProjectRecord>, AlmaError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM projects_data ORDER BY id_projects_data")
            .map_err(|err| AlmaError::Database(err.to_string()))?;
        let names = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let rows = stmt
            .query_map([], |row| {
                let mut id = 0;
                let mut fields = BTreeMap::new();
                for (idx, name) in names.iter().enumerate() {
                    if name == TableName::ProjectsData.id_column() {
                        id = row.get::<_, i64>(idx)?;
                        continue;
                    }
                    fields.insert(name.clone(), stored_value(row.get_ref(idx)?, idx)?);
                }
                Ok(ProjectRecord { id, fields })
            })
            .map_err(|err| AlmaError::Database(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| AlmaError::Database(err.to_string()))
    }

    pub fn links(&self) -> Result<Vec<LinkEntry>, AlmaError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id_link, url, uid, size FROM links_list ORDER BY id_link")
            .map_err(|err| AlmaError::Database(err.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LinkEntry {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    uid: row.get(2)?,
                    size: row.get::<_, Option<f64>>(3)?.unwrap_or_default(),
                })
            })
            .map_err(|err| AlmaError::Database(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| AlmaError::Database(err.to_string()))
    }

    /// Most recent release date across all projects, `None` when there are none.
    pub fn latest_release_date(&self) -> Result<Option<String>, AlmaError> {
        let sql = format!(
            "SELECT {RELEASE_DATE_FIELD} FROM projects_data \
             WHERE typeof({RELEASE_DATE_FIELD}) = 'text' \
             ORDER BY {RELEASE_DATE_FIELD} DESC LIMIT 1"
        );
        let result = self
            .conn
            .query_row(&sql, [], |row| row.get::<_, String>(0))
            .optional()
            .map_err(|err| AlmaError::Database(err.to_string()))?;
        Ok(result)
    }
}

/// Open write transaction. Rolls back when dropped without [`StoreTransaction::commit`].
pub struct StoreTransaction<'a> {
    tx: rusqlite::Transaction<'a>,
    schema: &'a Schema,
}

impl StoreTransaction<'_> {
    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    pub fn insert_project(
        &self,
        id: i64,
        fields: &[(String, ColumnValue)],
    ) -> Result<(), AlmaError> {
        let table = TableName::ProjectsData;
        let sql = self
            .schema
            .insert_statement(table, fields)
            .inspect_err(|err| tracing::error!(%table, id, error = %err, "insert rejected"))?;
        let mut values = Vec::with_capacity(fields.len() + 1);
        values.push(Value::Integer(id));
        for (_, value) in fields {
            values.push(sql_value(value)?);
        }
        self.tx
            .execute(&sql, params_from_iter(values))
            .map_err(|err| insert_failed(table, id, err))?;
        Ok(())
    }

    pub fn insert_link(&self, id: i64, link: &StagedLink) -> Result<(), AlmaError> {
        let table = TableName::LinksList;
        self.tx
            .execute(
                "INSERT INTO links_list (id_link, url, uid, size) VALUES (?1, ?2, ?3, ?4)",
                params![id, link.url, link.uid, link.size],
            )
            .map_err(|err| insert_failed(table, id, err))?;
        Ok(())
    }

    pub fn commit(self) -> Result<(), AlmaError> {
        self.tx
            .commit()
            .map_err(|err| AlmaError::Database(err.to_string()))
    }
}

fn insert_failed(table: TableName, id: i64, err: rusqlite::Error) -> AlmaError {
    tracing::error!(%table, id, error = %err, "insert failed");
    AlmaError::Insert {
        table: table.to_string(),
        message: err.to_string(),
    }
}

fn sql_value(value: &ColumnValue) -> Result<Value, AlmaError> {
    Ok(match value {
        ColumnValue::Null => Value::Null,
        ColumnValue::Text(text) => Value::Text(text.clone()),
        ColumnValue::Masked(array) => Value::Blob(array.to_bytes()?),
    })
}

fn stored_value(value: ValueRef<'_>, idx: usize) -> rusqlite::Result<ColumnValue> {
    Ok(match value {
        ValueRef::Null => ColumnValue::Null,
        ValueRef::Integer(number) => ColumnValue::Text(number.to_string()),
        ValueRef::Real(number) => ColumnValue::Text(number.to_string()),
        ValueRef::Text(bytes) => ColumnValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => ColumnValue::Masked(MaskedArray::from_bytes(bytes).map_err(
            |err| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Blob,
                    Box::new(err),
                )
            },
        )?),
    })
}
