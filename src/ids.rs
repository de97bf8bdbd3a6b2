use rusqlite::Connection;

use crate::domain::TableName;
use crate::error::AlmaError;

/// Returns `max(id) + 1` for `table`, or 1 when the table is empty.
pub fn next_id(conn: &Connection, table: TableName) -> Result<i64, AlmaError> {
    let sql = format!("SELECT MAX({}) FROM {table}", table.id_column());
    let max = conn
        .query_row(&sql, [], |row| row.get::<_, Option<i64>>(0))
        .map_err(|err| AlmaError::Database(format!("{sql}: {err}")))?;
    Ok(max.unwrap_or(0) + 1)
}

/// In-memory identifier counter for one ingestion run.
///
/// Seeded once from the store; later allocations never touch the store again.
/// Two runs against the same database at the same time will hand out the
/// same identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdAllocator {
    table: TableName,
    next: i64,
}

impl IdAllocator {
    pub fn seed(conn: &Connection, table: TableName) -> Result<Self, AlmaError> {
        let next = next_id(conn, table)?;
        tracing::debug!(%table, next, "seeded identifier allocator");
        Ok(Self { table, next })
    }

    pub fn table(&self) -> TableName {
        self.table
    }

    /// Identifier the next call to [`IdAllocator::allocate`] hands out.
    pub fn peek(&self) -> i64 {
        self.next
    }

    pub fn allocate(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::params;

    use super::*;
    use crate::schema;

    fn provisioned() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::provision(&conn).unwrap();
        conn
    }

    #[test]
    fn empty_table_starts_at_one() {
        let conn = provisioned();
        assert_eq!(next_id(&conn, TableName::ProjectsData).unwrap(), 1);
        assert_eq!(next_id(&conn, TableName::LinksList).unwrap(), 1);
    }

    #[test]
    fn continues_after_max() {
        let conn = provisioned();
        for id in [3_i64, 7, 5] {
            conn.execute(
                "INSERT INTO links_list (id_link, url, uid, size) VALUES (?1, ?2, ?3, ?4)",
                params![id, "https://example.org/a.tar", "uid://A1", 10.0],
            )
            .unwrap();
        }
        assert_eq!(next_id(&conn, TableName::LinksList).unwrap(), 8);
        assert_eq!(next_id(&conn, TableName::ProjectsData).unwrap(), 1);
    }

    #[test]
    fn allocator_counts_in_memory() {
        let conn = provisioned();
        let mut ids = IdAllocator::seed(&conn, TableName::ProjectsData).unwrap();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.peek(), 3);
        assert_eq!(ids.table(), TableName::ProjectsData);
    }
}
