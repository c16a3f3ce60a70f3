//! Embedded SQLite implementation of [`Connection`].
//!
//! The database file is named by the `name` connection parameter; the name
//! `:memory:` opens a private in-memory database that is created with the
//! lease schema already in place. On-disk databases are initialized with
//! [`SqliteConnection::create_schema`].

use std::time::Duration;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{ErrorCode, OpenFlags, params_from_iter};
use tracing::{debug, info};

use crate::catalog::{Dialect, NUM_STATEMENTS, TaggedStatement};
use crate::database::{BindArray, Connection, ParameterMap, ResultSet, SqlValue};
use crate::error::{Error, Result};

/// Name that selects an in-memory database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Lease schema, version 6.0.
///
/// Expirations are stored as local time text, the same as the timestamps
/// bound to statements. The statistics views aggregate on read.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY NOT NULL,
    minor INTEGER
);
INSERT INTO schema_version (version, minor)
    SELECT 6, 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version);

CREATE TABLE IF NOT EXISTS lease4 (
    address INTEGER PRIMARY KEY NOT NULL,
    hwaddr BLOB,
    client_id BLOB,
    valid_lifetime INTEGER,
    expire TEXT,
    subnet_id INTEGER,
    fqdn_fwd BOOLEAN,
    fqdn_rev BOOLEAN,
    hostname TEXT,
    state INTEGER DEFAULT 0,
    user_context TEXT
);
CREATE INDEX IF NOT EXISTS lease4_by_hwaddr_subnet_id ON lease4 (hwaddr, subnet_id);
CREATE INDEX IF NOT EXISTS lease4_by_client_id_subnet_id ON lease4 (client_id, subnet_id);
CREATE INDEX IF NOT EXISTS lease4_by_subnet_id ON lease4 (subnet_id);
CREATE INDEX IF NOT EXISTS lease4_by_state_expire ON lease4 (state ASC, expire ASC);

CREATE TABLE IF NOT EXISTS lease6 (
    address TEXT PRIMARY KEY NOT NULL,
    duid BLOB,
    valid_lifetime INTEGER,
    expire TEXT,
    subnet_id INTEGER,
    pref_lifetime INTEGER,
    lease_type INTEGER,
    iaid INTEGER,
    prefix_len INTEGER,
    fqdn_fwd BOOLEAN,
    fqdn_rev BOOLEAN,
    hostname TEXT,
    hwaddr BLOB,
    hwtype INTEGER,
    hwaddr_source INTEGER,
    state INTEGER DEFAULT 0,
    user_context TEXT
);
CREATE INDEX IF NOT EXISTS lease6_by_duid_iaid_type ON lease6 (duid, iaid, lease_type);
CREATE INDEX IF NOT EXISTS lease6_by_subnet_id ON lease6 (subnet_id);
CREATE INDEX IF NOT EXISTS lease6_by_state_expire ON lease6 (state ASC, expire ASC);

CREATE VIEW IF NOT EXISTS lease4_stat AS
    SELECT subnet_id, state, COUNT(*) AS leases
    FROM lease4 GROUP BY subnet_id, state;
CREATE VIEW IF NOT EXISTS lease6_stat AS
    SELECT subnet_id, lease_type, state, COUNT(*) AS leases
    FROM lease6 GROUP BY subnet_id, lease_type, state;
";

/// Maps a rusqlite failure onto the error taxonomy.
fn operation_error(statement: &TaggedStatement, err: rusqlite::Error) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(e, message) if e.code == ErrorCode::ConstraintViolation => {
            Error::DuplicateEntry(format!(
                "{}: {}",
                statement.name,
                message.unwrap_or_else(|| e.to_string())
            ))
        }
        other => Error::DbOperation(format!("{}: {}", statement.name, other)),
    }
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bytes(bytes) => Value::Blob(bytes.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Text(f.to_string()),
        ValueRef::Text(text) => SqlValue::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Bytes(bytes.to_vec()),
    }
}

/// A connection to an SQLite lease database.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    parameters: ParameterMap,
}

impl SqliteConnection {
    /// Opens the database named by the `name` parameter.
    ///
    /// Honors `connect-timeout` (seconds to wait on a locked database) and
    /// `readonly`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DbOpen`] if `name` is missing or the database
    /// cannot be opened.
    pub fn open(parameters: ParameterMap) -> Result<Self> {
        let name = parameters
            .get("name")
            .cloned()
            .ok_or_else(|| Error::DbOpen("mandatory 'name' parameter not specified".into()))?;

        let conn = if name == MEMORY_DATABASE {
            rusqlite::Connection::open_in_memory()
        } else {
            let flags = if parameters.get("readonly").is_some_and(|v| v == "true") {
                OpenFlags::SQLITE_OPEN_READ_ONLY
            } else {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            };
            rusqlite::Connection::open_with_flags(&name, flags | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        }
        .map_err(|e| Error::DbOpen(format!("{name}: {e}")))?;

        if let Some(timeout) = parameters.get("connect-timeout") {
            let seconds: u64 = timeout.parse().map_err(|_| {
                Error::DbOpen(format!("invalid connect-timeout value: {timeout}"))
            })?;
            conn.busy_timeout(Duration::from_secs(seconds))
                .map_err(|e| Error::DbOpen(e.to_string()))?;
        }
        conn.set_prepared_statement_cache_capacity(NUM_STATEMENTS * 2);

        let connection = Self { conn, parameters };
        if name == MEMORY_DATABASE {
            connection.create_schema()?;
        }

        info!("Opened SQLite lease database {}", name);
        Ok(connection)
    }

    /// Opens a private in-memory database with the schema in place.
    pub fn open_in_memory() -> Result<Self> {
        let mut parameters = ParameterMap::new();
        parameters.insert("type".into(), "sqlite".into());
        parameters.insert("name".into(), MEMORY_DATABASE.into());
        Self::open(parameters)
    }

    /// Creates the lease tables, indexes and views if they do not exist.
    pub fn create_schema(&self) -> Result<()> {
        self.execute_batch(SCHEMA)?;
        debug!("Lease schema is in place");
        Ok(())
    }

    /// Runs raw SQL outside of the statement catalog.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| Error::DbOperation(e.to_string()))
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    fn prepare(&self, statement: &TaggedStatement) -> Result<()> {
        self.conn
            .prepare_cached(statement.text)
            .map(|_| ())
            .map_err(|e| operation_error(statement, e))
    }

    fn execute(&self, statement: &TaggedStatement, binds: &BindArray) -> Result<u64> {
        statement.check_binding(binds.values())?;
        debug!(statement = statement.name, "execute");

        let mut stmt = self
            .conn
            .prepare_cached(statement.text)
            .map_err(|e| operation_error(statement, e))?;
        let affected = stmt
            .execute(params_from_iter(binds.values().iter().map(to_sqlite)))
            .map_err(|e| operation_error(statement, e))?;
        Ok(affected as u64)
    }

    fn query(&self, statement: &TaggedStatement, binds: &BindArray) -> Result<ResultSet> {
        statement.check_binding(binds.values())?;
        debug!(statement = statement.name, "query");

        let mut stmt = self
            .conn
            .prepare_cached(statement.text)
            .map_err(|e| operation_error(statement, e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(params_from_iter(binds.values().iter().map(to_sqlite)))
            .map_err(|e| operation_error(statement, e))?;
        let mut result = ResultSet {
            columns,
            rows: Vec::new(),
        };
        while let Some(row) = rows.next().map_err(|e| operation_error(statement, e))? {
            let mut values = Vec::with_capacity(result.columns.len());
            for col in 0..result.columns.len() {
                let value = row.get_ref(col).map_err(|e| operation_error(statement, e))?;
                values.push(from_sqlite(value));
            }
            result.rows.push(values);
        }
        Ok(result)
    }

    fn schema_version(&self) -> Result<(u32, u32)> {
        self.conn
            .query_row("SELECT version, minor FROM schema_version", [], |row| {
                Ok((row.get(0)?, row.get::<_, Option<u32>>(1)?.unwrap_or(0)))
            })
            .map_err(|e| Error::DbOpen(format!("unable to read schema version: {e}")))
    }

    fn begin(&self) -> Result<()> {
        self.execute_batch("BEGIN")
    }

    fn commit(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.execute_batch("COMMIT")
    }

    fn rollback(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.execute_batch("ROLLBACK")
    }

    fn client_version(&self) -> String {
        format!("SQLite {}", rusqlite::version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StatementCatalog, StatementIndex};

    #[test]
    fn test_in_memory_has_schema() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        assert_eq!(conn.schema_version().unwrap(), (6, 0));
        assert_eq!(conn.dialect(), Dialect::Sqlite);
        assert_eq!(conn.parameter("name"), Some(MEMORY_DATABASE));
    }

    #[test]
    fn test_missing_name_fails() {
        let result = SqliteConnection::open(ParameterMap::new());
        assert!(matches!(result, Err(Error::DbOpen(_))));
    }

    #[test]
    fn test_every_statement_prepares() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        let catalog = StatementCatalog::for_dialect(Dialect::Sqlite).unwrap();
        for statement in catalog.iter() {
            conn.prepare(statement).unwrap();
        }
    }

    #[test]
    fn test_duplicate_key_maps_to_duplicate_entry() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        let catalog = StatementCatalog::for_dialect(Dialect::Sqlite).unwrap();
        let insert = catalog.get(StatementIndex::InsertLease4);

        let mut binds = BindArray::new();
        binds
            .add(1u32)
            .add(Vec::<u8>::new())
            .add(Vec::<u8>::new())
            .add(60u32)
            .add("2024-01-01 00:00:00")
            .add(1u32)
            .add(false)
            .add(false)
            .add("")
            .add(0u32)
            .add("");

        assert_eq!(conn.execute(insert, &binds).unwrap(), 1);
        assert!(matches!(
            conn.execute(insert, &binds),
            Err(Error::DuplicateEntry(_))
        ));
    }

    #[test]
    fn test_commit_without_transaction_is_noop() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.commit().unwrap();
        conn.rollback().unwrap();
        conn.begin().unwrap();
        conn.rollback().unwrap();
    }
}
