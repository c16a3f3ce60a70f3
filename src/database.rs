//! Database connection abstraction.
//!
//! The lease store talks to its database through the [`Connection`] trait:
//! catalog statements go in, affected-row counts and [`ResultSet`]s come
//! out. Parameters and column values travel as [`SqlValue`]s.
//!
//! Connections are configured with a [`ParameterMap`], usually parsed from
//! an access string such as `type=sqlite name=/var/lib/dhcp/leases.db`.

use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::{Dialect, TaggedStatement};
use crate::error::{Error, Result};

/// Connection parameters keyed by name (`type`, `name`, `host`, ...).
pub type ParameterMap = BTreeMap<String, String>;

/// Parses an access string of whitespace separated `key=value` tokens.
///
/// Values may be wrapped in single quotes to embed whitespace.
///
/// # Examples
///
/// ```
/// use dhcpstore::database::parse_access_string;
///
/// let params = parse_access_string("type=sqlite name=leases.db").unwrap();
/// assert_eq!(params["type"], "sqlite");
/// assert_eq!(params["name"], "leases.db");
/// ```
pub fn parse_access_string(access: &str) -> Result<ParameterMap> {
    let mut params = ParameterMap::new();
    let mut chars = access.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|&c| c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        if chars.next_if_eq(&'=').is_none() || key.is_empty() {
            return Err(Error::BadValue(format!(
                "access string token '{key}' is not of the form keyword=value"
            )));
        }

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\'') => break,
                    Some(c) => value.push(c),
                    None => {
                        return Err(Error::BadValue(format!(
                            "unterminated quoted value for '{key}'"
                        )));
                    }
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                value.push(c);
            }
        }

        params.insert(key, value);
    }

    Ok(params)
}

/// Renders `params` as an access string with the password hidden.
pub fn redacted_access_string(params: &ParameterMap) -> String {
    params
        .iter()
        .map(|(key, value)| {
            if key == "password" {
                format!("{key}=*****")
            } else if value.contains(char::is_whitespace) {
                format!("{key}='{value}'")
            } else {
                format!("{key}={value}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A statement parameter or a column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Bytes(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u16> for SqlValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u8> for SqlValue {
    fn from(value: u8) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

/// Ordered list of statement parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindArray {
    values: Vec<SqlValue>,
}

impl BindArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn add(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.values.push(value.into());
        self
    }

    pub fn add_null(&mut self) -> &mut Self {
        self.values.push(SqlValue::Null);
        self
    }

    /// Appends every parameter of `other`.
    pub fn extend(&mut self, other: BindArray) -> &mut Self {
        self.values.extend(other.values);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Renders the parameters one per line, for debug logging.
    pub fn to_text(&self) -> String {
        self.values
            .iter()
            .enumerate()
            .map(|(i, value)| format!("{i} : {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Rows returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Label of `col`, or a placeholder when the index is out of range.
    pub fn column_label(&self, col: usize) -> &str {
        self.columns
            .get(col)
            .map(String::as_str)
            .unwrap_or("<column out of range>")
    }

    /// Returns the value at (`row`, `col`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DbOperation`] if either index is out of range.
    pub fn value(&self, row: usize, col: usize) -> Result<&SqlValue> {
        self.rows
            .get(row)
            .ok_or_else(|| {
                Error::DbOperation(format!(
                    "row: {row}, out of range: 0..{}",
                    self.rows.len()
                ))
            })?
            .get(col)
            .ok_or_else(|| {
                Error::DbOperation(format!(
                    "column: {col}, out of range: 0..{}",
                    self.columns.len()
                ))
            })
    }
}

/// A live database session.
///
/// A connection is used by one thread at a time. Implementations return
/// [`Error::DuplicateEntry`] from [`execute`](Self::execute) when a row
/// violates a primary or unique key and [`Error::DbOperation`] for any
/// other failure.
pub trait Connection: Send {
    /// SQL dialect of the statements this connection accepts.
    fn dialect(&self) -> Dialect;

    /// Parameters the connection was opened with.
    fn parameters(&self) -> &ParameterMap;

    /// Looks up one connection parameter.
    fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters().get(name).map(String::as_str)
    }

    /// Compiles `statement` ahead of its first use.
    fn prepare(&self, statement: &TaggedStatement) -> Result<()>;

    /// Runs a data modification statement, returning the affected row count.
    fn execute(&self, statement: &TaggedStatement, binds: &BindArray) -> Result<u64>;

    /// Runs a query and collects its rows.
    fn query(&self, statement: &TaggedStatement, binds: &BindArray) -> Result<ResultSet>;

    /// Reads the `(major, minor)` schema version stored in the database.
    fn schema_version(&self) -> Result<(u32, u32)>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Version of the client library, for diagnostics.
    fn client_version(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_access_string() {
        let params =
            parse_access_string("type=sqlite  name=/tmp/leases.db password='s3cret pass'")
                .unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params["type"], "sqlite");
        assert_eq!(params["name"], "/tmp/leases.db");
        assert_eq!(params["password"], "s3cret pass");
    }

    #[test]
    fn test_parse_access_string_empty() {
        assert!(parse_access_string("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_access_string_rejects_bad_tokens() {
        assert!(matches!(
            parse_access_string("type=sqlite bogus"),
            Err(Error::BadValue(_))
        ));
        assert!(matches!(
            parse_access_string("=value"),
            Err(Error::BadValue(_))
        ));
        assert!(matches!(
            parse_access_string("password='open"),
            Err(Error::BadValue(_))
        ));
    }

    #[test]
    fn test_redacted_access_string_hides_password() {
        let params = parse_access_string("type=sqlite password=hunter2 user=kea").unwrap();
        let redacted = redacted_access_string(&params);
        assert!(!redacted.contains("hunter2"));
        assert_eq!(redacted, "password=***** type=sqlite user=kea");
    }

    #[test]
    fn test_bind_array_to_text() {
        let mut binds = BindArray::new();
        binds.add(7u32).add("abc").add(vec![0xde, 0xad]).add_null();
        assert_eq!(binds.len(), 4);
        assert_eq!(binds.to_text(), "0 : 7\n1 : 'abc'\n2 : 0xdead\n3 : NULL");
    }

    #[test]
    fn test_result_set_bounds() {
        let set = ResultSet {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec![SqlValue::Int(1), SqlValue::Null]],
        };
        assert_eq!(set.value(0, 0).unwrap(), &SqlValue::Int(1));
        assert!(set.value(0, 1).unwrap().is_null());
        assert!(matches!(set.value(1, 0), Err(Error::DbOperation(_))));
        assert!(matches!(set.value(0, 2), Err(Error::DbOperation(_))));
        assert_eq!(set.column_label(1), "b");
        assert_eq!(set.column_label(9), "<column out of range>");
    }
}
