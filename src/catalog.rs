//! Statement catalogs for the relational lease backend.
//!
//! A catalog is a fixed table with one entry per [`StatementIndex`]. Each
//! entry gives the parameter count, the parameter types, a symbolic name
//! used in diagnostics and the query text. Catalogs are process-wide
//! `static` data: they are never mutated and can be shared freely between
//! threads.
//!
//! The column order in every statement body matches the order the columns
//! occur in the table, and the order declared by
//! [`LEASE4_COLUMNS`](crate::exchange::LEASE4_COLUMNS) /
//! [`LEASE6_COLUMNS`](crate::exchange::LEASE6_COLUMNS). This does not apply
//! to WHERE clauses.
//!
//! Two dialects ship:
//!
//! - [`Dialect::PostgreSql`] - the statement texts of the PostgreSQL lease
//!   schema, byte for byte.
//! - [`Dialect::Sqlite`] - the same statements for the embedded SQLite
//!   backend.

use std::collections::BTreeSet;
use std::fmt;

use crate::database::SqlValue;
use crate::error::{Error, Result};

/// SQL dialect spoken by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    PostgreSql,
    Sqlite,
}

impl Dialect {
    /// Character introducing a numbered placeholder (`$1` or `?1`).
    pub fn placeholder_marker(self) -> char {
        match self {
            Self::PostgreSql => '$',
            Self::Sqlite => '?',
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostgreSql => f.write_str("postgresql"),
            Self::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Declared type of a statement parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int2,
    Int8,
    Bool,
    Varchar,
    Text,
    Bytea,
    Timestamp,
}

impl ParamType {
    /// Returns true if `value` may be bound to a parameter of this type.
    ///
    /// NULL binds to any type.
    pub fn accepts(self, value: &SqlValue) -> bool {
        matches!(
            (self, value),
            (_, SqlValue::Null)
                | (Self::Int2 | Self::Int8, SqlValue::Int(_))
                | (Self::Bool, SqlValue::Bool(_))
                | (Self::Varchar | Self::Text | Self::Timestamp, SqlValue::Text(_))
                | (Self::Bytea, SqlValue::Bytes(_))
        )
    }
}

/// Logical operations supported by the lease backend.
///
/// The discriminant is the position of the operation in every catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementIndex {
    DeleteLease4,
    DeleteLease4StateExpired,
    DeleteLease6,
    DeleteLease6StateExpired,
    GetLease4,
    GetLease4Addr,
    GetLease4ClientId,
    GetLease4ClientIdSubId,
    GetLease4HwAddr,
    GetLease4HwAddrSubId,
    GetLease4Page,
    GetLease4SubId,
    GetLease4Expire,
    GetLease6,
    GetLease6Addr,
    GetLease6DuidIaid,
    GetLease6DuidIaidSubId,
    GetLease6Page,
    GetLease6SubId,
    GetLease6Duid,
    GetLease6Expire,
    InsertLease4,
    InsertLease6,
    UpdateLease4,
    UpdateLease6,
    AllLease4Stats,
    SubnetLease4Stats,
    SubnetRangeLease4Stats,
    AllLease6Stats,
    SubnetLease6Stats,
    SubnetRangeLease6Stats,
}

/// Number of operations a catalog must define.
pub const NUM_STATEMENTS: usize = 31;

/// One catalog entry.
#[derive(Debug)]
pub struct TaggedStatement {
    pub index: StatementIndex,
    /// Number of parameters the text references.
    pub nbparams: usize,
    pub types: &'static [ParamType],
    /// Symbolic name used when preparing the statement and in diagnostics.
    pub name: &'static str,
    pub text: &'static str,
}

impl TaggedStatement {
    /// Verifies that `values` match this statement's parameter list.
    pub fn check_binding(&self, values: &[SqlValue]) -> Result<()> {
        if values.len() != self.nbparams {
            return Err(Error::DbOperation(format!(
                "statement {} expects {} parameters, {} bound",
                self.name,
                self.nbparams,
                values.len()
            )));
        }
        for (position, (param_type, value)) in self.types.iter().zip(values).enumerate() {
            if !param_type.accepts(value) {
                return Err(Error::DbOperation(format!(
                    "statement {} parameter ${} is {:?}, got {}",
                    self.name,
                    position + 1,
                    param_type,
                    value.kind()
                )));
            }
        }
        Ok(())
    }
}

/// Collects the placeholder numbers referenced by `text`.
fn placeholders(text: &str, marker: char) -> BTreeSet<usize> {
    let mut numbers = BTreeSet::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != marker {
            continue;
        }
        let mut digits = String::new();
        while let Some(&d) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(d);
            chars.next();
        }
        if let Ok(number) = digits.parse() {
            numbers.insert(number);
        }
    }
    numbers
}

/// A validated view over one dialect's statements.
#[derive(Debug, Clone, Copy)]
pub struct StatementCatalog {
    dialect: Dialect,
    statements: &'static [TaggedStatement],
}

impl StatementCatalog {
    /// Returns the validated catalog for `dialect`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the table is out of step with
    /// [`StatementIndex`].
    pub fn for_dialect(dialect: Dialect) -> Result<Self> {
        let statements = match dialect {
            Dialect::PostgreSql => PGSQL_STATEMENTS,
            Dialect::Sqlite => SQLITE_STATEMENTS,
        };
        Self::new(dialect, statements)
    }

    /// Validates an arbitrary statement table.
    pub fn new(dialect: Dialect, statements: &'static [TaggedStatement]) -> Result<Self> {
        if statements.len() != NUM_STATEMENTS {
            return Err(Error::SchemaMismatch(format!(
                "number of statements prepared: {} does not match expected count: {}",
                statements.len(),
                NUM_STATEMENTS
            )));
        }

        for (position, statement) in statements.iter().enumerate() {
            if statement.index as usize != position {
                return Err(Error::SchemaMismatch(format!(
                    "statement {} is at position {} but indexed as {:?}",
                    statement.name, position, statement.index
                )));
            }
            if statement.types.len() != statement.nbparams {
                return Err(Error::SchemaMismatch(format!(
                    "statement {} declares {} parameters but {} types",
                    statement.name,
                    statement.nbparams,
                    statement.types.len()
                )));
            }
            let referenced = placeholders(statement.text, dialect.placeholder_marker());
            let expected: BTreeSet<usize> = (1..=statement.nbparams).collect();
            if referenced != expected {
                return Err(Error::SchemaMismatch(format!(
                    "statement {} references placeholders {:?}, expected 1..={}",
                    statement.name, referenced, statement.nbparams
                )));
            }
        }

        Ok(Self {
            dialect,
            statements,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Returns the entry for `index`.
    pub fn get(&self, index: StatementIndex) -> &'static TaggedStatement {
        &self.statements[index as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static TaggedStatement> {
        self.statements.iter()
    }
}

use ParamType::{Bool, Bytea, Int2, Int8, Text, Timestamp, Varchar};
use StatementIndex as S;

/// Types of the columns written by an IPv4 insert/update, in column order.
const LEASE4_SEND_TYPES: [ParamType; 11] = [
    Int8, Bytea, Bytea, Int8, Timestamp, Int8, Bool, Bool, Varchar, Int8, Text,
];

/// Types of the columns written by an IPv6 insert/update, in column order.
const LEASE6_SEND_TYPES: [ParamType; 17] = [
    Varchar, Bytea, Int8, Timestamp, Int8, Int8, Int2, Int8, Int2, Bool, Bool, Varchar, Bytea,
    Int2, Int2, Int8, Text,
];

const UPDATE_LEASE4_TYPES: [ParamType; 12] = [
    Int8, Bytea, Bytea, Int8, Timestamp, Int8, Bool, Bool, Varchar, Int8, Text, Int8,
];

const UPDATE_LEASE6_TYPES: [ParamType; 18] = [
    Varchar, Bytea, Int8, Timestamp, Int8, Int8, Int2, Int8, Int2, Bool, Bool, Varchar, Bytea,
    Int2, Int2, Int8, Text, Varchar,
];

macro_rules! statement {
    ($index:expr, [$($ty:expr),*], $name:literal, $text:expr) => {
        TaggedStatement {
            index: $index,
            nbparams: <[ParamType]>::len(&[$($ty),*]),
            types: &[$($ty),*],
            name: $name,
            text: $text,
        }
    };
    ($index:expr, $types:expr, $name:literal, $text:expr) => {
        TaggedStatement {
            index: $index,
            nbparams: $types.len(),
            types: &$types,
            name: $name,
            text: $text,
        }
    };
}

/// PostgreSQL lease statements.
pub static PGSQL_STATEMENTS: &[TaggedStatement] = &[
    statement!(S::DeleteLease4, [Int8], "delete_lease4",
        "DELETE FROM lease4 WHERE address = $1"),
    statement!(S::DeleteLease4StateExpired, [Int8, Timestamp], "delete_lease4_state_expired",
        "DELETE FROM lease4 WHERE state = $1 AND expire < $2"),
    statement!(S::DeleteLease6, [Varchar], "delete_lease6",
        "DELETE FROM lease6 WHERE address = $1"),
    statement!(S::DeleteLease6StateExpired, [Int8, Timestamp], "delete_lease6_state_expired",
        "DELETE FROM lease6 WHERE state = $1 AND expire < $2"),
    statement!(S::GetLease4, [], "get_lease4",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, extract(epoch from expire)::bigint, subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, \
         state, user_context \
         FROM lease4"),
    statement!(S::GetLease4Addr, [Int8], "get_lease4_addr",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, extract(epoch from expire)::bigint, subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, \
         state, user_context \
         FROM lease4 \
         WHERE address = $1"),
    statement!(S::GetLease4ClientId, [Bytea], "get_lease4_clientid",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, extract(epoch from expire)::bigint, subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, \
         state, user_context \
         FROM lease4 \
         WHERE client_id = $1"),
    statement!(S::GetLease4ClientIdSubId, [Bytea, Int8], "get_lease4_clientid_subid",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, extract(epoch from expire)::bigint, subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, \
         state, user_context \
         FROM lease4 \
         WHERE client_id = $1 AND subnet_id = $2"),
    statement!(S::GetLease4HwAddr, [Bytea], "get_lease4_hwaddr",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, extract(epoch from expire)::bigint, subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, \
         state, user_context \
         FROM lease4 \
         WHERE hwaddr = $1"),
    statement!(S::GetLease4HwAddrSubId, [Bytea, Int8], "get_lease4_hwaddr_subid",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, extract(epoch from expire)::bigint, subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, \
         state, user_context \
         FROM lease4 \
         WHERE hwaddr = $1 AND subnet_id = $2"),
    statement!(S::GetLease4Page, [Int8, Int8], "get_lease4_page",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, extract(epoch from expire)::bigint, subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, \
         state, user_context \
         FROM lease4 \
         WHERE address > $1 \
         ORDER BY address \
         LIMIT $2"),
    statement!(S::GetLease4SubId, [Int8], "get_lease4_subid",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, extract(epoch from expire)::bigint, subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, \
         state, user_context \
         FROM lease4 \
         WHERE subnet_id = $1"),
    statement!(S::GetLease4Expire, [Int8, Timestamp, Int8], "get_lease4_expire",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, extract(epoch from expire)::bigint, subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, \
         state, user_context \
         FROM lease4 \
         WHERE state != $1 AND expire < $2 AND valid_lifetime != 4294967295 \
         ORDER BY expire \
         LIMIT $3"),
    statement!(S::GetLease6, [], "get_lease6",
        "SELECT address, duid, valid_lifetime, \
         extract(epoch from expire)::bigint, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, \
         state, user_context \
         FROM lease6"),
    statement!(S::GetLease6Addr, [Varchar, Int2], "get_lease6_addr",
        "SELECT address, duid, valid_lifetime, \
         extract(epoch from expire)::bigint, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, \
         state, user_context \
         FROM lease6 \
         WHERE address = $1 AND lease_type = $2"),
    statement!(S::GetLease6DuidIaid, [Bytea, Int8, Int2], "get_lease6_duid_iaid",
        "SELECT address, duid, valid_lifetime, \
         extract(epoch from expire)::bigint, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, \
         state, user_context \
         FROM lease6 \
         WHERE duid = $1 AND iaid = $2 AND lease_type = $3"),
    statement!(S::GetLease6DuidIaidSubId, [Int2, Bytea, Int8, Int8], "get_lease6_duid_iaid_subid",
        "SELECT address, duid, valid_lifetime, \
         extract(epoch from expire)::bigint, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, \
         state, user_context \
         FROM lease6 \
         WHERE lease_type = $1 \
         AND duid = $2 AND iaid = $3 AND subnet_id = $4"),
    statement!(S::GetLease6Page, [Varchar, Int8], "get_lease6_page",
        "SELECT address, duid, valid_lifetime, \
         extract(epoch from expire)::bigint, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, \
         state, user_context \
         FROM lease6 \
         WHERE address > $1 \
         ORDER BY address \
         LIMIT $2"),
    statement!(S::GetLease6SubId, [Int8], "get_lease6_subid",
        "SELECT address, duid, valid_lifetime, \
         extract(epoch from expire)::bigint, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, \
         state, user_context \
         FROM lease6 \
         WHERE subnet_id = $1"),
    statement!(S::GetLease6Duid, [Bytea], "get_lease6_duid",
        "SELECT address, duid, valid_lifetime, \
         extract(epoch from expire)::bigint, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, \
         state, user_context \
         FROM lease6 \
         WHERE duid = $1"),
    statement!(S::GetLease6Expire, [Int8, Timestamp, Int8], "get_lease6_expire",
        "SELECT address, duid, valid_lifetime, \
         extract(epoch from expire)::bigint, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, \
         fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, \
         state, user_context \
         FROM lease6 \
         WHERE state != $1 AND expire < $2 AND valid_lifetime != 4294967295 \
         ORDER BY expire \
         LIMIT $3"),
    statement!(S::InsertLease4, LEASE4_SEND_TYPES, "insert_lease4",
        "INSERT INTO lease4(address, hwaddr, client_id, \
         valid_lifetime, expire, subnet_id, fqdn_fwd, fqdn_rev, hostname, \
         state, user_context) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"),
    statement!(S::InsertLease6, LEASE6_SEND_TYPES, "insert_lease6",
        "INSERT INTO lease6(address, duid, valid_lifetime, \
         expire, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, \
         state, user_context) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"),
    statement!(S::UpdateLease4, UPDATE_LEASE4_TYPES, "update_lease4",
        "UPDATE lease4 SET address = $1, hwaddr = $2, \
         client_id = $3, valid_lifetime = $4, expire = $5, \
         subnet_id = $6, fqdn_fwd = $7, fqdn_rev = $8, hostname = $9, \
         state = $10, user_context = $11 \
         WHERE address = $12"),
    statement!(S::UpdateLease6, UPDATE_LEASE6_TYPES, "update_lease6",
        "UPDATE lease6 SET address = $1, duid = $2, \
         valid_lifetime = $3, expire = $4, subnet_id = $5, \
         pref_lifetime = $6, lease_type = $7, iaid = $8, \
         prefix_len = $9, fqdn_fwd = $10, fqdn_rev = $11, hostname = $12, \
         hwaddr = $13, hwtype = $14, hwaddr_source = $15, \
         state = $16, user_context = $17 \
         WHERE address = $18"),
    statement!(S::AllLease4Stats, [], "all_lease4_stats",
        "SELECT subnet_id, state, leases as state_count  \
         FROM lease4_stat ORDER BY subnet_id, state"),
    statement!(S::SubnetLease4Stats, [Int8], "subnet_lease4_stats",
        "SELECT subnet_id, state, leases as state_count  \
         FROM lease4_stat   \
         WHERE subnet_id = $1   \
         ORDER BY state"),
    statement!(S::SubnetRangeLease4Stats, [Int8, Int8], "subnet_range_lease4_stats",
        "SELECT subnet_id, state, leases as state_count  \
         FROM lease4_stat   \
         WHERE subnet_id >= $1 and subnet_id <= $2   \
         ORDER BY subnet_id, state"),
    statement!(S::AllLease6Stats, [], "all_lease6_stats",
        "SELECT subnet_id, lease_type, state, leases as state_count  \
         FROM lease6_stat ORDER BY subnet_id, lease_type, state"),
    statement!(S::SubnetLease6Stats, [Int8], "subnet_lease6_stats",
        "SELECT subnet_id, lease_type, state, leases as state_count  \
         FROM lease6_stat   \
         WHERE subnet_id = $1   \
         ORDER BY lease_type, state"),
    statement!(S::SubnetRangeLease6Stats, [Int8, Int8], "subnet_range_lease6_stats",
        "SELECT subnet_id, lease_type, state, leases as state_count  \
         FROM lease6_stat   \
         WHERE subnet_id >= $1 and subnet_id <= $2   \
         ORDER BY subnet_id, lease_type, state"),
];

/// SQLite lease statements.
///
/// Expiration is kept as local time text, as in the PostgreSQL schema, and
/// read back as seconds since the epoch.
pub static SQLITE_STATEMENTS: &[TaggedStatement] = &[
    statement!(S::DeleteLease4, [Int8], "delete_lease4",
        "DELETE FROM lease4 WHERE address = ?1"),
    statement!(S::DeleteLease4StateExpired, [Int8, Timestamp], "delete_lease4_state_expired",
        "DELETE FROM lease4 WHERE state = ?1 AND expire < ?2"),
    statement!(S::DeleteLease6, [Varchar], "delete_lease6",
        "DELETE FROM lease6 WHERE address = ?1"),
    statement!(S::DeleteLease6StateExpired, [Int8, Timestamp], "delete_lease6_state_expired",
        "DELETE FROM lease6 WHERE state = ?1 AND expire < ?2"),
    statement!(S::GetLease4, [], "get_lease4",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, state, user_context \
         FROM lease4"),
    statement!(S::GetLease4Addr, [Int8], "get_lease4_addr",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, state, user_context \
         FROM lease4 WHERE address = ?1"),
    statement!(S::GetLease4ClientId, [Bytea], "get_lease4_clientid",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, state, user_context \
         FROM lease4 WHERE client_id = ?1"),
    statement!(S::GetLease4ClientIdSubId, [Bytea, Int8], "get_lease4_clientid_subid",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, state, user_context \
         FROM lease4 WHERE client_id = ?1 AND subnet_id = ?2"),
    statement!(S::GetLease4HwAddr, [Bytea], "get_lease4_hwaddr",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, state, user_context \
         FROM lease4 WHERE hwaddr = ?1"),
    statement!(S::GetLease4HwAddrSubId, [Bytea, Int8], "get_lease4_hwaddr_subid",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, state, user_context \
         FROM lease4 WHERE hwaddr = ?1 AND subnet_id = ?2"),
    statement!(S::GetLease4Page, [Int8, Int8], "get_lease4_page",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, state, user_context \
         FROM lease4 WHERE address > ?1 ORDER BY address LIMIT ?2"),
    statement!(S::GetLease4SubId, [Int8], "get_lease4_subid",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, state, user_context \
         FROM lease4 WHERE subnet_id = ?1"),
    statement!(S::GetLease4Expire, [Int8, Timestamp, Int8], "get_lease4_expire",
        "SELECT address, hwaddr, client_id, \
         valid_lifetime, CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, \
         fqdn_fwd, fqdn_rev, hostname, state, user_context \
         FROM lease4 \
         WHERE state != ?1 AND expire < ?2 AND valid_lifetime != 4294967295 \
         ORDER BY expire LIMIT ?3"),
    statement!(S::GetLease6, [], "get_lease6",
        "SELECT address, duid, valid_lifetime, \
         CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, state, user_context \
         FROM lease6"),
    statement!(S::GetLease6Addr, [Varchar, Int2], "get_lease6_addr",
        "SELECT address, duid, valid_lifetime, \
         CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, state, user_context \
         FROM lease6 WHERE address = ?1 AND lease_type = ?2"),
    statement!(S::GetLease6DuidIaid, [Bytea, Int8, Int2], "get_lease6_duid_iaid",
        "SELECT address, duid, valid_lifetime, \
         CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, state, user_context \
         FROM lease6 WHERE duid = ?1 AND iaid = ?2 AND lease_type = ?3"),
    statement!(S::GetLease6DuidIaidSubId, [Int2, Bytea, Int8, Int8], "get_lease6_duid_iaid_subid",
        "SELECT address, duid, valid_lifetime, \
         CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, state, user_context \
         FROM lease6 \
         WHERE lease_type = ?1 AND duid = ?2 AND iaid = ?3 AND subnet_id = ?4"),
    statement!(S::GetLease6Page, [Varchar, Int8], "get_lease6_page",
        "SELECT address, duid, valid_lifetime, \
         CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, state, user_context \
         FROM lease6 WHERE address > ?1 ORDER BY address LIMIT ?2"),
    statement!(S::GetLease6SubId, [Int8], "get_lease6_subid",
        "SELECT address, duid, valid_lifetime, \
         CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, state, user_context \
         FROM lease6 WHERE subnet_id = ?1"),
    statement!(S::GetLease6Duid, [Bytea], "get_lease6_duid",
        "SELECT address, duid, valid_lifetime, \
         CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, state, user_context \
         FROM lease6 WHERE duid = ?1"),
    statement!(S::GetLease6Expire, [Int8, Timestamp, Int8], "get_lease6_expire",
        "SELECT address, duid, valid_lifetime, \
         CAST(strftime('%s', expire, 'utc') AS INTEGER), subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, state, user_context \
         FROM lease6 \
         WHERE state != ?1 AND expire < ?2 AND valid_lifetime != 4294967295 \
         ORDER BY expire LIMIT ?3"),
    statement!(S::InsertLease4, LEASE4_SEND_TYPES, "insert_lease4",
        "INSERT INTO lease4(address, hwaddr, client_id, \
         valid_lifetime, expire, subnet_id, fqdn_fwd, fqdn_rev, hostname, \
         state, user_context) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
    statement!(S::InsertLease6, LEASE6_SEND_TYPES, "insert_lease6",
        "INSERT INTO lease6(address, duid, valid_lifetime, \
         expire, subnet_id, pref_lifetime, \
         lease_type, iaid, prefix_len, fqdn_fwd, fqdn_rev, hostname, \
         hwaddr, hwtype, hwaddr_source, state, user_context) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"),
    statement!(S::UpdateLease4, UPDATE_LEASE4_TYPES, "update_lease4",
        "UPDATE lease4 SET address = ?1, hwaddr = ?2, \
         client_id = ?3, valid_lifetime = ?4, expire = ?5, \
         subnet_id = ?6, fqdn_fwd = ?7, fqdn_rev = ?8, hostname = ?9, \
         state = ?10, user_context = ?11 \
         WHERE address = ?12"),
    statement!(S::UpdateLease6, UPDATE_LEASE6_TYPES, "update_lease6",
        "UPDATE lease6 SET address = ?1, duid = ?2, \
         valid_lifetime = ?3, expire = ?4, subnet_id = ?5, \
         pref_lifetime = ?6, lease_type = ?7, iaid = ?8, \
         prefix_len = ?9, fqdn_fwd = ?10, fqdn_rev = ?11, hostname = ?12, \
         hwaddr = ?13, hwtype = ?14, hwaddr_source = ?15, \
         state = ?16, user_context = ?17 \
         WHERE address = ?18"),
    statement!(S::AllLease4Stats, [], "all_lease4_stats",
        "SELECT subnet_id, state, leases AS state_count \
         FROM lease4_stat ORDER BY subnet_id, state"),
    statement!(S::SubnetLease4Stats, [Int8], "subnet_lease4_stats",
        "SELECT subnet_id, state, leases AS state_count \
         FROM lease4_stat WHERE subnet_id = ?1 ORDER BY state"),
    statement!(S::SubnetRangeLease4Stats, [Int8, Int8], "subnet_range_lease4_stats",
        "SELECT subnet_id, state, leases AS state_count \
         FROM lease4_stat WHERE subnet_id >= ?1 AND subnet_id <= ?2 \
         ORDER BY subnet_id, state"),
    statement!(S::AllLease6Stats, [], "all_lease6_stats",
        "SELECT subnet_id, lease_type, state, leases AS state_count \
         FROM lease6_stat ORDER BY subnet_id, lease_type, state"),
    statement!(S::SubnetLease6Stats, [Int8], "subnet_lease6_stats",
        "SELECT subnet_id, lease_type, state, leases AS state_count \
         FROM lease6_stat WHERE subnet_id = ?1 ORDER BY lease_type, state"),
    statement!(S::SubnetRangeLease6Stats, [Int8, Int8], "subnet_range_lease6_stats",
        "SELECT subnet_id, lease_type, state, leases AS state_count \
         FROM lease6_stat WHERE subnet_id >= ?1 AND subnet_id <= ?2 \
         ORDER BY subnet_id, lease_type, state"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{LEASE4_COLUMNS, LEASE6_COLUMNS};

    /// Extracts the column list between `SELECT` and `FROM`, dropping the
    /// expression used to read the expiration.
    fn selected_columns(text: &str) -> Vec<String> {
        let start = text.find("SELECT ").unwrap() + "SELECT ".len();
        let end = text.find(" FROM").unwrap();
        text[start..end]
            .replace("extract(epoch from expire)::bigint", "expire")
            .replace("CAST(strftime('%s', expire, 'utc') AS INTEGER)", "expire")
            .split(", ")
            .map(|column| column.trim().to_string())
            .collect()
    }

    fn inserted_columns(text: &str) -> Vec<String> {
        let start = text.find('(').unwrap() + 1;
        let end = text.find(')').unwrap();
        text[start..end].split(',').map(|column| column.trim().to_string()).collect()
    }

    #[test]
    fn test_catalogs_validate() {
        for dialect in [Dialect::PostgreSql, Dialect::Sqlite] {
            let catalog = StatementCatalog::for_dialect(dialect).unwrap();
            assert_eq!(catalog.iter().count(), NUM_STATEMENTS);
            assert_eq!(catalog.get(S::UpdateLease6).nbparams, 18);
        }
    }

    #[test]
    fn test_short_catalog_is_rejected() {
        static SHORT: &[TaggedStatement] = &[statement!(S::DeleteLease4, [Int8], "delete_lease4",
            "DELETE FROM lease4 WHERE address = $1")];
        let result = StatementCatalog::new(Dialect::PostgreSql, SHORT);
        assert!(matches!(result, Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn test_misplaced_entry_is_rejected() {
        static SWAPPED: &[TaggedStatement] = &[
            statement!(S::DeleteLease4StateExpired, [Int8, Timestamp], "x", "$1 $2"),
            statement!(S::DeleteLease4, [Int8], "y", "$1"),
            statement!(S::DeleteLease6, [], "z", ""),
            statement!(S::DeleteLease6StateExpired, [], "z", ""),
            statement!(S::GetLease4, [], "z", ""),
            statement!(S::GetLease4Addr, [], "z", ""),
            statement!(S::GetLease4ClientId, [], "z", ""),
            statement!(S::GetLease4ClientIdSubId, [], "z", ""),
            statement!(S::GetLease4HwAddr, [], "z", ""),
            statement!(S::GetLease4HwAddrSubId, [], "z", ""),
            statement!(S::GetLease4Page, [], "z", ""),
            statement!(S::GetLease4SubId, [], "z", ""),
            statement!(S::GetLease4Expire, [], "z", ""),
            statement!(S::GetLease6, [], "z", ""),
            statement!(S::GetLease6Addr, [], "z", ""),
            statement!(S::GetLease6DuidIaid, [], "z", ""),
            statement!(S::GetLease6DuidIaidSubId, [], "z", ""),
            statement!(S::GetLease6Page, [], "z", ""),
            statement!(S::GetLease6SubId, [], "z", ""),
            statement!(S::GetLease6Duid, [], "z", ""),
            statement!(S::GetLease6Expire, [], "z", ""),
            statement!(S::InsertLease4, [], "z", ""),
            statement!(S::InsertLease6, [], "z", ""),
            statement!(S::UpdateLease4, [], "z", ""),
            statement!(S::UpdateLease6, [], "z", ""),
            statement!(S::AllLease4Stats, [], "z", ""),
            statement!(S::SubnetLease4Stats, [], "z", ""),
            statement!(S::SubnetRangeLease4Stats, [], "z", ""),
            statement!(S::AllLease6Stats, [], "z", ""),
            statement!(S::SubnetLease6Stats, [], "z", ""),
            statement!(S::SubnetRangeLease6Stats, [], "z", ""),
        ];
        let result = StatementCatalog::new(Dialect::PostgreSql, SWAPPED);
        assert!(matches!(result, Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn test_select_columns_follow_declared_order() {
        for dialect in [Dialect::PostgreSql, Dialect::Sqlite] {
            let catalog = StatementCatalog::for_dialect(dialect).unwrap();
            for statement in catalog.iter() {
                if !statement.name.starts_with("get_lease") {
                    continue;
                }
                let expected = if statement.name.starts_with("get_lease4") {
                    &LEASE4_COLUMNS[..]
                } else {
                    &LEASE6_COLUMNS[..]
                };
                assert_eq!(selected_columns(statement.text), expected, "{}", statement.name);
            }
        }
    }

    #[test]
    fn test_insert_columns_follow_declared_order() {
        for dialect in [Dialect::PostgreSql, Dialect::Sqlite] {
            let catalog = StatementCatalog::for_dialect(dialect).unwrap();
            assert_eq!(inserted_columns(catalog.get(S::InsertLease4).text), LEASE4_COLUMNS);
            assert_eq!(inserted_columns(catalog.get(S::InsertLease6).text), LEASE6_COLUMNS);
        }
    }

    #[test]
    fn test_pgsql_text_is_exact() {
        let catalog = StatementCatalog::for_dialect(Dialect::PostgreSql).unwrap();
        assert_eq!(
            catalog.get(S::GetLease4Page).text,
            "SELECT address, hwaddr, client_id, valid_lifetime, \
             extract(epoch from expire)::bigint, subnet_id, fqdn_fwd, fqdn_rev, \
             hostname, state, user_context FROM lease4 WHERE address > $1 \
             ORDER BY address LIMIT $2"
        );
        assert_eq!(
            catalog.get(S::SubnetLease4Stats).text,
            "SELECT subnet_id, state, leases as state_count  FROM lease4_stat   \
             WHERE subnet_id = $1   ORDER BY state"
        );
    }

    #[test]
    fn test_check_binding() {
        let catalog = StatementCatalog::for_dialect(Dialect::Sqlite).unwrap();
        let statement = catalog.get(S::GetLease4ClientIdSubId);
        assert!(
            statement
                .check_binding(&[SqlValue::Bytes(vec![1, 2]), SqlValue::Int(4)])
                .is_ok()
        );
        assert!(statement.check_binding(&[SqlValue::Bytes(vec![1, 2])]).is_err());
        assert!(
            statement
                .check_binding(&[SqlValue::Text("x".into()), SqlValue::Int(4)])
                .is_err()
        );
    }
}
