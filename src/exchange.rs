//! Conversion between lease records and database rows.
//!
//! [`RowExchange`] turns a lease into the ordered parameter list of an
//! insert or update and rebuilds a lease from a result row. Parameter order
//! and result column order both follow [`LEASE4_COLUMNS`] and
//! [`LEASE6_COLUMNS`].
//!
//! Column readers accept values in two encodings: the text encoding used by
//! the PostgreSQL wire protocol (`"42"`, `"t"`, `\x0a0b`) and the natively
//! typed values returned by SQLite.

use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Local, Utc};
use serde_json::Value;

use crate::database::{BindArray, ResultSet, SqlValue};
use crate::error::{Error, Result};
use crate::lease::{
    ClientId, Duid, FIVE_HUNDRED_DAYS, HwAddr, INFINITY_LIFETIME, Lease4, Lease6, LeaseState,
    LeaseType,
};

/// Columns of the `lease4` table, in statement order.
pub const LEASE4_COLUMNS: [&str; 11] = [
    "address",
    "hwaddr",
    "client_id",
    "valid_lifetime",
    "expire",
    "subnet_id",
    "fqdn_fwd",
    "fqdn_rev",
    "hostname",
    "state",
    "user_context",
];

/// Columns of the `lease6` table, in statement order.
pub const LEASE6_COLUMNS: [&str; 17] = [
    "address",
    "duid",
    "valid_lifetime",
    "expire",
    "subnet_id",
    "pref_lifetime",
    "lease_type",
    "iaid",
    "prefix_len",
    "fqdn_fwd",
    "fqdn_rev",
    "hostname",
    "hwaddr",
    "hwtype",
    "hwaddr_source",
    "state",
    "user_context",
];

/// Largest expiration the schema can store (seconds since the epoch).
pub const MAX_DB_TIME: i64 = i32::MAX as i64;

/// Format of timestamps bound to statements, in local time.
pub const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders `cltt + valid_lifetime` as a database timestamp.
///
/// # Errors
///
/// Returns [`Error::BadValue`] if the expiration is past [`MAX_DB_TIME`].
pub fn to_database_time(cltt: DateTime<Utc>, valid_lifetime: u32) -> Result<String> {
    let expire = cltt.timestamp() + i64::from(valid_lifetime);
    if expire > MAX_DB_TIME {
        return Err(Error::BadValue(format!(
            "time value is too large: {expire}"
        )));
    }
    let expire = DateTime::from_timestamp(expire, 0)
        .ok_or_else(|| Error::BadValue(format!("time value is out of range: {expire}")))?;
    Ok(expire.with_timezone(&Local).format(DB_TIME_FORMAT).to_string())
}

/// Stores a `u32` IAID in a signed 32-bit column, keeping every bit.
pub fn iaid_to_db(iaid: u32) -> i32 {
    iaid as i32
}

/// Inverse of [`iaid_to_db`].
pub fn iaid_from_db(value: i32) -> u32 {
    value as u32
}

/// Lifetime used when deriving an expiration, with the infinite lifetime
/// replaced by a finite surrogate.
fn stored_lifetime(valid_lifetime: u32) -> u32 {
    if valid_lifetime == INFINITY_LIFETIME {
        FIVE_HUNDRED_DAYS
    } else {
        valid_lifetime
    }
}

/// Lease records that can be written to and read from a table row.
pub trait RowExchange: Sized {
    /// Table columns in statement order.
    const COLUMNS: &'static [&'static str];

    /// Builds the insert/update parameters for this lease.
    fn to_parameters(&self) -> Result<BindArray>;

    /// Rebuilds a lease from `row` of `set`.
    fn from_row(set: &ResultSet, row: usize) -> Result<Self>;

    /// Address of the lease, for diagnostics.
    fn address_text(&self) -> String;
}

/// Reason a column could not be read.
type Field<T> = std::result::Result<T, String>;

fn cell<'a>(set: &'a ResultSet, row: usize, col: usize) -> Field<&'a SqlValue> {
    set.value(row, col).map_err(|e| e.to_string())
}

fn column_error(set: &ResultSet, row: usize, col: usize, what: &str, value: &SqlValue) -> String {
    format!(
        "invalid {what} data: {value} for: {} in row: {row}",
        set.column_label(col)
    )
}

fn get_i64(set: &ResultSet, row: usize, col: usize) -> Field<i64> {
    let value = cell(set, row, col)?;
    match value {
        SqlValue::Int(i) => Ok(*i),
        SqlValue::Bool(b) => Ok(i64::from(*b)),
        SqlValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| column_error(set, row, col, "integer", value)),
        _ => Err(column_error(set, row, col, "integer", value)),
    }
}

fn get_int<T: TryFrom<i64>>(set: &ResultSet, row: usize, col: usize) -> Field<T> {
    let raw = get_i64(set, row, col)?;
    T::try_from(raw).map_err(|_| {
        format!(
            "value: {raw} is out of range for: {} in row: {row}",
            set.column_label(col)
        )
    })
}

fn get_bool(set: &ResultSet, row: usize, col: usize) -> Field<bool> {
    let value = cell(set, row, col)?;
    match value {
        SqlValue::Bool(b) => Ok(*b),
        SqlValue::Int(i) => Ok(*i != 0),
        SqlValue::Text(s) => match s.as_str() {
            "t" | "true" | "TRUE" | "1" => Ok(true),
            "f" | "false" | "FALSE" | "0" => Ok(false),
            _ => Err(column_error(set, row, col, "boolean", value)),
        },
        _ => Err(column_error(set, row, col, "boolean", value)),
    }
}

fn get_text(set: &ResultSet, row: usize, col: usize) -> Field<String> {
    let value = cell(set, row, col)?;
    match value {
        SqlValue::Null => Ok(String::new()),
        SqlValue::Text(s) => Ok(s.clone()),
        SqlValue::Int(i) => Ok(i.to_string()),
        SqlValue::Bool(b) => Ok(b.to_string()),
        SqlValue::Bytes(bytes) => String::from_utf8(bytes.clone())
            .map_err(|_| column_error(set, row, col, "text", value)),
    }
}

/// Decodes the PostgreSQL hex escape form of a bytea (`\x0a0b`).
fn decode_bytea(text: &str) -> Option<Vec<u8>> {
    let Some(hex) = text.strip_prefix("\\x") else {
        return Some(text.as_bytes().to_vec());
    };
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

fn get_bytes(set: &ResultSet, row: usize, col: usize, max_len: usize) -> Field<Vec<u8>> {
    let value = cell(set, row, col)?;
    let bytes = match value {
        SqlValue::Null => Vec::new(),
        SqlValue::Bytes(bytes) => bytes.clone(),
        SqlValue::Text(s) => {
            decode_bytea(s).ok_or_else(|| column_error(set, row, col, "bytea", value))?
        }
        _ => return Err(column_error(set, row, col, "bytea", value)),
    };
    if bytes.len() > max_len {
        return Err(format!(
            "{} length: {} exceeds maximum of: {max_len} in row: {row}",
            set.column_label(col),
            bytes.len()
        ));
    }
    Ok(bytes)
}

fn get_iaid(set: &ResultSet, row: usize, col: usize) -> Field<u32> {
    let raw = get_i64(set, row, col)?;
    if let Ok(signed) = i32::try_from(raw) {
        return Ok(iaid_from_db(signed));
    }
    u32::try_from(raw).map_err(|_| {
        format!(
            "iaid: {raw} is out of range for: {} in row: {row}",
            set.column_label(col)
        )
    })
}

/// Recovers the client last transaction time from a stored expiration.
///
/// The infinite lifetime itself is kept; only the expiration arithmetic
/// uses the surrogate.
fn cltt_from_expire(expire: i64, valid_lifetime: u32) -> Field<DateTime<Utc>> {
    let cltt = expire - i64::from(stored_lifetime(valid_lifetime));
    DateTime::from_timestamp(cltt, 0).ok_or_else(|| format!("invalid expire time: {expire}"))
}

fn user_context_to_text(context: Option<&Value>) -> Field<String> {
    match context {
        None => Ok(String::new()),
        Some(value) if value.is_object() => serde_json::to_string(value).map_err(|e| e.to_string()),
        Some(value) => Err(format!("user context '{value}' is not a JSON map")),
    }
}

fn user_context_from_text(text: &str) -> Field<Option<Value>> {
    if text.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(text)
        .map_err(|e| format!("user context '{text}' is not valid JSON: {e}"))?;
    if !value.is_object() {
        return Err(format!("user context '{text}' is not a JSON map"));
    }
    Ok(Some(value))
}

fn check_len(what: &str, len: usize, max_len: usize) -> Field<()> {
    if len > max_len {
        return Err(format!(
            "{what} length: {len} exceeds maximum allowed of: {max_len}"
        ));
    }
    Ok(())
}

const UNKNOWN_ADDRESS: &str = "<unknown>";

impl RowExchange for Lease4 {
    const COLUMNS: &'static [&'static str] = &LEASE4_COLUMNS;

    fn to_parameters(&self) -> Result<BindArray> {
        let conversion = |reason: String| Error::conversion(self.address, reason);
        let mut binds = BindArray::new();

        binds.add(u32::from(self.address));

        match &self.hwaddr {
            Some(hwaddr) if !hwaddr.bytes.is_empty() => {
                check_len("hardware address", hwaddr.bytes.len(), HwAddr::MAX_LEN)
                    .map_err(conversion)?;
                binds.add(hwaddr.bytes.as_slice());
            }
            _ => {
                binds.add(Vec::<u8>::new());
            }
        }

        match &self.client_id {
            Some(client_id) => {
                check_len("client identifier", client_id.0.len(), ClientId::MAX_LEN)
                    .map_err(conversion)?;
                binds.add(client_id.as_bytes());
            }
            None => {
                binds.add(Vec::<u8>::new());
            }
        }

        binds.add(self.valid_lifetime);
        let expire = to_database_time(self.cltt, stored_lifetime(self.valid_lifetime))
            .map_err(|e| conversion(e.to_string()))?;
        binds.add(expire);
        binds.add(self.subnet_id);
        binds.add(self.fqdn_fwd);
        binds.add(self.fqdn_rev);
        binds.add(self.hostname.as_str());
        binds.add(self.state.0);
        binds.add(user_context_to_text(self.user_context.as_ref()).map_err(conversion)?);

        Ok(binds)
    }

    fn from_row(set: &ResultSet, row: usize) -> Result<Self> {
        let raw_address: u32 =
            get_int(set, row, 0).map_err(|reason| Error::conversion(UNKNOWN_ADDRESS, reason))?;
        let address = Ipv4Addr::from(raw_address);
        let conversion = |reason: String| Error::conversion(address, reason);

        let hwaddr = get_bytes(set, row, 1, HwAddr::MAX_LEN).map_err(conversion)?;
        let client_id = get_bytes(set, row, 2, ClientId::MAX_LEN).map_err(conversion)?;
        let valid_lifetime: u32 = get_int(set, row, 3).map_err(conversion)?;
        let expire = get_i64(set, row, 4).map_err(conversion)?;
        let subnet_id = get_int(set, row, 5).map_err(conversion)?;
        let fqdn_fwd = get_bool(set, row, 6).map_err(conversion)?;
        let fqdn_rev = get_bool(set, row, 7).map_err(conversion)?;
        let hostname = get_text(set, row, 8).map_err(conversion)?;
        let state = get_int(set, row, 9).map_err(conversion)?;
        let user_context = get_text(set, row, 10)
            .and_then(|text| user_context_from_text(&text))
            .map_err(conversion)?;

        Ok(Lease4 {
            address,
            hwaddr: (!hwaddr.is_empty()).then(|| HwAddr::ether(hwaddr)),
            client_id: (!client_id.is_empty()).then(|| ClientId(client_id)),
            valid_lifetime,
            cltt: cltt_from_expire(expire, valid_lifetime).map_err(conversion)?,
            subnet_id,
            fqdn_fwd,
            fqdn_rev,
            hostname,
            state: LeaseState(state),
            user_context,
        })
    }

    fn address_text(&self) -> String {
        self.address.to_string()
    }
}

impl RowExchange for Lease6 {
    const COLUMNS: &'static [&'static str] = &LEASE6_COLUMNS;

    fn to_parameters(&self) -> Result<BindArray> {
        let conversion = |reason: String| Error::conversion(self.address, reason);
        let mut binds = BindArray::new();

        binds.add(self.address.to_string());
        check_len("DUID", self.duid.0.len(), Duid::MAX_LEN).map_err(conversion)?;
        binds.add(self.duid.as_bytes());
        binds.add(self.valid_lifetime);
        let expire = to_database_time(self.cltt, stored_lifetime(self.valid_lifetime))
            .map_err(|e| conversion(e.to_string()))?;
        binds.add(expire);
        binds.add(self.subnet_id);
        binds.add(self.preferred_lifetime);
        binds.add(self.lease_type as u32);
        binds.add(iaid_to_db(self.iaid));
        binds.add(self.prefix_len);
        binds.add(self.fqdn_fwd);
        binds.add(self.fqdn_rev);
        binds.add(self.hostname.as_str());

        match &self.hwaddr {
            Some(hwaddr) if !hwaddr.bytes.is_empty() => {
                check_len("hardware address", hwaddr.bytes.len(), HwAddr::MAX_LEN)
                    .map_err(conversion)?;
                binds.add(hwaddr.bytes.as_slice());
            }
            _ => {
                binds.add(Vec::<u8>::new());
            }
        }
        match &self.hwaddr {
            Some(hwaddr) => binds.add(hwaddr.htype).add(hwaddr.source),
            None => binds
                .add(HwAddr::HTYPE_UNDEFINED)
                .add(HwAddr::SOURCE_UNKNOWN),
        };

        binds.add(self.state.0);
        binds.add(user_context_to_text(self.user_context.as_ref()).map_err(conversion)?);

        Ok(binds)
    }

    fn from_row(set: &ResultSet, row: usize) -> Result<Self> {
        let address: Ipv6Addr = get_text(set, row, 0)
            .and_then(|text| {
                text.parse()
                    .map_err(|_| format!("invalid IPv6 address: '{text}' in row: {row}"))
            })
            .map_err(|reason| Error::conversion(UNKNOWN_ADDRESS, reason))?;
        let conversion = |reason: String| Error::conversion(address, reason);

        let duid = get_bytes(set, row, 1, Duid::MAX_LEN).map_err(conversion)?;
        let valid_lifetime: u32 = get_int(set, row, 2).map_err(conversion)?;
        let expire = get_i64(set, row, 3).map_err(conversion)?;
        let subnet_id = get_int(set, row, 4).map_err(conversion)?;
        let preferred_lifetime = get_int(set, row, 5).map_err(conversion)?;
        let raw_type: u32 = get_int(set, row, 6).map_err(conversion)?;
        let lease_type = LeaseType::try_from(raw_type)
            .map_err(|value| conversion(format!("invalid lease type: {value}")))?;
        let iaid = get_iaid(set, row, 7).map_err(conversion)?;
        let prefix_len = get_int(set, row, 8).map_err(conversion)?;
        let fqdn_fwd = get_bool(set, row, 9).map_err(conversion)?;
        let fqdn_rev = get_bool(set, row, 10).map_err(conversion)?;
        let hostname = get_text(set, row, 11).map_err(conversion)?;
        let hwaddr = get_bytes(set, row, 12, HwAddr::MAX_LEN).map_err(conversion)?;
        let htype = get_int(set, row, 13).map_err(conversion)?;
        let source = get_int(set, row, 14).map_err(conversion)?;
        let state = get_int(set, row, 15).map_err(conversion)?;
        let user_context = get_text(set, row, 16)
            .and_then(|text| user_context_from_text(&text))
            .map_err(conversion)?;

        Ok(Lease6 {
            address,
            lease_type,
            duid: Duid(duid),
            iaid,
            preferred_lifetime,
            valid_lifetime,
            cltt: cltt_from_expire(expire, valid_lifetime).map_err(conversion)?,
            subnet_id,
            fqdn_fwd,
            fqdn_rev,
            hostname,
            hwaddr: (!hwaddr.is_empty()).then_some(HwAddr {
                bytes: hwaddr,
                htype,
                source,
            }),
            prefix_len,
            state: LeaseState(state),
            user_context,
        })
    }

    fn address_text(&self) -> String {
        self.address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::now_seconds;
    use serde_json::json;

    /// Builds the result set a SELECT would return for the given binds,
    /// with the expiration turned back into epoch seconds.
    fn row_from_binds(columns: &[&str], binds: &BindArray, expire_col: usize, expire: i64) -> ResultSet {
        let mut row = binds.values().to_vec();
        row[expire_col] = SqlValue::Int(expire);
        ResultSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![row],
        }
    }

    fn sample_lease4() -> Lease4 {
        let mut lease = Lease4::new(
            Ipv4Addr::new(10, 0, 0, 5),
            Some(HwAddr::ether([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])),
            Some(ClientId(vec![1, 2, 3, 4])),
            3600,
            7,
        );
        lease.hostname = "host.example.org".to_string();
        lease.fqdn_fwd = true;
        lease.user_context = Some(json!({"comment": "x"}));
        lease
    }

    #[test]
    fn test_lease4_parameters_follow_columns() {
        let lease = sample_lease4();
        let binds = lease.to_parameters().unwrap();
        assert_eq!(binds.len(), LEASE4_COLUMNS.len());
        assert_eq!(binds.values()[0], SqlValue::Int(167_772_165));
        assert_eq!(binds.values()[3], SqlValue::Int(3600));
        assert_eq!(binds.values()[5], SqlValue::Int(7));
        assert_eq!(
            binds.values()[10],
            SqlValue::Text(r#"{"comment":"x"}"#.to_string())
        );
    }

    #[test]
    fn test_lease4_row_round_trip() {
        let lease = sample_lease4();
        let binds = lease.to_parameters().unwrap();
        let expire = lease.cltt.timestamp() + 3600;
        let set = row_from_binds(&LEASE4_COLUMNS, &binds, 4, expire);

        let read = Lease4::from_row(&set, 0).unwrap();
        assert_eq!(read, lease);
    }

    #[test]
    fn test_lease4_without_identifiers() {
        let lease = Lease4::new(Ipv4Addr::new(10, 0, 0, 6), None, None, 60, 1);
        let binds = lease.to_parameters().unwrap();
        assert_eq!(binds.values()[1], SqlValue::Bytes(Vec::new()));
        assert_eq!(binds.values()[2], SqlValue::Bytes(Vec::new()));
        assert_eq!(binds.values()[10], SqlValue::Text(String::new()));

        let set = row_from_binds(&LEASE4_COLUMNS, &binds, 4, lease.cltt.timestamp() + 60);
        let read = Lease4::from_row(&set, 0).unwrap();
        assert!(read.hwaddr.is_none());
        assert!(read.client_id.is_none());
        assert!(read.user_context.is_none());
    }

    #[test]
    fn test_infinite_lifetime_uses_surrogate() {
        let mut lease = sample_lease4();
        lease.valid_lifetime = INFINITY_LIFETIME;
        let binds = lease.to_parameters().unwrap();
        let expected = to_database_time(lease.cltt, FIVE_HUNDRED_DAYS).unwrap();
        assert_eq!(binds.values()[4], SqlValue::Text(expected));

        let expire = lease.cltt.timestamp() + i64::from(FIVE_HUNDRED_DAYS);
        let set = row_from_binds(&LEASE4_COLUMNS, &binds, 4, expire);
        let read = Lease4::from_row(&set, 0).unwrap();
        assert_eq!(read.cltt, lease.cltt);
        assert_eq!(read.valid_lifetime, INFINITY_LIFETIME);
    }

    #[test]
    fn test_expire_beyond_max_db_time_is_rejected() {
        let mut lease = sample_lease4();
        lease.cltt = DateTime::from_timestamp(MAX_DB_TIME - 10, 0).unwrap();
        let result = lease.to_parameters();
        assert!(matches!(result, Err(Error::DataConversion { .. })));
    }

    #[test]
    fn test_oversized_identifiers_are_rejected() {
        let mut lease = sample_lease4();
        lease.hwaddr = Some(HwAddr::ether(vec![0; HwAddr::MAX_LEN + 1]));
        assert!(matches!(
            lease.to_parameters(),
            Err(Error::DataConversion { ref address, .. }) if address == "10.0.0.5"
        ));

        let mut lease = sample_lease4();
        lease.client_id = Some(ClientId(vec![0; ClientId::MAX_LEN + 1]));
        assert!(lease.to_parameters().is_err());
    }

    #[test]
    fn test_non_map_user_context_is_rejected() {
        let mut lease = sample_lease4();
        lease.user_context = Some(json!([1, 2, 3]));
        assert!(lease.to_parameters().is_err());

        let lease = sample_lease4();
        let binds = lease.to_parameters().unwrap();
        let mut set = row_from_binds(&LEASE4_COLUMNS, &binds, 4, 0);
        set.rows[0][10] = SqlValue::Text("[1,2]".to_string());
        assert!(matches!(
            Lease4::from_row(&set, 0),
            Err(Error::DataConversion { .. })
        ));
        set.rows[0][10] = SqlValue::Text("{not json".to_string());
        assert!(Lease4::from_row(&set, 0).is_err());
    }

    #[test]
    fn test_lease4_from_text_row() {
        let set = ResultSet {
            columns: LEASE4_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: vec![vec![
                SqlValue::Text("3221225985".into()),
                SqlValue::Text("\\x010203040506".into()),
                SqlValue::Text("".into()),
                SqlValue::Text("3600".into()),
                SqlValue::Text("1700003600".into()),
                SqlValue::Text("1".into()),
                SqlValue::Text("t".into()),
                SqlValue::Text("f".into()),
                SqlValue::Text("myhost".into()),
                SqlValue::Text("0".into()),
                SqlValue::Text("".into()),
            ]],
        };
        let lease = Lease4::from_row(&set, 0).unwrap();
        assert_eq!(lease.address, Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(lease.hwaddr.unwrap().bytes, vec![1, 2, 3, 4, 5, 6]);
        assert!(lease.client_id.is_none());
        assert_eq!(lease.cltt.timestamp(), 1_700_000_000);
        assert!(lease.fqdn_fwd);
        assert!(!lease.fqdn_rev);
    }

    #[test]
    fn test_iaid_adapter_preserves_bits() {
        for iaid in [0, 1, 0x7fff_ffff, 0x8000_0000, u32::MAX] {
            assert_eq!(iaid_from_db(iaid_to_db(iaid)), iaid);
        }
        assert_eq!(iaid_to_db(u32::MAX), -1);
    }

    fn sample_lease6() -> Lease6 {
        let mut lease = Lease6::new(
            LeaseType::Pd,
            "2001:db8:1::".parse().unwrap(),
            Duid(vec![0, 1, 0, 1, 0xde, 0xad]),
            0xffff_fff0,
            1800,
            3600,
            11,
        );
        lease.prefix_len = 56;
        lease.hwaddr = Some(HwAddr {
            bytes: vec![1, 2, 3, 4, 5, 6],
            htype: 6,
            source: 4,
        });
        lease.cltt = now_seconds();
        lease
    }

    #[test]
    fn test_lease6_row_round_trip() {
        let lease = sample_lease6();
        let binds = lease.to_parameters().unwrap();
        assert_eq!(binds.len(), LEASE6_COLUMNS.len());
        assert_eq!(binds.values()[0], SqlValue::Text("2001:db8:1::".into()));
        assert_eq!(binds.values()[7], SqlValue::Int(-16));

        let set = row_from_binds(&LEASE6_COLUMNS, &binds, 3, lease.cltt.timestamp() + 3600);
        let read = Lease6::from_row(&set, 0).unwrap();
        assert_eq!(read, lease);
    }

    #[test]
    fn test_lease6_without_hwaddr() {
        let mut lease = sample_lease6();
        lease.hwaddr = None;
        let binds = lease.to_parameters().unwrap();
        assert_eq!(binds.values()[13], SqlValue::Int(0));
        assert_eq!(binds.values()[14], SqlValue::Int(0));

        let set = row_from_binds(&LEASE6_COLUMNS, &binds, 3, lease.cltt.timestamp() + 3600);
        assert!(Lease6::from_row(&set, 0).unwrap().hwaddr.is_none());
    }

    #[test]
    fn test_lease6_invalid_type_fails() {
        let lease = sample_lease6();
        let binds = lease.to_parameters().unwrap();
        let mut set = row_from_binds(&LEASE6_COLUMNS, &binds, 3, 0);
        set.rows[0][6] = SqlValue::Int(9);
        let err = Lease6::from_row(&set, 0).unwrap_err();
        assert!(err.to_string().contains("invalid lease type"));
    }

    #[test]
    fn test_lease6_oversized_duid_is_rejected() {
        let mut lease = sample_lease6();
        lease.duid = Duid(vec![0; Duid::MAX_LEN + 1]);
        assert!(matches!(
            lease.to_parameters(),
            Err(Error::DataConversion { .. })
        ));
    }
}
