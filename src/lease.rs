//! Lease records persisted by the lease store.
//!
//! A lease is a time-bounded grant of an address to a client. This module
//! holds the IPv4 and IPv6 lease records together with the identifiers that
//! key them:
//!
//! - [`HwAddr`] - hardware (MAC) address with its type and source
//! - [`ClientId`] - DHCPv4 client identifier (Option 61)
//! - [`Duid`] - DHCPv6 unique identifier
//!
//! Identifier lengths are bounded. The bounds are enforced where a record
//! crosses into or out of a backend, so oversized values are rejected
//! instead of being truncated.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a subnet in the server configuration.
pub type SubnetId = u32;

/// Valid lifetime value meaning "never expires".
pub const INFINITY_LIFETIME: u32 = u32::MAX;

/// Lifetime used instead of [`INFINITY_LIFETIME`] when computing a stored
/// expiration (500 days), so the timestamp does not overflow.
pub const FIVE_HUNDRED_DAYS: u32 = 500 * 24 * 60 * 60;

/// Encodes bytes as a colon-separated hex string.
fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parses a colon or dash separated hex string.
fn from_hex(text: &str) -> Result<Vec<u8>> {
    let normalized = text.trim().to_lowercase().replace('-', ":");
    if normalized.is_empty() {
        return Ok(Vec::new());
    }
    normalized
        .split(':')
        .map(|part| {
            u8::from_str_radix(part, 16)
                .map_err(|_| Error::BadValue(format!("invalid hex identifier '{}'", text)))
        })
        .collect()
}

/// Hardware address of a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HwAddr {
    /// Raw address bytes.
    pub bytes: Vec<u8>,
    /// Hardware type (1 for Ethernet).
    pub htype: u16,
    /// Where the address was learned from.
    pub source: u32,
}

impl HwAddr {
    /// Longest hardware address a backend accepts.
    pub const MAX_LEN: usize = 20;
    /// Ethernet hardware type.
    pub const HTYPE_ETHER: u16 = 1;
    /// Hardware type is unknown.
    pub const HTYPE_UNDEFINED: u16 = 0;
    /// The source of the hardware address is unknown.
    pub const SOURCE_UNKNOWN: u32 = 0;

    /// Creates an Ethernet hardware address of unknown source.
    pub fn ether(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            htype: Self::HTYPE_ETHER,
            source: Self::SOURCE_UNKNOWN,
        }
    }

    /// Parses an Ethernet address such as `aa:bb:cc:dd:ee:ff`.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(Self::ether(from_hex(text)?))
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hwtype={} {}", self.htype, to_hex(&self.bytes))
    }
}

/// DHCPv4 client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Vec<u8>);

impl ClientId {
    /// Longest client identifier a backend accepts.
    pub const MAX_LEN: usize = 128;

    /// Parses a client identifier such as `01:aa:bb:cc:dd:ee:ff`.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(Self(from_hex(text)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

/// DHCPv6 unique identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duid(pub Vec<u8>);

impl Duid {
    /// Longest DUID a backend accepts.
    pub const MAX_LEN: usize = 128;

    /// Parses a DUID such as `00:01:00:01:aa:bb`.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(Self(from_hex(text)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Duid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

/// Kind of a DHCPv6 lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LeaseType {
    /// Non-temporary address.
    Na = 0,
    /// Temporary address.
    Ta = 1,
    /// Delegated prefix.
    Pd = 2,
}

impl TryFrom<u32> for LeaseType {
    type Error = u32;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Na),
            1 => Ok(Self::Ta),
            2 => Ok(Self::Pd),
            other => Err(other),
        }
    }
}

impl fmt::Display for LeaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Na => "IA_NA",
            Self::Ta => "IA_TA",
            Self::Pd => "IA_PD",
        };
        f.write_str(name)
    }
}

/// State of a lease.
///
/// Backends carry the numeric value through unchanged, so states other
/// than the named ones survive a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeaseState(pub u32);

impl LeaseState {
    /// Lease is assigned to a client.
    pub const DEFAULT: Self = Self(0);
    /// Client reported the address as in use by someone else.
    pub const DECLINED: Self = Self(1);
    /// Lease expired and has already been processed for cleanup.
    pub const EXPIRED_RECLAIMED: Self = Self(2);
}

impl Default for LeaseState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DEFAULT => f.write_str("default"),
            Self::DECLINED => f.write_str("declined"),
            Self::EXPIRED_RECLAIMED => f.write_str("expired-reclaimed"),
            Self(other) => write!(f, "unknown({})", other),
        }
    }
}

/// Current time truncated to whole seconds, the precision backends keep.
pub fn now_seconds() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn expiration_of(cltt: DateTime<Utc>, valid_lifetime: u32) -> Option<DateTime<Utc>> {
    if valid_lifetime == INFINITY_LIFETIME {
        return None;
    }
    Some(cltt + TimeDelta::seconds(valid_lifetime as i64))
}

/// An IPv4 lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease4 {
    /// The leased address. Sole primary key.
    pub address: Ipv4Addr,
    /// Hardware address of the client, if known.
    pub hwaddr: Option<HwAddr>,
    /// Client identifier (Option 61), if the client sent one.
    pub client_id: Option<ClientId>,
    /// Valid lifetime in seconds, or [`INFINITY_LIFETIME`].
    pub valid_lifetime: u32,
    /// Client last transaction time.
    pub cltt: DateTime<Utc>,
    /// Subnet the lease belongs to.
    pub subnet_id: SubnetId,
    /// Forward DNS update performed.
    pub fqdn_fwd: bool,
    /// Reverse DNS update performed.
    pub fqdn_rev: bool,
    /// Client hostname, empty when unknown.
    pub hostname: String,
    pub state: LeaseState,
    /// Opaque user context. Must be a JSON map when present.
    pub user_context: Option<serde_json::Value>,
}

impl Lease4 {
    /// Creates a lease whose last transaction time is now.
    pub fn new(
        address: Ipv4Addr,
        hwaddr: Option<HwAddr>,
        client_id: Option<ClientId>,
        valid_lifetime: u32,
        subnet_id: SubnetId,
    ) -> Self {
        Self {
            address,
            hwaddr,
            client_id,
            valid_lifetime,
            cltt: now_seconds(),
            subnet_id,
            fqdn_fwd: false,
            fqdn_rev: false,
            hostname: String::new(),
            state: LeaseState::DEFAULT,
            user_context: None,
        }
    }

    /// Returns when the lease expires, or `None` for an infinite lease.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        expiration_of(self.cltt, self.valid_lifetime)
    }

    /// Returns true if the lease has expired.
    pub fn is_expired(&self) -> bool {
        self.expiration().is_some_and(|expires| Utc::now() > expires)
    }

    /// Returns seconds remaining until expiration, or 0 if expired.
    pub fn remaining_seconds(&self) -> i64 {
        match self.expiration() {
            Some(expires) => (expires - Utc::now()).num_seconds().max(0),
            None => i64::MAX,
        }
    }
}

/// An IPv6 lease (address or delegated prefix).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease6 {
    /// The leased address or prefix. Sole primary key.
    pub address: Ipv6Addr,
    pub lease_type: LeaseType,
    /// DUID of the client. Always present for IPv6 leases.
    pub duid: Duid,
    /// Identity association identifier.
    pub iaid: u32,
    /// Preferred lifetime in seconds.
    pub preferred_lifetime: u32,
    /// Valid lifetime in seconds, or [`INFINITY_LIFETIME`].
    pub valid_lifetime: u32,
    /// Client last transaction time.
    pub cltt: DateTime<Utc>,
    pub subnet_id: SubnetId,
    pub fqdn_fwd: bool,
    pub fqdn_rev: bool,
    pub hostname: String,
    /// Hardware address of the client, if known.
    pub hwaddr: Option<HwAddr>,
    /// Prefix length; 128 for addresses.
    pub prefix_len: u8,
    pub state: LeaseState,
    /// Opaque user context. Must be a JSON map when present.
    pub user_context: Option<serde_json::Value>,
}

impl Lease6 {
    /// Creates a lease whose last transaction time is now.
    pub fn new(
        lease_type: LeaseType,
        address: Ipv6Addr,
        duid: Duid,
        iaid: u32,
        preferred_lifetime: u32,
        valid_lifetime: u32,
        subnet_id: SubnetId,
    ) -> Self {
        Self {
            address,
            lease_type,
            duid,
            iaid,
            preferred_lifetime,
            valid_lifetime,
            cltt: now_seconds(),
            subnet_id,
            fqdn_fwd: false,
            fqdn_rev: false,
            hostname: String::new(),
            hwaddr: None,
            prefix_len: 128,
            state: LeaseState::DEFAULT,
            user_context: None,
        }
    }

    /// Returns when the lease expires, or `None` for an infinite lease.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        expiration_of(self.cltt, self.valid_lifetime)
    }

    /// Returns true if the lease has expired.
    pub fn is_expired(&self) -> bool {
        self.expiration().is_some_and(|expires| Utc::now() > expires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease4_expiration() {
        let lease = Lease4::new(Ipv4Addr::new(192, 0, 2, 1), None, None, 3600, 1);
        assert!(!lease.is_expired());
        assert!(lease.remaining_seconds() > 3500);

        let mut expired = lease.clone();
        expired.cltt = Utc::now() - TimeDelta::seconds(3601);
        assert!(expired.is_expired());
        assert_eq!(expired.remaining_seconds(), 0);
    }

    #[test]
    fn test_infinite_lease_never_expires() {
        let mut lease = Lease4::new(Ipv4Addr::new(192, 0, 2, 1), None, None, INFINITY_LIFETIME, 1);
        lease.cltt = Utc::now() - TimeDelta::days(1000);
        assert!(lease.expiration().is_none());
        assert!(!lease.is_expired());
    }

    #[test]
    fn test_cltt_has_whole_seconds() {
        let lease = Lease6::new(
            LeaseType::Na,
            "2001:db8::1".parse().unwrap(),
            Duid(vec![0, 1, 2, 3]),
            7,
            1800,
            3600,
            1,
        );
        assert_eq!(lease.cltt.timestamp_subsec_nanos(), 0);
        assert_eq!(lease.prefix_len, 128);
    }

    #[test]
    fn test_identifier_text_roundtrip() {
        let hwaddr = HwAddr::from_text("AA-BB-cc:dd:ee:ff").unwrap();
        assert_eq!(hwaddr.bytes, vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(hwaddr.to_string(), "hwtype=1 aa:bb:cc:dd:ee:ff");

        let client_id = ClientId::from_text("01:02:03").unwrap();
        assert_eq!(client_id.to_string(), "01:02:03");

        assert!(Duid::from_text("zz:01").is_err());
    }

    #[test]
    fn test_lease_type_conversion() {
        assert_eq!(LeaseType::try_from(2), Ok(LeaseType::Pd));
        assert_eq!(LeaseType::try_from(7), Err(7));
        assert_eq!(LeaseType::Ta.to_string(), "IA_TA");
    }

    #[test]
    fn test_lease_state_display() {
        assert_eq!(LeaseState::EXPIRED_RECLAIMED.to_string(), "expired-reclaimed");
        assert_eq!(LeaseState(9).to_string(), "unknown(9)");
        assert_eq!(LeaseState::default(), LeaseState::DEFAULT);
    }
}
