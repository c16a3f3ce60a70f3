//! Subnets, shared networks, pools and options held by the configuration
//! store.
//!
//! Every entity here carries the server tags owning it and the time it was
//! last modified. Entities are plain values: the configuration store hands
//! out clones, so a caller mutating a fetched subnet never changes the
//! stored one.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collection::Indexed;
use crate::error::{Error, Result};
use crate::lease::SubnetId;
use crate::selector::{ServerTag, server_tagged};

/// Option space of the standard DHCPv4 options.
pub const DHCP4_OPTION_SPACE: &str = "dhcp4";

/// One option instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    pub code: u16,
    /// Option space the code belongs to.
    pub space: String,
    /// Value in its textual form, e.g. `"192.0.2.1, 192.0.2.2"`.
    pub formatted_value: String,
    /// Value in its wire form; used when `formatted_value` is empty.
    pub data: Vec<u8>,
    /// Sent even when the client did not request it.
    pub persistent: bool,
    pub server_tags: BTreeSet<ServerTag>,
    pub modification_time: DateTime<Utc>,
}

impl OptionDescriptor {
    pub fn new(code: u16, space: &str, formatted_value: &str) -> Self {
        Self {
            code,
            space: space.to_string(),
            formatted_value: formatted_value.to_string(),
            data: Vec::new(),
            persistent: false,
            server_tags: BTreeSet::new(),
            modification_time: Utc::now(),
        }
    }
}

/// Options attached to a subnet, shared network or pool.
///
/// Holds at most one option per (space, code).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CfgOption {
    options: Vec<OptionDescriptor>,
}

impl CfgOption {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `option`, replacing any option with the same space and code.
    pub fn add(&mut self, option: OptionDescriptor) {
        self.del(&option.space, option.code);
        self.options.push(option);
    }

    /// Removes the option with `code` in `space`, returning how many were
    /// removed.
    pub fn del(&mut self, space: &str, code: u16) -> u64 {
        let before = self.options.len();
        self.options
            .retain(|option| option.code != code || option.space != space);
        (before - self.options.len()) as u64
    }

    pub fn get(&self, space: &str, code: u16) -> Option<&OptionDescriptor> {
        self.options
            .iter()
            .find(|option| option.code == code && option.space == space)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionDescriptor> {
        self.options.iter()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// An inclusive range of addresses handed out from a subnet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool4 {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub options: CfgOption,
}

impl Pool4 {
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if `start` is above `end`.
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self> {
        if start > end {
            return Err(Error::BadValue(format!(
                "invalid pool range {start} - {end}: start is greater than end"
            )));
        }
        Ok(Self {
            start,
            end,
            options: CfgOption::new(),
        })
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        (self.start..=self.end).contains(&address)
    }
}

impl fmt::Display for Pool4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// Parses `"address/length"` into the network address and prefix length.
fn parse_prefix(prefix: &str) -> Result<(Ipv4Addr, u8)> {
    let invalid = || Error::BadValue(format!("invalid subnet prefix '{prefix}'"));
    let (address, length) = prefix.split_once('/').ok_or_else(invalid)?;
    let address: Ipv4Addr = address.trim().parse().map_err(|_| invalid())?;
    let length: u8 = length.trim().parse().map_err(|_| invalid())?;
    if length > 32 {
        return Err(invalid());
    }
    Ok((address, length))
}

fn netmask(length: u8) -> u32 {
    match length {
        0 => 0,
        length => u32::MAX << (32 - u32::from(length)),
    }
}

/// An IPv4 subnet.
///
/// A subnet is identified both by its ID and by its prefix text, and each
/// must resolve to the same subnet within one server scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet4 {
    pub id: SubnetId,
    /// Prefix in `"address/length"` form.
    prefix: String,
    /// Shared network the subnet belongs to, by name.
    pub shared_network_name: Option<String>,
    pools: Vec<Pool4>,
    pub options: CfgOption,
    pub renew_timer: Option<u32>,
    pub rebind_timer: Option<u32>,
    pub valid_lifetime: Option<u32>,
    pub user_context: Option<serde_json::Value>,
    pub server_tags: BTreeSet<ServerTag>,
    pub modification_time: DateTime<Utc>,
}

impl Subnet4 {
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] for subnet ID 0 or a malformed prefix.
    pub fn new(id: SubnetId, prefix: &str) -> Result<Self> {
        if id == 0 {
            return Err(Error::BadValue("subnet ID 0 is reserved".into()));
        }
        let (address, length) = parse_prefix(prefix)?;
        Ok(Self {
            id,
            prefix: format!("{address}/{length}"),
            shared_network_name: None,
            pools: Vec::new(),
            options: CfgOption::new(),
            renew_timer: None,
            rebind_timer: None,
            valid_lifetime: None,
            user_context: None,
            server_tags: BTreeSet::new(),
            modification_time: Utc::now(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True if `address` lies within the subnet prefix.
    pub fn in_range(&self, address: Ipv4Addr) -> bool {
        match parse_prefix(&self.prefix) {
            Ok((network, length)) => {
                let mask = netmask(length);
                u32::from(network) & mask == u32::from(address) & mask
            }
            Err(_) => false,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if the pool is outside the subnet or
    /// overlaps an existing pool.
    pub fn add_pool(&mut self, pool: Pool4) -> Result<()> {
        if !self.in_range(pool.start) || !self.in_range(pool.end) {
            return Err(Error::BadValue(format!(
                "pool {pool} does not belong to subnet {}",
                self.prefix
            )));
        }
        if let Some(existing) = self
            .pools
            .iter()
            .find(|p| p.start <= pool.end && pool.start <= p.end)
        {
            return Err(Error::BadValue(format!(
                "pool {pool} overlaps with pool {existing} in subnet {}",
                self.prefix
            )));
        }
        self.pools.push(pool);
        Ok(())
    }

    pub fn pools(&self) -> &[Pool4] {
        &self.pools
    }

    /// Returns the pool containing `address`.
    pub fn get_pool(&self, address: Ipv4Addr) -> Option<&Pool4> {
        self.pools.iter().find(|pool| pool.contains(address))
    }

    pub fn get_pool_mut(&mut self, address: Ipv4Addr) -> Option<&mut Pool4> {
        self.pools.iter_mut().find(|pool| pool.contains(address))
    }
}

impl Indexed for Subnet4 {
    type Key = SubnetId;
    type AltKey = String;

    fn key(&self) -> SubnetId {
        self.id
    }

    fn alt_key(&self) -> Option<String> {
        Some(self.prefix.clone())
    }

    fn modification_time(&self) -> DateTime<Utc> {
        self.modification_time
    }
}

/// A group of subnets on one link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedNetwork4 {
    pub name: String,
    pub interface: Option<String>,
    pub options: CfgOption,
    pub user_context: Option<serde_json::Value>,
    pub server_tags: BTreeSet<ServerTag>,
    pub modification_time: DateTime<Utc>,
}

impl SharedNetwork4 {
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] for an empty name.
    pub fn new(name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::BadValue("shared network name must not be empty".into()));
        }
        Ok(Self {
            name: name.to_string(),
            interface: None,
            options: CfgOption::new(),
            user_context: None,
            server_tags: BTreeSet::new(),
            modification_time: Utc::now(),
        })
    }
}

impl Indexed for SharedNetwork4 {
    type Key = String;
    type AltKey = ();

    fn key(&self) -> String {
        self.name.clone()
    }

    fn modification_time(&self) -> DateTime<Utc> {
        self.modification_time
    }
}

/// Definition of a custom option format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDefinition {
    pub code: u16,
    pub name: String,
    pub space: String,
    /// Data type name, e.g. `"uint32"` or `"ipv4-address"`.
    pub option_type: String,
    pub array: bool,
    /// Option space encapsulated by this option, if any.
    pub encapsulate: Option<String>,
    pub server_tags: BTreeSet<ServerTag>,
    pub modification_time: DateTime<Utc>,
}

impl OptionDefinition {
    pub fn new(name: &str, code: u16, space: &str, option_type: &str) -> Self {
        Self {
            code,
            name: name.to_string(),
            space: space.to_string(),
            option_type: option_type.to_string(),
            array: false,
            encapsulate: None,
            server_tags: BTreeSet::new(),
            modification_time: Utc::now(),
        }
    }
}

impl Indexed for OptionDefinition {
    type Key = (u16, String);
    type AltKey = (String, String);

    fn key(&self) -> (u16, String) {
        (self.code, self.space.clone())
    }

    fn alt_key(&self) -> Option<(String, String)> {
        Some((self.name.clone(), self.space.clone()))
    }

    fn modification_time(&self) -> DateTime<Utc> {
        self.modification_time
    }
}

impl Indexed for OptionDescriptor {
    type Key = (u16, String);
    type AltKey = ();

    fn key(&self) -> (u16, String) {
        (self.code, self.space.clone())
    }

    fn modification_time(&self) -> DateTime<Utc> {
        self.modification_time
    }
}

server_tagged!(OptionDescriptor, Subnet4, SharedNetwork4, OptionDefinition);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::ServerTagged;

    #[test]
    fn test_subnet_prefix_validation() {
        let subnet = Subnet4::new(7, "192.0.2.0/24").unwrap();
        assert_eq!(subnet.prefix(), "192.0.2.0/24");
        assert!(subnet.in_range("192.0.2.200".parse().unwrap()));
        assert!(!subnet.in_range("192.0.3.1".parse().unwrap()));

        assert!(Subnet4::new(0, "192.0.2.0/24").is_err());
        assert!(Subnet4::new(1, "192.0.2.0").is_err());
        assert!(Subnet4::new(1, "192.0.2.0/33").is_err());
        assert!(Subnet4::new(1, "bogus/24").is_err());
    }

    #[test]
    fn test_pools() {
        let mut subnet = Subnet4::new(1, "10.0.0.0/8").unwrap();
        let pool = Pool4::new("10.0.0.10".parse().unwrap(), "10.0.0.20".parse().unwrap()).unwrap();
        subnet.add_pool(pool).unwrap();

        let overlapping =
            Pool4::new("10.0.0.15".parse().unwrap(), "10.0.0.30".parse().unwrap()).unwrap();
        assert!(matches!(subnet.add_pool(overlapping), Err(Error::BadValue(_))));

        let outside =
            Pool4::new("11.0.0.1".parse().unwrap(), "11.0.0.2".parse().unwrap()).unwrap();
        assert!(subnet.add_pool(outside).is_err());

        assert!(subnet.get_pool("10.0.0.20".parse().unwrap()).is_some());
        assert!(subnet.get_pool("10.0.0.21".parse().unwrap()).is_none());
        assert!(Pool4::new("10.0.0.2".parse().unwrap(), "10.0.0.1".parse().unwrap()).is_err());
    }

    #[test]
    fn test_cfg_option_replaces_same_code() {
        let mut options = CfgOption::new();
        options.add(OptionDescriptor::new(6, DHCP4_OPTION_SPACE, "192.0.2.1"));
        options.add(OptionDescriptor::new(6, DHCP4_OPTION_SPACE, "192.0.2.2"));
        options.add(OptionDescriptor::new(6, "vendor", "1"));
        assert_eq!(options.len(), 2);
        assert_eq!(
            options.get(DHCP4_OPTION_SPACE, 6).unwrap().formatted_value,
            "192.0.2.2"
        );
        assert_eq!(options.del(DHCP4_OPTION_SPACE, 6), 1);
        assert_eq!(options.del(DHCP4_OPTION_SPACE, 6), 0);
    }

    #[test]
    fn test_indexed_keys() {
        let def = OptionDefinition::new("foo", 224, "isc", "uint32");
        assert_eq!(def.key(), (224, "isc".to_string()));
        assert_eq!(def.alt_key(), Some(("foo".to_string(), "isc".to_string())));

        let mut network = SharedNetwork4::new("level3").unwrap();
        network.set_server_tag(ServerTag::all());
        assert!(network.has_all_server_tag());
        assert!(SharedNetwork4::new(" ").is_err());
    }
}
