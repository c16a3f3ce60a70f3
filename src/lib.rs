//! # dhcpstore
//!
//! Lease and configuration persistence for DHCP servers.
//!
//! ## Features
//!
//! - IPv4 and IPv6 lease storage over any SQL [`Connection`]
//! - Statement catalogs for PostgreSQL and SQLite, validated at startup
//! - Paged lease retrieval, expired lease reclamation and lease statistics
//! - Scoped transactions that roll back unless committed
//! - Multi-server configuration store with server-tag visibility
//! - Backend registries keyed by backend type
//!
//! ## Quick Start
//!
//! ```
//! use std::net::Ipv4Addr;
//! use dhcpstore::{Lease4, LeaseStoreRegistry};
//!
//! fn main() -> dhcpstore::Result<()> {
//!     let store = LeaseStoreRegistry::new().create("type=sqlite name=:memory:")?;
//!
//!     let lease = Lease4::new(Ipv4Addr::new(10, 0, 0, 5), None, None, 3600, 1);
//!     assert!(store.add_lease4(&lease)?);
//!     assert_eq!(store.get_leases4_by_subnet(1)?.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`LeaseStore`] - lease storage contract, implemented by [`SqlLeaseStore`]
//! - [`StatementCatalog`] - one SQL statement per lease store operation
//! - [`RowExchange`] - converts leases to bind parameters and back
//! - [`LeaseStatsQuery`] - per-subnet lease counts
//! - [`ConfigBackendDhcp4`] - configuration storage contract, implemented
//!   by [`MemoryConfigBackend4`]
//! - [`ServerSelector`] - which servers a configuration request is for
//! - [`Config`] - settings file of the `dhcpstore` tool

pub mod catalog;
pub mod collection;
pub mod config;
pub mod config_backend;
pub mod database;
pub mod error;
pub mod exchange;
pub mod lease;
pub mod lease_store;
pub mod network;
pub mod selector;
pub mod sqlite;
pub mod stamped;
pub mod stats;

pub use catalog::{Dialect, StatementCatalog, StatementIndex};
pub use config::Config;
pub use config_backend::{ConfigBackendDhcp4, ConfigBackendRegistry, MemoryConfigBackend4};
pub use database::{Connection, ParameterMap, parse_access_string};
pub use error::{Error, Result};
pub use exchange::RowExchange;
pub use lease::{ClientId, Duid, HwAddr, Lease4, Lease6, LeaseState, LeaseType, SubnetId};
pub use lease_store::{
    LeasePageSize, LeaseStore, LeaseStoreRegistry, LeaseTransaction, SqlLeaseStore,
};
pub use network::{CfgOption, OptionDefinition, OptionDescriptor, Pool4, SharedNetwork4, Subnet4};
pub use selector::{ServerSelector, ServerTag, ServerTagged};
pub use sqlite::SqliteConnection;
pub use stamped::{AuditEntry, Server, StampedValue};
pub use stats::{LeaseStatsQuery, LeaseStatsRow, SelectMode};
