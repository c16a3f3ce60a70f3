//! Lease persistence.
//!
//! [`LeaseStore`] is the contract every lease backend fulfils.
//! [`SqlLeaseStore`] implements it over any [`Connection`] by running the
//! statements of the connection's [`StatementCatalog`]. Backends are
//! created by type name through a [`LeaseStoreRegistry`]:
//!
//! ```
//! use dhcpstore::lease_store::LeaseStoreRegistry;
//!
//! let registry = LeaseStoreRegistry::new();
//! let store = registry.create("type=sqlite name=:memory:").unwrap();
//! assert_eq!(store.backend_type(), "sqlite");
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Deref;

use chrono::TimeDelta;
use tracing::{debug, info, warn};

use crate::catalog::{StatementCatalog, StatementIndex};
use crate::database::{BindArray, Connection, ParameterMap, parse_access_string};
use crate::error::{Error, Result};
use crate::exchange::{RowExchange, to_database_time};
use crate::lease::{
    ClientId, Duid, HwAddr, Lease4, Lease6, LeaseState, LeaseType, SubnetId, now_seconds,
};
use crate::sqlite::SqliteConnection;
use crate::stats::{LeaseStatsQuery, SqlLeaseStatsQuery, StatsFamily};

/// Schema version the statement catalogs are written against.
pub const SCHEMA_VERSION: (u32, u32) = (6, 0);

/// Number of leases returned by a paged query. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePageSize(u32);

impl LeasePageSize {
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if `size` is 0 or does not fit in 32 bits.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::BadValue("page size of retrieved leases must not be 0".into()));
        }
        u32::try_from(size).map(Self).map_err(|_| {
            Error::BadValue(format!(
                "page size of retrieved leases must not be greater than {}",
                u32::MAX
            ))
        })
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Storage contract for IPv4 and IPv6 leases.
///
/// Lookups that can match at most one lease return `Option`; if the
/// backend nevertheless finds several rows they fail with
/// [`Error::MultipleRecords`].
pub trait LeaseStore: Send {
    /// Inserts a lease. Returns `false` if a lease for the address exists.
    fn add_lease4(&self, lease: &Lease4) -> Result<bool>;

    /// Inserts a lease. Returns `false` if a lease for the address exists.
    fn add_lease6(&self, lease: &Lease6) -> Result<bool>;

    fn get_lease4(&self, address: Ipv4Addr) -> Result<Option<Lease4>>;

    fn get_lease4_by_hwaddr(&self, hwaddr: &HwAddr) -> Result<Vec<Lease4>>;

    fn get_lease4_by_hwaddr_subnet(
        &self,
        hwaddr: &HwAddr,
        subnet_id: SubnetId,
    ) -> Result<Option<Lease4>>;

    fn get_lease4_by_client_id(&self, client_id: &ClientId) -> Result<Vec<Lease4>>;

    fn get_lease4_by_client_id_subnet(
        &self,
        client_id: &ClientId,
        subnet_id: SubnetId,
    ) -> Result<Option<Lease4>>;

    /// Lookup by both client identifier and hardware address.
    fn get_lease4_by_client_id_hwaddr_subnet(
        &self,
        client_id: &ClientId,
        hwaddr: &HwAddr,
        subnet_id: SubnetId,
    ) -> Result<Option<Lease4>>;

    fn get_leases4_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease4>>;

    fn get_leases4(&self) -> Result<Vec<Lease4>>;

    /// Returns up to `page_size` leases with addresses strictly greater than
    /// `lower_bound`, in ascending address order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddressFamily`] if `lower_bound` is not IPv4.
    fn get_leases4_page(&self, lower_bound: IpAddr, page_size: LeasePageSize)
    -> Result<Vec<Lease4>>;

    fn get_lease6(&self, lease_type: LeaseType, address: Ipv6Addr) -> Result<Option<Lease6>>;

    fn get_leases6_by_duid_iaid(
        &self,
        lease_type: LeaseType,
        duid: &Duid,
        iaid: u32,
    ) -> Result<Vec<Lease6>>;

    fn get_leases6_by_duid_iaid_subnet(
        &self,
        lease_type: LeaseType,
        duid: &Duid,
        iaid: u32,
        subnet_id: SubnetId,
    ) -> Result<Vec<Lease6>>;

    fn get_leases6_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease6>>;

    fn get_leases6_by_duid(&self, duid: &Duid) -> Result<Vec<Lease6>>;

    fn get_leases6(&self) -> Result<Vec<Lease6>>;

    /// IPv6 counterpart of [`get_leases4_page`](Self::get_leases4_page).
    fn get_leases6_page(&self, lower_bound: IpAddr, page_size: LeasePageSize)
    -> Result<Vec<Lease6>>;

    /// Returns up to `max_leases` expired, unreclaimed, finite leases,
    /// soonest expiration first. 0 means no limit.
    fn get_expired_leases4(&self, max_leases: usize) -> Result<Vec<Lease4>>;

    fn get_expired_leases6(&self, max_leases: usize) -> Result<Vec<Lease6>>;

    /// Rewrites the lease stored for `lease.address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchLease`] if there is no such lease.
    fn update_lease4(&self, lease: &Lease4) -> Result<()>;

    fn update_lease6(&self, lease: &Lease6) -> Result<()>;

    /// Removes the lease for `address`. Returns `false` if there was none.
    fn delete_lease(&self, address: IpAddr) -> Result<bool>;

    /// Removes reclaimed leases that expired more than `secs` seconds ago.
    fn delete_expired_reclaimed_leases4(&self, secs: u32) -> Result<u64>;

    fn delete_expired_reclaimed_leases6(&self, secs: u32) -> Result<u64>;

    fn start_lease_stats_query4(&self) -> Result<Box<dyn LeaseStatsQuery + '_>>;

    fn start_subnet_lease_stats_query4(
        &self,
        subnet_id: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>>;

    fn start_subnet_range_lease_stats_query4(
        &self,
        first: SubnetId,
        last: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>>;

    fn start_lease_stats_query6(&self) -> Result<Box<dyn LeaseStatsQuery + '_>>;

    fn start_subnet_lease_stats_query6(
        &self,
        subnet_id: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>>;

    fn start_subnet_range_lease_stats_query6(
        &self,
        first: SubnetId,
        last: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>>;

    /// Removes every IPv4 lease of a subnet.
    fn wipe_leases4(&self, subnet_id: SubnetId) -> Result<u64>;

    fn wipe_leases6(&self, subnet_id: SubnetId) -> Result<u64>;

    /// Name of the database.
    fn name(&self) -> String;

    fn description(&self) -> String;

    /// Backend type string, as used in access strings.
    fn backend_type(&self) -> &'static str;

    /// Schema version of the open database.
    fn version(&self) -> Result<(u32, u32)>;

    fn begin_transaction(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}

/// Scoped transaction over a lease store.
///
/// The transaction is rolled back when the guard is dropped without
/// calling [`commit`](Self::commit).
pub struct LeaseTransaction<'a, S: LeaseStore + ?Sized> {
    store: &'a S,
    committed: bool,
}

impl<'a, S: LeaseStore + ?Sized> LeaseTransaction<'a, S> {
    /// Begins a transaction on `store`.
    pub fn begin(store: &'a S) -> Result<Self> {
        store.begin_transaction()?;
        Ok(Self {
            store,
            committed: false,
        })
    }

    /// Commits the transaction. A failed commit is rolled back on drop.
    pub fn commit(mut self) -> Result<()> {
        let result = self.store.commit();
        self.committed = result.is_ok();
        result
    }
}

impl<S: LeaseStore + ?Sized> Deref for LeaseTransaction<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.store
    }
}

impl<S: LeaseStore + ?Sized> Drop for LeaseTransaction<'_, S> {
    fn drop(&mut self) {
        if !self.committed
            && let Err(e) = self.store.rollback()
        {
            warn!("Failed to roll back lease transaction: {}", e);
        }
    }
}

/// Lease store backed by a relational database.
pub struct SqlLeaseStore<C: Connection> {
    conn: C,
    catalog: StatementCatalog,
    backend_type: &'static str,
}

impl<C: Connection> SqlLeaseStore<C> {
    /// Wraps an open connection.
    ///
    /// Validates the statement catalog for the connection's dialect, checks
    /// the schema version and prepares every statement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] for a broken catalog and
    /// [`Error::DbOpen`] if the schema version is not [`SCHEMA_VERSION`].
    pub fn open(conn: C, backend_type: &'static str) -> Result<Self> {
        let catalog = StatementCatalog::for_dialect(conn.dialect())?;

        let version = conn.schema_version()?;
        if version != SCHEMA_VERSION {
            return Err(Error::DbOpen(format!(
                "schema version mismatch: need version: {}.{} found version: {}.{}",
                SCHEMA_VERSION.0, SCHEMA_VERSION.1, version.0, version.1
            )));
        }

        for statement in catalog.iter() {
            conn.prepare(statement)
                .map_err(|e| Error::DbOpen(e.to_string()))?;
        }

        info!(
            "Opened {} lease database, schema {}.{} ({})",
            backend_type,
            version.0,
            version.1,
            conn.client_version()
        );

        Ok(Self {
            conn,
            catalog,
            backend_type,
        })
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    fn add_lease_common<L: RowExchange>(&self, index: StatementIndex, lease: &L) -> Result<bool> {
        let statement = self.catalog.get(index);
        let binds = lease.to_parameters()?;
        match self.conn.execute(statement, &binds) {
            Ok(_) => Ok(true),
            Err(Error::DuplicateEntry(_)) => {
                warn!(
                    "Lease for {} already exists, not adding",
                    lease.address_text()
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn get_lease_collection<L: RowExchange>(
        &self,
        index: StatementIndex,
        binds: &BindArray,
    ) -> Result<Vec<L>> {
        let statement = self.catalog.get(index);
        let set = self.conn.query(statement, binds)?;
        (0..set.row_count())
            .map(|row| L::from_row(&set, row))
            .collect()
    }

    fn get_lease<L: RowExchange>(
        &self,
        index: StatementIndex,
        binds: &BindArray,
    ) -> Result<Option<L>> {
        let mut leases = self.get_lease_collection(index, binds)?;
        if leases.len() > 1 {
            return Err(Error::MultipleRecords(format!(
                "multiple records were found in the database where only one was expected for query {}",
                self.catalog.get(index).name
            )));
        }
        Ok(leases.pop())
    }

    fn update_lease_common(&self, index: StatementIndex, binds: &BindArray, address: &str) -> Result<()> {
        let statement = self.catalog.get(index);
        match self.conn.execute(statement, binds)? {
            0 => Err(Error::NoSuchLease(format!(
                "unable to update lease for address {address} as it does not exist"
            ))),
            1 => Ok(()),
            affected => Err(Error::DbOperation(format!(
                "update for lease address {address} returned {affected} rows updated, expected 1"
            ))),
        }
    }

    fn get_expired_leases_common<L: RowExchange>(
        &self,
        index: StatementIndex,
        max_leases: usize,
    ) -> Result<Vec<L>> {
        let limit = if max_leases == 0 {
            u32::MAX
        } else {
            u32::try_from(max_leases).unwrap_or(u32::MAX)
        };
        let mut binds = BindArray::new();
        binds.add(LeaseState::EXPIRED_RECLAIMED.0);
        binds.add(to_database_time(now_seconds(), 0)?);
        binds.add(limit);
        self.get_lease_collection(index, &binds)
    }

    fn delete_expired_reclaimed_common(&self, index: StatementIndex, secs: u32) -> Result<u64> {
        let expiration = now_seconds() - TimeDelta::seconds(i64::from(secs));
        let mut binds = BindArray::new();
        binds.add(LeaseState::EXPIRED_RECLAIMED.0);
        binds.add(to_database_time(expiration, 0)?);
        let deleted = self.conn.execute(self.catalog.get(index), &binds)?;
        debug!("Deleted {} expired-reclaimed leases", deleted);
        Ok(deleted)
    }

    fn stats_all(&self, family: StatsFamily) -> Result<Box<dyn LeaseStatsQuery + '_>> {
        let mut query = SqlLeaseStatsQuery::all(&self.conn, self.catalog, family);
        query.start()?;
        Ok(Box::new(query))
    }

    fn stats_single(
        &self,
        family: StatsFamily,
        subnet_id: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>> {
        let mut query = SqlLeaseStatsQuery::single(&self.conn, self.catalog, family, subnet_id)?;
        query.start()?;
        Ok(Box::new(query))
    }

    fn stats_range(
        &self,
        family: StatsFamily,
        first: SubnetId,
        last: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>> {
        let mut query = SqlLeaseStatsQuery::range(&self.conn, self.catalog, family, first, last)?;
        query.start()?;
        Ok(Box::new(query))
    }
}

impl<C: Connection> LeaseStore for SqlLeaseStore<C> {
    fn add_lease4(&self, lease: &Lease4) -> Result<bool> {
        debug!(address = %lease.address, "add_lease4");
        self.add_lease_common(StatementIndex::InsertLease4, lease)
    }

    fn add_lease6(&self, lease: &Lease6) -> Result<bool> {
        debug!(address = %lease.address, lease_type = %lease.lease_type, "add_lease6");
        self.add_lease_common(StatementIndex::InsertLease6, lease)
    }

    fn get_lease4(&self, address: Ipv4Addr) -> Result<Option<Lease4>> {
        debug!(%address, "get_lease4");
        let mut binds = BindArray::new();
        binds.add(u32::from(address));
        self.get_lease(StatementIndex::GetLease4Addr, &binds)
    }

    fn get_lease4_by_hwaddr(&self, hwaddr: &HwAddr) -> Result<Vec<Lease4>> {
        debug!(%hwaddr, "get_lease4_by_hwaddr");
        let mut binds = BindArray::new();
        binds.add(hwaddr.bytes.as_slice());
        self.get_lease_collection(StatementIndex::GetLease4HwAddr, &binds)
    }

    fn get_lease4_by_hwaddr_subnet(
        &self,
        hwaddr: &HwAddr,
        subnet_id: SubnetId,
    ) -> Result<Option<Lease4>> {
        debug!(%hwaddr, subnet_id, "get_lease4_by_hwaddr_subnet");
        let mut binds = BindArray::new();
        binds.add(hwaddr.bytes.as_slice()).add(subnet_id);
        self.get_lease(StatementIndex::GetLease4HwAddrSubId, &binds)
    }

    fn get_lease4_by_client_id(&self, client_id: &ClientId) -> Result<Vec<Lease4>> {
        debug!(%client_id, "get_lease4_by_client_id");
        let mut binds = BindArray::new();
        binds.add(client_id.as_bytes());
        self.get_lease_collection(StatementIndex::GetLease4ClientId, &binds)
    }

    fn get_lease4_by_client_id_subnet(
        &self,
        client_id: &ClientId,
        subnet_id: SubnetId,
    ) -> Result<Option<Lease4>> {
        debug!(%client_id, subnet_id, "get_lease4_by_client_id_subnet");
        let mut binds = BindArray::new();
        binds.add(client_id.as_bytes()).add(subnet_id);
        self.get_lease(StatementIndex::GetLease4ClientIdSubId, &binds)
    }

    fn get_lease4_by_client_id_hwaddr_subnet(
        &self,
        _client_id: &ClientId,
        _hwaddr: &HwAddr,
        _subnet_id: SubnetId,
    ) -> Result<Option<Lease4>> {
        // Address allocation never searches by both identifiers at once.
        Err(Error::NotImplemented(
            "get_lease4_by_client_id_hwaddr_subnet is not implemented".into(),
        ))
    }

    fn get_leases4_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease4>> {
        debug!(subnet_id, "get_leases4_by_subnet");
        let mut binds = BindArray::new();
        binds.add(subnet_id);
        self.get_lease_collection(StatementIndex::GetLease4SubId, &binds)
    }

    fn get_leases4(&self) -> Result<Vec<Lease4>> {
        debug!("get_leases4");
        self.get_lease_collection(StatementIndex::GetLease4, &BindArray::new())
    }

    fn get_leases4_page(
        &self,
        lower_bound: IpAddr,
        page_size: LeasePageSize,
    ) -> Result<Vec<Lease4>> {
        let IpAddr::V4(lower_bound) = lower_bound else {
            return Err(Error::InvalidAddressFamily(format!(
                "expected IPv4 address while retrieving leases from the lease database, got {lower_bound}"
            )));
        };
        debug!(%lower_bound, page_size = page_size.get(), "get_leases4_page");

        let mut binds = BindArray::new();
        binds.add(u32::from(lower_bound)).add(page_size.get());
        self.get_lease_collection(StatementIndex::GetLease4Page, &binds)
    }

    fn get_lease6(&self, lease_type: LeaseType, address: Ipv6Addr) -> Result<Option<Lease6>> {
        debug!(%address, %lease_type, "get_lease6");
        let mut binds = BindArray::new();
        binds.add(address.to_string()).add(lease_type as u32);
        self.get_lease(StatementIndex::GetLease6Addr, &binds)
    }

    fn get_leases6_by_duid_iaid(
        &self,
        lease_type: LeaseType,
        duid: &Duid,
        iaid: u32,
    ) -> Result<Vec<Lease6>> {
        debug!(%duid, iaid, %lease_type, "get_leases6_by_duid_iaid");
        let mut binds = BindArray::new();
        binds
            .add(duid.as_bytes())
            .add(crate::exchange::iaid_to_db(iaid))
            .add(lease_type as u32);
        self.get_lease_collection(StatementIndex::GetLease6DuidIaid, &binds)
    }

    fn get_leases6_by_duid_iaid_subnet(
        &self,
        lease_type: LeaseType,
        duid: &Duid,
        iaid: u32,
        subnet_id: SubnetId,
    ) -> Result<Vec<Lease6>> {
        debug!(%duid, iaid, subnet_id, %lease_type, "get_leases6_by_duid_iaid_subnet");
        let mut binds = BindArray::new();
        binds
            .add(lease_type as u32)
            .add(duid.as_bytes())
            .add(crate::exchange::iaid_to_db(iaid))
            .add(subnet_id);
        self.get_lease_collection(StatementIndex::GetLease6DuidIaidSubId, &binds)
    }

    fn get_leases6_by_subnet(&self, subnet_id: SubnetId) -> Result<Vec<Lease6>> {
        debug!(subnet_id, "get_leases6_by_subnet");
        let mut binds = BindArray::new();
        binds.add(subnet_id);
        self.get_lease_collection(StatementIndex::GetLease6SubId, &binds)
    }

    fn get_leases6_by_duid(&self, duid: &Duid) -> Result<Vec<Lease6>> {
        debug!(%duid, "get_leases6_by_duid");
        let mut binds = BindArray::new();
        binds.add(duid.as_bytes());
        self.get_lease_collection(StatementIndex::GetLease6Duid, &binds)
    }

    fn get_leases6(&self) -> Result<Vec<Lease6>> {
        debug!("get_leases6");
        self.get_lease_collection(StatementIndex::GetLease6, &BindArray::new())
    }

    fn get_leases6_page(
        &self,
        lower_bound: IpAddr,
        page_size: LeasePageSize,
    ) -> Result<Vec<Lease6>> {
        let IpAddr::V6(lower_bound) = lower_bound else {
            return Err(Error::InvalidAddressFamily(format!(
                "expected IPv6 address while retrieving leases from the lease database, got {lower_bound}"
            )));
        };
        debug!(%lower_bound, page_size = page_size.get(), "get_leases6_page");

        // Addresses compare as text, and every stored address sorts after "0".
        let lower_bound = if lower_bound.is_unspecified() {
            "0".to_string()
        } else {
            lower_bound.to_string()
        };
        let mut binds = BindArray::new();
        binds.add(lower_bound).add(page_size.get());
        self.get_lease_collection(StatementIndex::GetLease6Page, &binds)
    }

    fn get_expired_leases4(&self, max_leases: usize) -> Result<Vec<Lease4>> {
        debug!(max_leases, "get_expired_leases4");
        self.get_expired_leases_common(StatementIndex::GetLease4Expire, max_leases)
    }

    fn get_expired_leases6(&self, max_leases: usize) -> Result<Vec<Lease6>> {
        debug!(max_leases, "get_expired_leases6");
        self.get_expired_leases_common(StatementIndex::GetLease6Expire, max_leases)
    }

    fn update_lease4(&self, lease: &Lease4) -> Result<()> {
        debug!(address = %lease.address, "update_lease4");
        let mut binds = lease.to_parameters()?;
        binds.add(u32::from(lease.address));
        self.update_lease_common(StatementIndex::UpdateLease4, &binds, &lease.address_text())
    }

    fn update_lease6(&self, lease: &Lease6) -> Result<()> {
        debug!(address = %lease.address, lease_type = %lease.lease_type, "update_lease6");
        let mut binds = lease.to_parameters()?;
        binds.add(lease.address.to_string());
        self.update_lease_common(StatementIndex::UpdateLease6, &binds, &lease.address_text())
    }

    fn delete_lease(&self, address: IpAddr) -> Result<bool> {
        debug!(%address, "delete_lease");
        let mut binds = BindArray::new();
        let index = match address {
            IpAddr::V4(v4) => {
                binds.add(u32::from(v4));
                StatementIndex::DeleteLease4
            }
            IpAddr::V6(v6) => {
                binds.add(v6.to_string());
                StatementIndex::DeleteLease6
            }
        };
        Ok(self.conn.execute(self.catalog.get(index), &binds)? > 0)
    }

    fn delete_expired_reclaimed_leases4(&self, secs: u32) -> Result<u64> {
        debug!(secs, "delete_expired_reclaimed_leases4");
        self.delete_expired_reclaimed_common(StatementIndex::DeleteLease4StateExpired, secs)
    }

    fn delete_expired_reclaimed_leases6(&self, secs: u32) -> Result<u64> {
        debug!(secs, "delete_expired_reclaimed_leases6");
        self.delete_expired_reclaimed_common(StatementIndex::DeleteLease6StateExpired, secs)
    }

    fn start_lease_stats_query4(&self) -> Result<Box<dyn LeaseStatsQuery + '_>> {
        self.stats_all(StatsFamily::V4)
    }

    fn start_subnet_lease_stats_query4(
        &self,
        subnet_id: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>> {
        self.stats_single(StatsFamily::V4, subnet_id)
    }

    fn start_subnet_range_lease_stats_query4(
        &self,
        first: SubnetId,
        last: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>> {
        self.stats_range(StatsFamily::V4, first, last)
    }

    fn start_lease_stats_query6(&self) -> Result<Box<dyn LeaseStatsQuery + '_>> {
        self.stats_all(StatsFamily::V6)
    }

    fn start_subnet_lease_stats_query6(
        &self,
        subnet_id: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>> {
        self.stats_single(StatsFamily::V6, subnet_id)
    }

    fn start_subnet_range_lease_stats_query6(
        &self,
        first: SubnetId,
        last: SubnetId,
    ) -> Result<Box<dyn LeaseStatsQuery + '_>> {
        self.stats_range(StatsFamily::V6, first, last)
    }

    fn wipe_leases4(&self, _subnet_id: SubnetId) -> Result<u64> {
        Err(Error::NotImplemented(format!(
            "wipe_leases4 is not implemented for the {} backend",
            self.backend_type
        )))
    }

    fn wipe_leases6(&self, _subnet_id: SubnetId) -> Result<u64> {
        Err(Error::NotImplemented(format!(
            "wipe_leases6 is not implemented for the {} backend",
            self.backend_type
        )))
    }

    fn name(&self) -> String {
        self.conn.parameter("name").unwrap_or_default().to_string()
    }

    fn description(&self) -> String {
        format!("{} database ({})", self.backend_type, self.conn.client_version())
    }

    fn backend_type(&self) -> &'static str {
        self.backend_type
    }

    fn version(&self) -> Result<(u32, u32)> {
        self.conn.schema_version()
    }

    fn begin_transaction(&self) -> Result<()> {
        debug!("begin_transaction");
        self.conn.begin()
    }

    fn commit(&self) -> Result<()> {
        debug!("commit");
        self.conn.commit()
    }

    fn rollback(&self) -> Result<()> {
        debug!("rollback");
        self.conn.rollback()
    }
}

/// Creates a lease store from connection parameters.
pub type LeaseStoreFactory = fn(ParameterMap) -> Result<Box<dyn LeaseStore>>;

fn create_sqlite(parameters: ParameterMap) -> Result<Box<dyn LeaseStore>> {
    let conn = SqliteConnection::open(parameters)?;
    Ok(Box::new(SqlLeaseStore::open(conn, "sqlite")?))
}

/// Lease store factories keyed by backend type.
#[derive(Debug, Clone)]
pub struct LeaseStoreRegistry {
    factories: BTreeMap<String, LeaseStoreFactory>,
}

impl Default for LeaseStoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaseStoreRegistry {
    /// Creates a registry with the built-in `sqlite` backend.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register("sqlite", create_sqlite);
        registry
    }

    /// Registers a factory. Returns `false` if the type is already taken.
    pub fn register(&mut self, backend_type: &str, factory: LeaseStoreFactory) -> bool {
        if self.factories.contains_key(backend_type) {
            return false;
        }
        self.factories.insert(backend_type.to_string(), factory);
        true
    }

    /// Removes a factory. Returns `false` if none was registered.
    pub fn deregister(&mut self, backend_type: &str) -> bool {
        self.factories.remove(backend_type).is_some()
    }

    pub fn registered_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Creates a store from an access string.
    pub fn create(&self, access: &str) -> Result<Box<dyn LeaseStore>> {
        self.create_from_parameters(parse_access_string(access)?)
    }

    /// Creates a store from parsed connection parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `type` is missing and
    /// [`Error::UnknownBackend`] if no factory handles it.
    pub fn create_from_parameters(&self, parameters: ParameterMap) -> Result<Box<dyn LeaseStore>> {
        let backend_type = parameters
            .get("type")
            .ok_or_else(|| Error::InvalidConfig("lease database access string must contain 'type'".into()))?;
        let factory = self
            .factories
            .get(backend_type)
            .ok_or_else(|| Error::UnknownBackend(backend_type.clone()))?;
        info!(
            "Opening lease database: {}",
            crate::database::redacted_access_string(&parameters)
        );
        factory(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> SqlLeaseStore<SqliteConnection> {
        SqlLeaseStore::open(SqliteConnection::open_in_memory().unwrap(), "sqlite").unwrap()
    }

    fn lease4(last: u8, subnet_id: SubnetId) -> Lease4 {
        Lease4::new(
            Ipv4Addr::new(10, 0, 0, last),
            Some(HwAddr::ether([0, 1, 2, 3, 4, last])),
            Some(ClientId(vec![9, last])),
            3600,
            subnet_id,
        )
    }

    #[test]
    fn test_page_size_must_be_positive() {
        assert!(matches!(LeasePageSize::new(0), Err(Error::BadValue(_))));
        assert_eq!(LeasePageSize::new(5).unwrap().get(), 5);
    }

    #[test]
    fn test_schema_version_mismatch() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch("UPDATE schema_version SET version = 5").unwrap();
        let result = SqlLeaseStore::open(conn, "sqlite");
        assert!(matches!(result, Err(Error::DbOpen(_))));
    }

    #[test]
    fn test_multiple_records() {
        let store = memory_store();
        let mut a = lease4(1, 4);
        let mut b = lease4(2, 4);
        b.hwaddr = a.hwaddr.clone();
        a.client_id = None;
        b.client_id = None;
        assert!(store.add_lease4(&a).unwrap());
        assert!(store.add_lease4(&b).unwrap());

        let hwaddr = a.hwaddr.clone().unwrap();
        assert_eq!(store.get_lease4_by_hwaddr(&hwaddr).unwrap().len(), 2);
        assert!(matches!(
            store.get_lease4_by_hwaddr_subnet(&hwaddr, 4),
            Err(Error::MultipleRecords(_))
        ));
    }

    #[test]
    fn test_wrong_family_page() {
        let store = memory_store();
        let size = LeasePageSize::new(10).unwrap();
        assert!(matches!(
            store.get_leases4_page("2001:db8::1".parse().unwrap(), size),
            Err(Error::InvalidAddressFamily(_))
        ));
        assert!(matches!(
            store.get_leases6_page("10.0.0.1".parse().unwrap(), size),
            Err(Error::InvalidAddressFamily(_))
        ));
    }

    #[test]
    fn test_not_implemented_operations() {
        let store = memory_store();
        let lease = lease4(1, 1);
        assert!(matches!(
            store.get_lease4_by_client_id_hwaddr_subnet(
                lease.client_id.as_ref().unwrap(),
                lease.hwaddr.as_ref().unwrap(),
                1
            ),
            Err(Error::NotImplemented(_))
        ));
        assert!(matches!(store.wipe_leases4(1), Err(Error::NotImplemented(_))));
        assert!(matches!(store.wipe_leases6(1), Err(Error::NotImplemented(_))));
    }

    #[test]
    fn test_transaction_guard_rolls_back() {
        let store = memory_store();
        {
            let tx = LeaseTransaction::begin(&store).unwrap();
            assert!(tx.add_lease4(&lease4(1, 1)).unwrap());
        }
        assert!(store.get_lease4(Ipv4Addr::new(10, 0, 0, 1)).unwrap().is_none());

        let tx = LeaseTransaction::begin(&store).unwrap();
        assert!(tx.add_lease4(&lease4(2, 1)).unwrap());
        tx.commit().unwrap();
        assert!(store.get_lease4(Ipv4Addr::new(10, 0, 0, 2)).unwrap().is_some());
    }

    #[test]
    fn test_registry() {
        let mut registry = LeaseStoreRegistry::new();
        assert_eq!(registry.registered_types(), vec!["sqlite"]);
        assert!(!registry.register("sqlite", create_sqlite));

        assert!(matches!(
            registry.create("name=:memory:"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            registry.create("type=mysql name=kea"),
            Err(Error::UnknownBackend(_))
        ));

        let store = registry.create("type=sqlite name=:memory:").unwrap();
        assert_eq!(store.name(), ":memory:");
        assert_eq!(store.version().unwrap(), SCHEMA_VERSION);

        assert!(registry.deregister("sqlite"));
        assert!(registry.create("type=sqlite name=:memory:").is_err());
    }
}
