//! Lease statistics cursors.
//!
//! A statistics query counts leases per subnet, lease type and state. The
//! selection mode is fixed when the query is built; [`start`] runs it once
//! and [`next_row`] pulls rows in the backend's order (subnet, then lease
//! type when reported, then state).
//!
//! [`start`]: LeaseStatsQuery::start
//! [`next_row`]: LeaseStatsQuery::next_row

use tracing::debug;

use crate::catalog::{StatementCatalog, StatementIndex};
use crate::database::{BindArray, Connection, ResultSet, SqlValue};
use crate::error::{Error, Result};
use crate::lease::{LeaseState, LeaseType, SubnetId};

/// Which subnets a statistics query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    AllSubnets,
    SingleSubnet,
    /// An inclusive range of subnet IDs.
    SubnetRange,
}

/// One aggregated row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseStatsRow {
    pub subnet_id: SubnetId,
    /// Always [`LeaseType::Na`] for IPv4 rows.
    pub lease_type: LeaseType,
    pub lease_state: LeaseState,
    pub state_count: i64,
}

/// Pull-based cursor over lease counts.
pub trait LeaseStatsQuery {
    /// Executes the query.
    ///
    /// # Errors
    ///
    /// Fails if the query was already started or the backend rejects it.
    fn start(&mut self) -> Result<()>;

    /// Returns the next row, or `None` when there are no more rows or the
    /// query was never started.
    fn next_row(&mut self) -> Result<Option<LeaseStatsRow>>;

    fn select_mode(&self) -> SelectMode;

    /// First (or only) subnet ID selected; 0 when all subnets are selected.
    fn first_subnet_id(&self) -> SubnetId;

    /// Last subnet ID selected; 0 unless a range is selected.
    fn last_subnet_id(&self) -> SubnetId;
}

/// Address family a statistics query counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFamily {
    V4,
    V6,
}

/// Statistics cursor over a relational backend.
///
/// The result is materialized by [`start`](LeaseStatsQuery::start) and
/// consumed row by row.
pub struct SqlLeaseStatsQuery<'a, C: Connection + ?Sized> {
    conn: &'a C,
    catalog: StatementCatalog,
    family: StatsFamily,
    mode: SelectMode,
    first_subnet_id: SubnetId,
    last_subnet_id: SubnetId,
    result: Option<ResultSet>,
    next_row: usize,
}

impl<'a, C: Connection + ?Sized> SqlLeaseStatsQuery<'a, C> {
    /// Counts leases in every subnet.
    pub fn all(conn: &'a C, catalog: StatementCatalog, family: StatsFamily) -> Self {
        Self {
            conn,
            catalog,
            family,
            mode: SelectMode::AllSubnets,
            first_subnet_id: 0,
            last_subnet_id: 0,
            result: None,
            next_row: 0,
        }
    }

    /// Counts leases in one subnet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] for subnet ID 0.
    pub fn single(
        conn: &'a C,
        catalog: StatementCatalog,
        family: StatsFamily,
        subnet_id: SubnetId,
    ) -> Result<Self> {
        if subnet_id == 0 {
            return Err(Error::BadValue(
                "LeaseStatsQuery: subnet_id must be > 0".into(),
            ));
        }
        Ok(Self {
            mode: SelectMode::SingleSubnet,
            first_subnet_id: subnet_id,
            ..Self::all(conn, catalog, family)
        })
    }

    /// Counts leases in subnets `first..=last`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadValue`] if either bound is 0 or `last < first`.
    pub fn range(
        conn: &'a C,
        catalog: StatementCatalog,
        family: StatsFamily,
        first: SubnetId,
        last: SubnetId,
    ) -> Result<Self> {
        if first == 0 {
            return Err(Error::BadValue(
                "LeaseStatsQuery: first_subnet_id must be > 0".into(),
            ));
        }
        if last == 0 {
            return Err(Error::BadValue(
                "LeaseStatsQuery: last_subnet_id must be > 0".into(),
            ));
        }
        if last < first {
            return Err(Error::BadValue(format!(
                "LeaseStatsQuery: last_subnet_id {last} must be >= first_subnet_id {first}"
            )));
        }
        Ok(Self {
            mode: SelectMode::SubnetRange,
            first_subnet_id: first,
            last_subnet_id: last,
            ..Self::all(conn, catalog, family)
        })
    }

    fn statement_index(&self) -> StatementIndex {
        match (self.family, self.mode) {
            (StatsFamily::V4, SelectMode::AllSubnets) => StatementIndex::AllLease4Stats,
            (StatsFamily::V4, SelectMode::SingleSubnet) => StatementIndex::SubnetLease4Stats,
            (StatsFamily::V4, SelectMode::SubnetRange) => StatementIndex::SubnetRangeLease4Stats,
            (StatsFamily::V6, SelectMode::AllSubnets) => StatementIndex::AllLease6Stats,
            (StatsFamily::V6, SelectMode::SingleSubnet) => StatementIndex::SubnetLease6Stats,
            (StatsFamily::V6, SelectMode::SubnetRange) => StatementIndex::SubnetRangeLease6Stats,
        }
    }
}

fn int_cell(set: &ResultSet, row: usize, col: usize) -> Result<i64> {
    match set.value(row, col)? {
        SqlValue::Int(i) => Ok(*i),
        SqlValue::Text(s) => s.trim().parse().map_err(|_| {
            Error::DbOperation(format!(
                "invalid integer: '{s}' for: {} in row: {row}",
                set.column_label(col)
            ))
        }),
        other => Err(Error::DbOperation(format!(
            "invalid {} value for: {} in row: {row}",
            other.kind(),
            set.column_label(col)
        ))),
    }
}

fn narrow<T: TryFrom<i64>>(set: &ResultSet, row: usize, col: usize) -> Result<T> {
    let raw = int_cell(set, row, col)?;
    T::try_from(raw).map_err(|_| {
        Error::DbOperation(format!(
            "value: {raw} is out of range for: {} in row: {row}",
            set.column_label(col)
        ))
    })
}

impl<C: Connection + ?Sized> LeaseStatsQuery for SqlLeaseStatsQuery<'_, C> {
    fn start(&mut self) -> Result<()> {
        if self.result.is_some() {
            return Err(Error::DbOperation(
                "lease statistics query was already started".into(),
            ));
        }

        let statement = self.catalog.get(self.statement_index());
        let mut binds = BindArray::new();
        if self.mode != SelectMode::AllSubnets {
            binds.add(self.first_subnet_id);
        }
        if self.mode == SelectMode::SubnetRange {
            binds.add(self.last_subnet_id);
        }

        debug!(
            statement = statement.name,
            first = self.first_subnet_id,
            last = self.last_subnet_id,
            "Starting lease statistics query"
        );
        self.result = Some(self.conn.query(statement, &binds)?);
        self.next_row = 0;
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<LeaseStatsRow>> {
        let Some(set) = &self.result else {
            return Ok(None);
        };
        if self.next_row >= set.row_count() {
            return Ok(None);
        }

        let row = self.next_row;
        let mut col = 0;
        let subnet_id = narrow(set, row, col)?;
        col += 1;

        let lease_type = match self.family {
            StatsFamily::V4 => LeaseType::Na,
            StatsFamily::V6 => {
                let raw: u32 = narrow(set, row, col)?;
                col += 1;
                LeaseType::try_from(raw).map_err(|value| {
                    Error::DbOperation(format!("invalid lease type: {value} in row: {row}"))
                })?
            }
        };

        let lease_state = LeaseState(narrow(set, row, col)?);
        col += 1;
        let state_count = int_cell(set, row, col)?;

        self.next_row += 1;
        Ok(Some(LeaseStatsRow {
            subnet_id,
            lease_type,
            lease_state,
            state_count,
        }))
    }

    fn select_mode(&self) -> SelectMode {
        self.mode
    }

    fn first_subnet_id(&self) -> SubnetId {
        self.first_subnet_id
    }

    fn last_subnet_id(&self) -> SubnetId {
        self.last_subnet_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Dialect;
    use crate::sqlite::SqliteConnection;

    fn setup() -> (SqliteConnection, StatementCatalog) {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO lease4 (address, subnet_id, state) VALUES (1, 1, 0), (2, 1, 0), (3, 1, 1), (4, 2, 0), (5, 3, 2);
             INSERT INTO lease6 (address, subnet_id, lease_type, state) VALUES ('2001:db8::1', 1, 0, 0), ('2001:db8::2', 1, 2, 0);",
        )
        .unwrap();
        let catalog = StatementCatalog::for_dialect(Dialect::Sqlite).unwrap();
        (conn, catalog)
    }

    fn drain(query: &mut dyn LeaseStatsQuery) -> Vec<LeaseStatsRow> {
        let mut rows = Vec::new();
        while let Some(row) = query.next_row().unwrap() {
            rows.push(row);
        }
        rows
    }

    #[test]
    fn test_all_subnets_v4() {
        let (conn, catalog) = setup();
        let mut query = SqlLeaseStatsQuery::all(&conn, catalog, StatsFamily::V4);
        assert!(query.next_row().unwrap().is_none());
        query.start().unwrap();

        let rows = drain(&mut query);
        let summary: Vec<_> = rows
            .iter()
            .map(|r| (r.subnet_id, r.lease_state.0, r.state_count))
            .collect();
        assert_eq!(summary, vec![(1, 0, 2), (1, 1, 1), (2, 0, 1), (3, 2, 1)]);
        assert!(rows.iter().all(|r| r.lease_type == LeaseType::Na));
        assert!(query.next_row().unwrap().is_none());
    }

    #[test]
    fn test_start_runs_once() {
        let (conn, catalog) = setup();
        let mut query = SqlLeaseStatsQuery::all(&conn, catalog, StatsFamily::V4);
        query.start().unwrap();
        assert!(query.start().is_err());
    }

    #[test]
    fn test_single_and_range() {
        let (conn, catalog) = setup();
        let mut single = SqlLeaseStatsQuery::single(&conn, catalog, StatsFamily::V4, 2).unwrap();
        assert_eq!(single.select_mode(), SelectMode::SingleSubnet);
        single.start().unwrap();
        assert_eq!(drain(&mut single).len(), 1);

        let mut range = SqlLeaseStatsQuery::range(&conn, catalog, StatsFamily::V4, 2, 3).unwrap();
        range.start().unwrap();
        let subnets: Vec<_> = drain(&mut range).iter().map(|r| r.subnet_id).collect();
        assert_eq!(subnets, vec![2, 3]);
    }

    #[test]
    fn test_invalid_selection_is_rejected() {
        let (conn, catalog) = setup();
        assert!(matches!(
            SqlLeaseStatsQuery::single(&conn, catalog, StatsFamily::V4, 0),
            Err(Error::BadValue(_))
        ));
        assert!(matches!(
            SqlLeaseStatsQuery::range(&conn, catalog, StatsFamily::V4, 0, 5),
            Err(Error::BadValue(_))
        ));
        assert!(matches!(
            SqlLeaseStatsQuery::range(&conn, catalog, StatsFamily::V4, 5, 2),
            Err(Error::BadValue(_))
        ));
        assert!(SqlLeaseStatsQuery::range(&conn, catalog, StatsFamily::V4, 5, 5).is_ok());
    }

    #[test]
    fn test_v6_reports_lease_type() {
        let (conn, catalog) = setup();
        let mut query = SqlLeaseStatsQuery::all(&conn, catalog, StatsFamily::V6);
        query.start().unwrap();
        let types: Vec<_> = drain(&mut query).iter().map(|r| r.lease_type).collect();
        assert_eq!(types, vec![LeaseType::Na, LeaseType::Pd]);
    }
}
