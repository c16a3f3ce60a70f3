use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use chrono::TimeDelta;
use serde_json::json;

use dhcpstore::lease::now_seconds;
use dhcpstore::{
    ClientId, Error, HwAddr, Lease4, LeaseState, LeaseStore, LeaseStoreRegistry, LeaseTransaction,
    ParameterMap, SqliteConnection,
};

fn sqlite_parameters(path: &Path) -> ParameterMap {
    ParameterMap::from([
        ("type".to_string(), "sqlite".to_string()),
        ("name".to_string(), path.display().to_string()),
    ])
}

/// Creates an on-disk lease database and opens a store on it.
fn on_disk_store(path: &Path) -> Box<dyn LeaseStore> {
    SqliteConnection::open(sqlite_parameters(path))
        .unwrap()
        .create_schema()
        .unwrap();
    LeaseStoreRegistry::new()
        .create_from_parameters(sqlite_parameters(path))
        .unwrap()
}

fn lease(last: u8, subnet_id: u32) -> Lease4 {
    Lease4::new(
        Ipv4Addr::new(10, 0, 0, last),
        Some(HwAddr::ether([0x08, 0x00, 0x2b, 0x01, 0x02, last])),
        Some(ClientId(vec![0x01, last])),
        3600,
        subnet_id,
    )
}

#[test]
fn lease4_add_get_update_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = on_disk_store(&dir.path().join("leases.db"));

    let mut original = Lease4::new(Ipv4Addr::new(10, 0, 0, 5), None, None, 3600, 1);
    original.hostname = "h1".to_string();
    assert!(store.add_lease4(&original).unwrap());

    let by_subnet = store.get_leases4_by_subnet(1).unwrap();
    assert_eq!(by_subnet, vec![original.clone()]);

    let mut renamed = original.clone();
    renamed.hostname = "h2".to_string();
    store.update_lease4(&renamed).unwrap();

    let fetched = store.get_lease4(original.address).unwrap().unwrap();
    assert_eq!(fetched.hostname, "h2");
    assert_eq!(fetched.address, original.address);
    assert_eq!(fetched.subnet_id, 1);
}

#[test]
fn user_context_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leases.db");

    let mut stored = lease(7, 3);
    stored.user_context = Some(json!({"ISC": {"relay-info": [1, 2, 3]}, "comment": "lab"}));
    stored.fqdn_fwd = true;
    stored.state = LeaseState::DECLINED;
    {
        let store = on_disk_store(&path);
        assert!(store.add_lease4(&stored).unwrap());
    }

    let store = LeaseStoreRegistry::new()
        .create_from_parameters(sqlite_parameters(&path))
        .unwrap();
    assert_eq!(store.get_lease4(stored.address).unwrap(), Some(stored));
}

#[test]
fn duplicate_add_leaves_row_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = on_disk_store(&dir.path().join("leases.db"));

    let first = lease(1, 1);
    assert!(store.add_lease4(&first).unwrap());

    let mut second = first.clone();
    second.hostname = "intruder".to_string();
    second.subnet_id = 99;
    assert!(!store.add_lease4(&second).unwrap());

    assert_eq!(store.get_lease4(first.address).unwrap(), Some(first));
}

#[test]
fn update_of_missing_lease_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = on_disk_store(&dir.path().join("leases.db"));
    store.add_lease4(&lease(1, 1)).unwrap();

    let result = store.update_lease4(&lease(2, 1));
    assert!(matches!(result, Err(Error::NoSuchLease(_))));
    assert_eq!(store.get_leases4().unwrap().len(), 1);
    assert!(store.get_lease4(Ipv4Addr::new(10, 0, 0, 2)).unwrap().is_none());
}

#[test]
fn reclamation_removes_only_old_reclaimed_leases() {
    let dir = tempfile::tempdir().unwrap();
    let store = on_disk_store(&dir.path().join("leases.db"));
    let now = now_seconds();

    // Reclaimed, expired two hours ago.
    let mut old_reclaimed = lease(1, 1);
    old_reclaimed.cltt = now - TimeDelta::hours(3);
    old_reclaimed.state = LeaseState::EXPIRED_RECLAIMED;

    // Reclaimed, expired ten minutes ago.
    let mut recent_reclaimed = lease(2, 1);
    recent_reclaimed.cltt = now - TimeDelta::minutes(70);
    recent_reclaimed.state = LeaseState::EXPIRED_RECLAIMED;

    // Expired two hours ago but not reclaimed.
    let mut old_default = lease(3, 1);
    old_default.cltt = now - TimeDelta::hours(3);

    // Active.
    let active = lease(4, 1);

    for l in [&old_reclaimed, &recent_reclaimed, &old_default, &active] {
        assert!(store.add_lease4(l).unwrap());
    }

    assert_eq!(store.delete_expired_reclaimed_leases4(3600).unwrap(), 1);

    let remaining: Vec<_> = store
        .get_leases4()
        .unwrap()
        .into_iter()
        .map(|l| l.address)
        .collect();
    assert_eq!(remaining.len(), 3);
    assert!(!remaining.contains(&old_reclaimed.address));

    let expired = store.get_expired_leases4(0).unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].address, old_default.address);
}

#[test]
fn dropped_transaction_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = on_disk_store(&dir.path().join("leases.db"));

    {
        let txn = LeaseTransaction::begin(store.as_ref()).unwrap();
        assert!(txn.add_lease4(&lease(1, 1)).unwrap());
    }
    assert!(store.get_leases4().unwrap().is_empty());

    let txn = LeaseTransaction::begin(store.as_ref()).unwrap();
    assert!(txn.add_lease4(&lease(2, 1)).unwrap());
    txn.commit().unwrap();
    assert_eq!(store.get_leases4().unwrap().len(), 1);
}

#[test]
fn paging_rejects_wrong_family() {
    let store = LeaseStoreRegistry::new()
        .create("type=sqlite name=:memory:")
        .unwrap();
    let page_size = dhcpstore::LeasePageSize::new(10).unwrap();
    let v6_bound: IpAddr = "2001:db8::1".parse().unwrap();
    assert!(matches!(
        store.get_leases4_page(v6_bound, page_size),
        Err(Error::InvalidAddressFamily(_))
    ));
    let v4_bound = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    assert!(matches!(
        store.get_leases6_page(v4_bound, page_size),
        Err(Error::InvalidAddressFamily(_))
    ));
}

#[test]
fn stats_count_leases_per_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = on_disk_store(&dir.path().join("leases.db"));

    let mut declined = lease(1, 1);
    declined.state = LeaseState::DECLINED;
    for l in [lease(2, 1), lease(3, 1), declined, lease(4, 2)] {
        store.add_lease4(&l).unwrap();
    }

    let mut query = store.start_subnet_lease_stats_query4(1).unwrap();
    let mut rows = Vec::new();
    while let Some(row) = query.next_row().unwrap() {
        rows.push((row.subnet_id, row.lease_state, row.state_count));
    }
    assert_eq!(
        rows,
        vec![(1, LeaseState::DEFAULT, 2), (1, LeaseState::DECLINED, 1)]
    );
}
