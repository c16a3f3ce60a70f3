use chrono::{TimeDelta, Utc};

use dhcpstore::{
    ConfigBackendDhcp4, ConfigBackendRegistry, OptionDescriptor, ServerSelector, ServerTag,
    ServerTagged, SharedNetwork4, StampedValue, Subnet4,
};

fn backend() -> Box<dyn ConfigBackendDhcp4> {
    ConfigBackendRegistry::new().create("type=memory").unwrap()
}

fn selector(tag: &str) -> ServerSelector {
    ServerSelector::one(tag).unwrap()
}

#[test]
fn subnet_7_is_shadowed_for_server_a_only() {
    let mut backend = backend();
    let all = ServerSelector::All;

    backend
        .create_update_subnet4(&all, Subnet4::new(7, "192.0.2.0/24").unwrap())
        .unwrap();
    let by_id = backend.get_subnet4(&all, 7).unwrap().unwrap();
    let by_prefix = backend
        .get_subnet4_by_prefix(&all, "192.0.2.0/24")
        .unwrap()
        .unwrap();
    assert_eq!(by_id, by_prefix);

    let mut specific = Subnet4::new(7, "192.0.2.0/24").unwrap();
    specific.renew_timer = Some(600);
    backend
        .create_update_subnet4(&selector("srvA"), specific)
        .unwrap();

    let for_a = backend.get_subnet4(&selector("srvA"), 7).unwrap().unwrap();
    assert!(for_a.has_server_tag(&ServerTag::new("srvA").unwrap()));
    assert_eq!(for_a.renew_timer, Some(600));

    let for_b = backend.get_subnet4(&selector("srvB"), 7).unwrap().unwrap();
    assert!(for_b.has_all_server_tag());
    assert_eq!(for_b.renew_timer, None);
}

#[test]
fn all_servers_global_visible_until_shadowed() {
    let mut backend = backend();
    backend
        .create_update_global_parameter4(
            &ServerSelector::All,
            StampedValue::new("valid-lifetime", 3600).unwrap(),
        )
        .unwrap();

    let before = backend
        .get_global_parameter4(&selector("x"), "valid-lifetime")
        .unwrap()
        .unwrap();
    assert_eq!(before.as_integer(), Some(3600));

    backend
        .create_update_global_parameter4(
            &selector("x"),
            StampedValue::new("valid-lifetime", 7200).unwrap(),
        )
        .unwrap();
    let after = backend
        .get_global_parameter4(&selector("x"), "valid-lifetime")
        .unwrap()
        .unwrap();
    assert_eq!(after.as_integer(), Some(7200));

    let everything = backend
        .get_all_global_parameters4(&ServerSelector::Any)
        .unwrap();
    assert_eq!(everything.len(), 2);
}

#[test]
fn incremental_sync_sees_only_recent_changes() {
    let mut backend = backend();
    let all = ServerSelector::All;
    let cutoff = Utc::now() - TimeDelta::minutes(5);

    let mut old = SharedNetwork4::new("old").unwrap();
    old.modification_time = cutoff - TimeDelta::hours(1);
    backend.create_update_shared_network4(&all, old).unwrap();
    backend
        .create_update_shared_network4(&all, SharedNetwork4::new("new").unwrap())
        .unwrap();

    let modified = backend
        .get_modified_shared_networks4(&selector("srv1"), cutoff)
        .unwrap();
    let names: Vec<_> = modified.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["new"]);

    let mut option = OptionDescriptor::new(6, "dhcp4", "192.0.2.53");
    option.modification_time = cutoff - TimeDelta::seconds(1);
    backend.create_update_option4(&all, option).unwrap();
    assert!(
        backend
            .get_modified_options4(&all, cutoff)
            .unwrap()
            .is_empty()
    );
}
