//! Configuration persistence shared by several DHCPv4 servers.
//!
//! [`ConfigBackendDhcp4`] is the contract every configuration backend
//! fulfils. Reads are scoped by a [`ServerSelector`] and follow the
//! visibility rule in [`crate::selector`]. Writes resolve the selector to a
//! single owning tag.
//!
//! [`MemoryConfigBackend4`] keeps everything in indexed [`Collection`]s and
//! is the reference every durable backend must match.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::collection::{Collection, EntryId, Indexed};
use crate::database::{ParameterMap, parse_access_string};
use crate::error::{Error, Result};
use crate::lease::SubnetId;
use crate::network::{OptionDefinition, OptionDescriptor, SharedNetwork4, Subnet4};
use crate::selector::{
    ServerSelector, ServerTag, ServerTagged, accepts_writes, select_visible, visible_in_group,
};
use crate::stamped::{AuditEntry, Server, StampedValue};

/// Storage contract for DHCPv4 configuration.
pub trait ConfigBackendDhcp4: Send {
    fn backend_type(&self) -> &str;

    fn parameters(&self) -> &ParameterMap;

    fn get_subnet4(&self, selector: &ServerSelector, subnet_id: SubnetId)
    -> Result<Option<Subnet4>>;

    fn get_subnet4_by_prefix(
        &self,
        selector: &ServerSelector,
        prefix: &str,
    ) -> Result<Option<Subnet4>>;

    fn get_all_subnets4(&self, selector: &ServerSelector) -> Result<Vec<Subnet4>>;

    /// Subnets modified at or after `since`, oldest first.
    fn get_modified_subnets4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<Subnet4>>;

    fn get_shared_network_subnets4(
        &self,
        selector: &ServerSelector,
        shared_network_name: &str,
    ) -> Result<Vec<Subnet4>>;

    fn get_shared_network4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<SharedNetwork4>>;

    fn get_all_shared_networks4(&self, selector: &ServerSelector) -> Result<Vec<SharedNetwork4>>;

    fn get_modified_shared_networks4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<SharedNetwork4>>;

    fn get_option_def4(
        &self,
        selector: &ServerSelector,
        code: u16,
        space: &str,
    ) -> Result<Option<OptionDefinition>>;

    fn get_all_option_defs4(&self, selector: &ServerSelector) -> Result<Vec<OptionDefinition>>;

    fn get_modified_option_defs4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<OptionDefinition>>;

    /// Global (server-wide) option with `code` in `space`.
    fn get_option4(
        &self,
        selector: &ServerSelector,
        code: u16,
        space: &str,
    ) -> Result<Option<OptionDescriptor>>;

    fn get_all_options4(&self, selector: &ServerSelector) -> Result<Vec<OptionDescriptor>>;

    fn get_modified_options4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<OptionDescriptor>>;

    fn get_global_parameter4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<StampedValue>>;

    fn get_all_global_parameters4(&self, selector: &ServerSelector) -> Result<Vec<StampedValue>>;

    fn get_modified_global_parameters4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<StampedValue>>;

    fn get_recent_audit_entries(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>>;

    fn get_all_servers4(&self) -> Result<Vec<Server>>;

    fn get_server4(&self, tag: &ServerTag) -> Result<Option<Server>>;

    fn create_update_subnet4(&mut self, selector: &ServerSelector, subnet: Subnet4) -> Result<()>;

    fn create_update_shared_network4(
        &mut self,
        selector: &ServerSelector,
        shared_network: SharedNetwork4,
    ) -> Result<()>;

    fn create_update_option_def4(
        &mut self,
        selector: &ServerSelector,
        option_def: OptionDefinition,
    ) -> Result<()>;

    fn create_update_option4(
        &mut self,
        selector: &ServerSelector,
        option: OptionDescriptor,
    ) -> Result<()>;

    fn create_update_shared_network_option4(
        &mut self,
        selector: &ServerSelector,
        shared_network_name: &str,
        option: OptionDescriptor,
    ) -> Result<()>;

    fn create_update_subnet_option4(
        &mut self,
        selector: &ServerSelector,
        subnet_id: SubnetId,
        option: OptionDescriptor,
    ) -> Result<()>;

    /// Sets an option on the pool starting at `pool_start`.
    fn create_update_pool_option4(
        &mut self,
        selector: &ServerSelector,
        pool_start: Ipv4Addr,
        pool_end: Ipv4Addr,
        option: OptionDescriptor,
    ) -> Result<()>;

    fn create_update_global_parameter4(
        &mut self,
        selector: &ServerSelector,
        value: StampedValue,
    ) -> Result<()>;

    fn create_update_server4(&mut self, server: Server) -> Result<()>;

    fn delete_subnet4(&mut self, selector: &ServerSelector, subnet_id: SubnetId) -> Result<u64>;

    fn delete_subnet4_by_prefix(&mut self, selector: &ServerSelector, prefix: &str)
    -> Result<u64>;

    fn delete_all_subnets4(&mut self, selector: &ServerSelector) -> Result<u64>;

    /// Deletes the subnets belonging to a shared network.
    fn delete_shared_network_subnets4(
        &mut self,
        selector: &ServerSelector,
        shared_network_name: &str,
    ) -> Result<u64>;

    /// Deletes a shared network. Its subnets are kept and detached.
    fn delete_shared_network4(&mut self, selector: &ServerSelector, name: &str) -> Result<u64>;

    fn delete_all_shared_networks4(&mut self, selector: &ServerSelector) -> Result<u64>;

    fn delete_option_def4(
        &mut self,
        selector: &ServerSelector,
        code: u16,
        space: &str,
    ) -> Result<u64>;

    fn delete_all_option_defs4(&mut self, selector: &ServerSelector) -> Result<u64>;

    fn delete_option4(&mut self, selector: &ServerSelector, code: u16, space: &str)
    -> Result<u64>;

    fn delete_shared_network_option4(
        &mut self,
        selector: &ServerSelector,
        shared_network_name: &str,
        code: u16,
        space: &str,
    ) -> Result<u64>;

    fn delete_subnet_option4(
        &mut self,
        selector: &ServerSelector,
        subnet_id: SubnetId,
        code: u16,
        space: &str,
    ) -> Result<u64>;

    fn delete_pool_option4(
        &mut self,
        selector: &ServerSelector,
        pool_start: Ipv4Addr,
        pool_end: Ipv4Addr,
        code: u16,
        space: &str,
    ) -> Result<u64>;

    fn delete_global_parameter4(&mut self, selector: &ServerSelector, name: &str) -> Result<u64>;

    fn delete_all_global_parameters4(&mut self, selector: &ServerSelector) -> Result<u64>;

    fn delete_server4(&mut self, tag: &ServerTag) -> Result<u64>;

    fn delete_all_servers4(&mut self) -> Result<u64>;
}

/// The entity `selector` sees among `candidates`, cloned.
fn visible_one<'a, T>(
    selector: &ServerSelector,
    candidates: impl Iterator<Item = (EntryId, &'a T)>,
) -> Option<T>
where
    T: ServerTagged + Clone + 'a,
{
    select_visible(selector, candidates.map(|(_, entity)| entity)).cloned()
}

/// Every entity `selector` sees, one key group at a time.
fn visible_all<'a, T>(collection: &'a Collection<T>, selector: &ServerSelector) -> Vec<&'a T>
where
    T: Indexed + ServerTagged,
{
    let mut seen = BTreeSet::new();
    let mut visible = Vec::new();
    for (_, entity) in collection.iter() {
        let key = entity.key();
        if seen.contains(&key) {
            continue;
        }
        visible.extend(visible_in_group(
            selector,
            collection.find(&key).map(|(_, e)| e),
        ));
        seen.insert(key);
    }
    visible
}

/// Visible entities modified at or after `since`, oldest first.
fn visible_modified<'a, T>(
    collection: &'a Collection<T>,
    selector: &ServerSelector,
    since: DateTime<Utc>,
) -> Vec<&'a T>
where
    T: Indexed + ServerTagged,
{
    let mut seen = BTreeSet::new();
    let mut modified = Vec::new();
    for (_, entity) in collection.modified_since(since) {
        let key = entity.key();
        if seen.contains(&key) {
            continue;
        }
        modified.extend(
            visible_in_group(selector, collection.find(&key).map(|(_, e)| e))
                .into_iter()
                .filter(|e| e.modification_time() >= since),
        );
        seen.insert(key);
    }
    modified.sort_by_key(|e| e.modification_time());
    modified
}

fn cloned<T: Clone>(entities: Vec<&T>) -> Vec<T> {
    entities.into_iter().cloned().collect()
}

/// The entity with `key` owned by `tag`.
fn find_in_scope<T>(collection: &Collection<T>, key: &T::Key, tag: &ServerTag) -> Option<EntryId>
where
    T: Indexed + ServerTagged,
{
    collection
        .find(key)
        .find(|(_, entity)| entity.has_server_tag(tag))
        .map(|(id, _)| id)
}

fn remove_all<T: Indexed>(collection: &mut Collection<T>, ids: Vec<EntryId>) -> u64 {
    ids.into_iter()
        .filter(|id| collection.remove(*id).is_some())
        .count() as u64
}

/// In-memory configuration backend.
///
/// Single-threaded: writes take `&mut self`. Share it across threads only
/// behind a lock.
#[derive(Debug, Default)]
pub struct MemoryConfigBackend4 {
    parameters: ParameterMap,
    subnets: Collection<Subnet4>,
    shared_networks: Collection<SharedNetwork4>,
    option_defs: Collection<OptionDefinition>,
    options: Collection<OptionDescriptor>,
    globals: Collection<StampedValue>,
    servers: Collection<Server>,
}

impl MemoryConfigBackend4 {
    pub const BACKEND_TYPE: &'static str = "memory";

    pub fn new() -> Self {
        Self::with_parameters(ParameterMap::from([(
            "type".to_string(),
            Self::BACKEND_TYPE.to_string(),
        )]))
    }

    pub fn with_parameters(parameters: ParameterMap) -> Self {
        Self {
            parameters,
            ..Self::default()
        }
    }

    /// Finds the first subnet with `subnet_id` that accepts writes from
    /// `selector`.
    fn writable_subnet(&self, selector: &ServerSelector, subnet_id: SubnetId) -> Result<EntryId> {
        let mut candidates = self.subnets.find(&subnet_id).peekable();
        if candidates.peek().is_none() {
            return Err(Error::BadValue(format!(
                "attempted to create or update option in a non existing subnet ID {subnet_id}"
            )));
        }
        candidates
            .find(|(_, subnet)| accepts_writes(selector, *subnet))
            .map(|(id, _)| id)
            .ok_or_else(|| {
                Error::BadValue(format!(
                    "attempted to create or update option in a subnet ID {subnet_id} \
                     not present in a selected server"
                ))
            })
    }

    fn writable_shared_network(&self, selector: &ServerSelector, name: &str) -> Result<EntryId> {
        let mut candidates = self.shared_networks.find(&name.to_string()).peekable();
        if candidates.peek().is_none() {
            return Err(Error::BadValue(format!(
                "attempted to create or update option in a non existing shared network {name}"
            )));
        }
        candidates
            .find(|(_, network)| accepts_writes(selector, *network))
            .map(|(id, _)| id)
            .ok_or_else(|| {
                Error::BadValue(format!(
                    "attempted to create or update option in a shared network {name} \
                     not present in a selected server"
                ))
            })
    }

    /// Clears the shared network name on subnets pointing at one of `names`.
    fn detach_subnets(&mut self, names: &BTreeSet<String>) {
        let ids: Vec<EntryId> = self
            .subnets
            .iter()
            .filter(|(_, subnet)| {
                subnet
                    .shared_network_name
                    .as_ref()
                    .is_some_and(|name| names.contains(name))
            })
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            self.subnets.update(id, |subnet| subnet.shared_network_name = None);
        }
    }
}

impl ConfigBackendDhcp4 for MemoryConfigBackend4 {
    fn backend_type(&self) -> &str {
        Self::BACKEND_TYPE
    }

    fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    fn get_subnet4(
        &self,
        selector: &ServerSelector,
        subnet_id: SubnetId,
    ) -> Result<Option<Subnet4>> {
        debug!(%selector, subnet_id, "get_subnet4");
        Ok(visible_one(selector, self.subnets.find(&subnet_id)))
    }

    fn get_subnet4_by_prefix(
        &self,
        selector: &ServerSelector,
        prefix: &str,
    ) -> Result<Option<Subnet4>> {
        debug!(%selector, prefix, "get_subnet4_by_prefix");
        Ok(visible_one(selector, self.subnets.find_alt(&prefix.to_string())))
    }

    fn get_all_subnets4(&self, selector: &ServerSelector) -> Result<Vec<Subnet4>> {
        debug!(%selector, "get_all_subnets4");
        Ok(cloned(visible_all(&self.subnets, selector)))
    }

    fn get_modified_subnets4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<Subnet4>> {
        debug!(%selector, %since, "get_modified_subnets4");
        Ok(cloned(visible_modified(&self.subnets, selector, since)))
    }

    fn get_shared_network_subnets4(
        &self,
        selector: &ServerSelector,
        shared_network_name: &str,
    ) -> Result<Vec<Subnet4>> {
        debug!(%selector, shared_network_name, "get_shared_network_subnets4");
        Ok(visible_all(&self.subnets, selector)
            .into_iter()
            .filter(|subnet| subnet.shared_network_name.as_deref() == Some(shared_network_name))
            .cloned()
            .collect())
    }

    fn get_shared_network4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<SharedNetwork4>> {
        debug!(%selector, name, "get_shared_network4");
        Ok(visible_one(selector, self.shared_networks.find(&name.to_string())))
    }

    fn get_all_shared_networks4(&self, selector: &ServerSelector) -> Result<Vec<SharedNetwork4>> {
        debug!(%selector, "get_all_shared_networks4");
        Ok(cloned(visible_all(&self.shared_networks, selector)))
    }

    fn get_modified_shared_networks4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<SharedNetwork4>> {
        debug!(%selector, %since, "get_modified_shared_networks4");
        Ok(cloned(visible_modified(&self.shared_networks, selector, since)))
    }

    fn get_option_def4(
        &self,
        selector: &ServerSelector,
        code: u16,
        space: &str,
    ) -> Result<Option<OptionDefinition>> {
        debug!(%selector, code, space, "get_option_def4");
        Ok(visible_one(
            selector,
            self.option_defs.find(&(code, space.to_string())),
        ))
    }

    fn get_all_option_defs4(&self, selector: &ServerSelector) -> Result<Vec<OptionDefinition>> {
        debug!(%selector, "get_all_option_defs4");
        Ok(cloned(visible_all(&self.option_defs, selector)))
    }

    fn get_modified_option_defs4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<OptionDefinition>> {
        debug!(%selector, %since, "get_modified_option_defs4");
        Ok(cloned(visible_modified(&self.option_defs, selector, since)))
    }

    fn get_option4(
        &self,
        selector: &ServerSelector,
        code: u16,
        space: &str,
    ) -> Result<Option<OptionDescriptor>> {
        debug!(%selector, code, space, "get_option4");
        Ok(visible_one(selector, self.options.find(&(code, space.to_string()))))
    }

    fn get_all_options4(&self, selector: &ServerSelector) -> Result<Vec<OptionDescriptor>> {
        debug!(%selector, "get_all_options4");
        Ok(cloned(visible_all(&self.options, selector)))
    }

    fn get_modified_options4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<OptionDescriptor>> {
        debug!(%selector, %since, "get_modified_options4");
        Ok(cloned(visible_modified(&self.options, selector, since)))
    }

    fn get_global_parameter4(
        &self,
        selector: &ServerSelector,
        name: &str,
    ) -> Result<Option<StampedValue>> {
        debug!(%selector, name, "get_global_parameter4");
        Ok(visible_one(selector, self.globals.find(&name.to_string())))
    }

    fn get_all_global_parameters4(&self, selector: &ServerSelector) -> Result<Vec<StampedValue>> {
        debug!(%selector, "get_all_global_parameters4");
        Ok(cloned(visible_all(&self.globals, selector)))
    }

    fn get_modified_global_parameters4(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<StampedValue>> {
        debug!(%selector, %since, "get_modified_global_parameters4");
        Ok(cloned(visible_modified(&self.globals, selector, since)))
    }

    fn get_recent_audit_entries(
        &self,
        selector: &ServerSelector,
        since: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>> {
        debug!(%selector, %since, "get_recent_audit_entries");
        Ok(Vec::new())
    }

    fn get_all_servers4(&self) -> Result<Vec<Server>> {
        debug!("get_all_servers4");
        Ok(self.servers.iter().map(|(_, server)| server.clone()).collect())
    }

    fn get_server4(&self, tag: &ServerTag) -> Result<Option<Server>> {
        debug!(%tag, "get_server4");
        Ok(self.servers.find(tag).next().map(|(_, server)| server.clone()))
    }

    fn create_update_subnet4(
        &mut self,
        selector: &ServerSelector,
        mut subnet: Subnet4,
    ) -> Result<()> {
        let tag = selector.owning_tag()?;
        debug!(%tag, subnet_id = subnet.id, prefix = subnet.prefix(), "create_update_subnet4");

        let existing = find_in_scope(&self.subnets, &subnet.id, &tag);
        let conflict = self
            .subnets
            .find_alt(&subnet.prefix().to_string())
            .find(|(id, other)| Some(*id) != existing && other.has_server_tag(&tag));
        if let Some((_, other)) = conflict {
            return Err(Error::BadValue(format!(
                "subnet {} conflicts with subnet ID {} using the same prefix for server {tag}",
                subnet.prefix(),
                other.id
            )));
        }

        match existing {
            Some(id) => {
                if let Some(old) = self.subnets.get(id) {
                    subnet.server_tags.extend(old.server_tags.iter().cloned());
                }
                subnet.set_server_tag(tag);
                self.subnets.replace(id, subnet);
            }
            None => {
                subnet.set_server_tag(tag);
                self.subnets.insert(subnet);
            }
        }
        Ok(())
    }

    fn create_update_shared_network4(
        &mut self,
        selector: &ServerSelector,
        mut shared_network: SharedNetwork4,
    ) -> Result<()> {
        let tag = selector.owning_tag()?;
        debug!(%tag, name = %shared_network.name, "create_update_shared_network4");

        match find_in_scope(&self.shared_networks, &shared_network.name, &tag) {
            Some(id) => {
                if let Some(old) = self.shared_networks.get(id) {
                    shared_network
                        .server_tags
                        .extend(old.server_tags.iter().cloned());
                }
                shared_network.set_server_tag(tag);
                self.shared_networks.replace(id, shared_network);
            }
            None => {
                shared_network.set_server_tag(tag);
                self.shared_networks.insert(shared_network);
            }
        }
        Ok(())
    }

    fn create_update_option_def4(
        &mut self,
        selector: &ServerSelector,
        mut option_def: OptionDefinition,
    ) -> Result<()> {
        let tag = selector.owning_tag()?;
        debug!(
            %tag,
            code = option_def.code,
            name = %option_def.name,
            space = %option_def.space,
            "create_update_option_def4"
        );
        option_def.set_server_tag(tag.clone());

        let existing = find_in_scope(&self.option_defs, &option_def.key(), &tag).or_else(|| {
            option_def.alt_key().and_then(|alt| {
                self.option_defs
                    .find_alt(&alt)
                    .find(|(_, def)| def.has_server_tag(&tag))
                    .map(|(id, _)| id)
            })
        });
        match existing {
            Some(id) => {
                self.option_defs.replace(id, option_def);
            }
            None => {
                self.option_defs.insert(option_def);
            }
        }
        Ok(())
    }

    fn create_update_option4(
        &mut self,
        selector: &ServerSelector,
        mut option: OptionDescriptor,
    ) -> Result<()> {
        let tag = selector.owning_tag()?;
        debug!(%tag, code = option.code, space = %option.space, "create_update_option4");
        option.set_server_tag(tag.clone());

        match find_in_scope(&self.options, &option.key(), &tag) {
            Some(id) => {
                self.options.replace(id, option);
            }
            None => {
                self.options.insert(option);
            }
        }
        Ok(())
    }

    fn create_update_shared_network_option4(
        &mut self,
        selector: &ServerSelector,
        shared_network_name: &str,
        option: OptionDescriptor,
    ) -> Result<()> {
        debug!(
            %selector,
            shared_network_name,
            code = option.code,
            space = %option.space,
            "create_update_shared_network_option4"
        );
        let id = self.writable_shared_network(selector, shared_network_name)?;
        self.shared_networks.update(id, |network| {
            network.options.add(option);
            network.modification_time = Utc::now();
        });
        Ok(())
    }

    fn create_update_subnet_option4(
        &mut self,
        selector: &ServerSelector,
        subnet_id: SubnetId,
        option: OptionDescriptor,
    ) -> Result<()> {
        debug!(
            %selector,
            subnet_id,
            code = option.code,
            space = %option.space,
            "create_update_subnet_option4"
        );
        let id = self.writable_subnet(selector, subnet_id)?;
        self.subnets.update(id, |subnet| {
            subnet.options.add(option);
            subnet.modification_time = Utc::now();
        });
        Ok(())
    }

    fn create_update_pool_option4(
        &mut self,
        selector: &ServerSelector,
        pool_start: Ipv4Addr,
        pool_end: Ipv4Addr,
        option: OptionDescriptor,
    ) -> Result<()> {
        debug!(
            %selector,
            %pool_start,
            %pool_end,
            code = option.code,
            space = %option.space,
            "create_update_pool_option4"
        );
        let mut found_elsewhere = false;
        let mut target = None;
        for (id, subnet) in self.subnets.iter() {
            if subnet.get_pool(pool_start).is_none() {
                continue;
            }
            if accepts_writes(selector, subnet) {
                target = Some(id);
                break;
            }
            found_elsewhere = true;
        }

        let Some(id) = target else {
            return Err(if found_elsewhere {
                Error::BadValue(format!(
                    "attempted to create or update option in a pool {pool_start} - {pool_end} \
                     not present in a selected server"
                ))
            } else {
                Error::BadValue(format!(
                    "attempted to create or update option in a non existing pool \
                     {pool_start} - {pool_end}"
                ))
            });
        };
        self.subnets.update(id, |subnet| {
            if let Some(pool) = subnet.get_pool_mut(pool_start) {
                pool.options.add(option);
                subnet.modification_time = Utc::now();
            }
        });
        Ok(())
    }

    fn create_update_global_parameter4(
        &mut self,
        selector: &ServerSelector,
        mut value: StampedValue,
    ) -> Result<()> {
        let tag = selector.owning_tag()?;
        debug!(%tag, name = value.name(), "create_update_global_parameter4");
        value.set_server_tag(tag.clone());

        match find_in_scope(&self.globals, &value.key(), &tag) {
            Some(id) => {
                self.globals.replace(id, value);
            }
            None => {
                self.globals.insert(value);
            }
        }
        Ok(())
    }

    fn create_update_server4(&mut self, server: Server) -> Result<()> {
        debug!(tag = %server.tag, "create_update_server4");
        if server.tag.is_all() {
            return Err(Error::BadValue(
                "'all' is a reserved server tag and cannot name a server".into(),
            ));
        }
        let existing = self.servers.find(&server.tag).next().map(|(id, _)| id);
        match existing {
            Some(id) => {
                self.servers.replace(id, server);
            }
            None => {
                self.servers.insert(server);
            }
        }
        Ok(())
    }

    fn delete_subnet4(&mut self, _selector: &ServerSelector, subnet_id: SubnetId) -> Result<u64> {
        debug!(subnet_id, "delete_subnet4");
        let ids = self.subnets.find(&subnet_id).map(|(id, _)| id).collect();
        Ok(remove_all(&mut self.subnets, ids))
    }

    fn delete_subnet4_by_prefix(
        &mut self,
        _selector: &ServerSelector,
        prefix: &str,
    ) -> Result<u64> {
        debug!(prefix, "delete_subnet4_by_prefix");
        let ids = self
            .subnets
            .find_alt(&prefix.to_string())
            .map(|(id, _)| id)
            .collect();
        Ok(remove_all(&mut self.subnets, ids))
    }

    fn delete_all_subnets4(&mut self, _selector: &ServerSelector) -> Result<u64> {
        debug!("delete_all_subnets4");
        Ok(self.subnets.clear())
    }

    fn delete_shared_network_subnets4(
        &mut self,
        _selector: &ServerSelector,
        shared_network_name: &str,
    ) -> Result<u64> {
        debug!(shared_network_name, "delete_shared_network_subnets4");
        Ok(self.subnets.remove_where(|subnet| {
            subnet.shared_network_name.as_deref() == Some(shared_network_name)
        }))
    }

    fn delete_shared_network4(&mut self, _selector: &ServerSelector, name: &str) -> Result<u64> {
        debug!(name, "delete_shared_network4");
        self.detach_subnets(&BTreeSet::from([name.to_string()]));
        let ids = self
            .shared_networks
            .find(&name.to_string())
            .map(|(id, _)| id)
            .collect();
        Ok(remove_all(&mut self.shared_networks, ids))
    }

    fn delete_all_shared_networks4(&mut self, _selector: &ServerSelector) -> Result<u64> {
        debug!("delete_all_shared_networks4");
        let names = self
            .shared_networks
            .iter()
            .map(|(_, network)| network.name.clone())
            .collect();
        self.detach_subnets(&names);
        Ok(self.shared_networks.clear())
    }

    fn delete_option_def4(
        &mut self,
        selector: &ServerSelector,
        code: u16,
        space: &str,
    ) -> Result<u64> {
        let tag = selector.owning_tag()?;
        debug!(%tag, code, space, "delete_option_def4");
        Ok(self.option_defs.remove_where(|def| {
            def.code == code && def.space == space && def.has_server_tag(&tag)
        }))
    }

    fn delete_all_option_defs4(&mut self, selector: &ServerSelector) -> Result<u64> {
        let tag = selector.owning_tag()?;
        debug!(%tag, "delete_all_option_defs4");
        Ok(self.option_defs.remove_where(|def| def.has_server_tag(&tag)))
    }

    fn delete_option4(
        &mut self,
        selector: &ServerSelector,
        code: u16,
        space: &str,
    ) -> Result<u64> {
        let tag = selector.owning_tag()?;
        debug!(%tag, code, space, "delete_option4");
        Ok(self.options.remove_where(|option| {
            option.code == code && option.space == space && option.has_server_tag(&tag)
        }))
    }

    fn delete_shared_network_option4(
        &mut self,
        _selector: &ServerSelector,
        shared_network_name: &str,
        code: u16,
        space: &str,
    ) -> Result<u64> {
        debug!(shared_network_name, code, space, "delete_shared_network_option4");
        let ids: Vec<EntryId> = self
            .shared_networks
            .find(&shared_network_name.to_string())
            .map(|(id, _)| id)
            .collect();
        if ids.is_empty() {
            return Err(Error::BadValue(format!(
                "attempted to delete an option in a non existing shared network \
                 {shared_network_name}"
            )));
        }
        Ok(ids
            .into_iter()
            .filter_map(|id| {
                self.shared_networks.update(id, |network| {
                    let deleted = network.options.del(space, code);
                    if deleted > 0 {
                        network.modification_time = Utc::now();
                    }
                    deleted
                })
            })
            .sum())
    }

    fn delete_subnet_option4(
        &mut self,
        _selector: &ServerSelector,
        subnet_id: SubnetId,
        code: u16,
        space: &str,
    ) -> Result<u64> {
        debug!(subnet_id, code, space, "delete_subnet_option4");
        let ids: Vec<EntryId> = self.subnets.find(&subnet_id).map(|(id, _)| id).collect();
        if ids.is_empty() {
            return Err(Error::BadValue(format!(
                "attempted to delete an option in a non existing subnet ID {subnet_id}"
            )));
        }
        Ok(ids
            .into_iter()
            .filter_map(|id| {
                self.subnets.update(id, |subnet| {
                    let deleted = subnet.options.del(space, code);
                    if deleted > 0 {
                        subnet.modification_time = Utc::now();
                    }
                    deleted
                })
            })
            .sum())
    }

    fn delete_pool_option4(
        &mut self,
        _selector: &ServerSelector,
        pool_start: Ipv4Addr,
        pool_end: Ipv4Addr,
        code: u16,
        space: &str,
    ) -> Result<u64> {
        debug!(%pool_start, %pool_end, code, space, "delete_pool_option4");
        // Only the first subnet holding the pool is touched.
        let id = self
            .subnets
            .iter()
            .find(|(_, subnet)| subnet.get_pool(pool_start).is_some())
            .map(|(id, _)| id)
            .ok_or_else(|| {
                Error::BadValue(format!(
                    "attempted to delete an option in a non existing pool \
                     {pool_start} - {pool_end}"
                ))
            })?;
        let deleted = self.subnets.update(id, |subnet| {
            let deleted = subnet
                .get_pool_mut(pool_start)
                .map_or(0, |pool| pool.options.del(space, code));
            if deleted > 0 {
                subnet.modification_time = Utc::now();
            }
            deleted
        });
        Ok(deleted.unwrap_or(0))
    }

    fn delete_global_parameter4(&mut self, selector: &ServerSelector, name: &str) -> Result<u64> {
        let tag = selector.owning_tag()?;
        debug!(%tag, name, "delete_global_parameter4");
        match find_in_scope(&self.globals, &name.to_string(), &tag) {
            Some(id) => Ok(remove_all(&mut self.globals, vec![id])),
            None => Ok(0),
        }
    }

    fn delete_all_global_parameters4(&mut self, selector: &ServerSelector) -> Result<u64> {
        let tag = selector.owning_tag()?;
        debug!(%tag, "delete_all_global_parameters4");
        Ok(self.globals.remove_where(|value| value.has_server_tag(&tag)))
    }

    fn delete_server4(&mut self, tag: &ServerTag) -> Result<u64> {
        debug!(%tag, "delete_server4");
        let ids = self.servers.find(tag).map(|(id, _)| id).collect();
        Ok(remove_all(&mut self.servers, ids))
    }

    fn delete_all_servers4(&mut self) -> Result<u64> {
        debug!("delete_all_servers4");
        Ok(self.servers.clear())
    }
}

pub type ConfigBackendFactory = fn(ParameterMap) -> Result<Box<dyn ConfigBackendDhcp4>>;

fn create_memory(parameters: ParameterMap) -> Result<Box<dyn ConfigBackendDhcp4>> {
    Ok(Box::new(MemoryConfigBackend4::with_parameters(parameters)))
}

/// Configuration backend factories keyed by backend type.
#[derive(Debug, Clone)]
pub struct ConfigBackendRegistry {
    factories: BTreeMap<String, ConfigBackendFactory>,
}

impl Default for ConfigBackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBackendRegistry {
    /// Creates a registry with the built-in `memory` backend.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register(MemoryConfigBackend4::BACKEND_TYPE, create_memory);
        registry
    }

    /// Registers a factory. Returns `false` if the type is already taken.
    pub fn register(&mut self, backend_type: &str, factory: ConfigBackendFactory) -> bool {
        if self.factories.contains_key(backend_type) {
            return false;
        }
        self.factories.insert(backend_type.to_string(), factory);
        true
    }

    pub fn deregister(&mut self, backend_type: &str) -> bool {
        self.factories.remove(backend_type).is_some()
    }

    pub fn registered_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn create(&self, access: &str) -> Result<Box<dyn ConfigBackendDhcp4>> {
        self.create_from_parameters(parse_access_string(access)?)
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `type` is missing and
    /// [`Error::UnknownBackend`] if no factory handles it.
    pub fn create_from_parameters(
        &self,
        parameters: ParameterMap,
    ) -> Result<Box<dyn ConfigBackendDhcp4>> {
        let backend_type = parameters.get("type").ok_or_else(|| {
            Error::InvalidConfig("config database access string must contain 'type'".into())
        })?;
        let factory = self
            .factories
            .get(backend_type)
            .ok_or_else(|| Error::UnknownBackend(backend_type.clone()))?;
        info!(
            "Opening config database: {}",
            crate::database::redacted_access_string(&parameters)
        );
        factory(parameters)
    }
}
