use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use azacc_domain::{
    CreateOption, CreationData, DataDisk, Disk, DiskEntry, DiskProperties, DiskSku,
    ManagedDiskParameters, OsDisk, StorageProfile, VirtualHardDisk, VirtualMachine,
    VirtualMachineProperties,
};
use azacc_fixture::{
    validate_disks, validate_references, Body, Document, Resource, Value, MANAGED_DISK,
    NETWORK_INTERFACE, RESOURCE_GROUP, SUBNET, VIRTUAL_MACHINE, VIRTUAL_NETWORK,
};
use serde_json::{json, Value as Json};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::{ComputeClient, Lookup};
use crate::engine::{ApplyEngine, ResourceState, State};
use crate::error::{ApplyError, DriverError};

pub const LOCAL_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

type Attributes = BTreeMap<String, Json>;

// ── LocalCloud ────────────────────────────────────────────────────────────────

/// In-memory stand-in for the Azure resources the fixtures declare.
///
/// - Applies documents the way the provider would: field validation first,
///   then removed or changed resources destroyed, then new ones created.
/// - VMs create implicit managed disks for every disk block without `vhd_uri`.
/// - Serves the compute read API from the same store, so checks observe what
///   the apply produced.
///
/// Cloning yields another handle onto the same cloud.
#[derive(Clone)]
pub struct LocalCloud {
    inner: Arc<RwLock<Inner>>,
}

enum Object {
    Group,
    Network,
    Disk(Disk),
    Machine(Machine),
}

struct Machine {
    vm: VirtualMachine,
    delete_os_disk: bool,
    delete_data_disks: bool,
}

struct Inner {
    subscription_id: String,
    applied: Option<Document>,
    state: State,
    /// Addresses present in `state`, in creation order.
    order: Vec<String>,
    /// Cloud objects keyed by lower-cased resource id.
    objects: BTreeMap<String, Object>,
    unavailable: bool,
}

impl Default for LocalCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCloud {
    pub fn new() -> Self {
        Self::with_subscription(LOCAL_SUBSCRIPTION)
    }

    pub fn with_subscription(subscription_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                subscription_id: subscription_id.into(),
                applied: None,
                state: State::default(),
                order: Vec::new(),
                objects: BTreeMap::new(),
                unavailable: false,
            })),
        }
    }

    /// Make every read fail with a transport error until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().await.unavailable = unavailable;
    }

    /// Number of managed disks currently in the cloud.
    pub async fn disk_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner
            .objects
            .values()
            .filter(|o| matches!(o, Object::Disk(_)))
            .count()
    }

    /// Number of cloud objects of any kind.
    pub async fn object_count(&self) -> usize {
        self.inner.read().await.objects.len()
    }

    pub async fn state(&self) -> State {
        self.inner.read().await.state.clone()
    }

    fn compute_key(subscription_id: &str, resource_group: &str, collection: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/{}/{}",
            subscription_id, resource_group, collection, name
        )
        .to_lowercase()
    }
}

// ── ApplyEngine ───────────────────────────────────────────────────────────────

#[async_trait]
impl ApplyEngine for LocalCloud {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn apply(&self, document: &Document) -> Result<State, ApplyError> {
        validate_disks(document).map_err(|e| ApplyError::Rejected(e.to_string()))?;
        let resolved =
            validate_references(document).map_err(|e| ApplyError::Rejected(e.to_string()))?;

        let mut inner = self.inner.write().await;
        let previous = inner.applied.take().unwrap_or_default();

        let mut stale: HashSet<String> = previous
            .resources
            .iter()
            .filter(|old| document.resource(&old.address()) != Some(*old))
            .map(Resource::address)
            .collect();
        // Anything referring to a replaced resource is replaced with it.
        for address in &resolved.creation_order {
            let Some(resource) = document.resource(address) else {
                continue;
            };
            if inner.state.get(address).is_some()
                && resource
                    .body
                    .references()
                    .iter()
                    .any(|r| stale.contains(&r.target()))
            {
                stale.insert(address.clone());
            }
        }

        inner.applied = Some(document.clone());

        let doomed: Vec<String> = inner
            .order
            .iter()
            .rev()
            .filter(|a| stale.contains(*a))
            .cloned()
            .collect();
        for address in doomed {
            inner.destroy(&address)?;
        }

        for address in &resolved.creation_order {
            if inner.state.get(address).is_some() {
                continue;
            }
            if let Some(resource) = document.resource(address) {
                inner.create(resource)?;
            }
        }

        info!(resources = inner.state.resources.len(), "local apply complete");
        Ok(inner.state.clone())
    }

    async fn destroy(&self) -> Result<(), ApplyError> {
        let mut inner = self.inner.write().await;
        let doomed: Vec<String> = inner.order.iter().rev().cloned().collect();
        for address in doomed {
            inner.destroy(&address)?;
        }
        inner.applied = None;
        info!(remaining = inner.objects.len(), "local destroy complete");
        Ok(())
    }
}

// ── ComputeClient ─────────────────────────────────────────────────────────────

#[async_trait]
impl ComputeClient for LocalCloud {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_disk(&self, resource_group: &str, name: &str) -> Lookup<Disk> {
        let subscription_id = self.inner.read().await.subscription_id.clone();
        self.get_disk_in(&subscription_id, resource_group, name).await
    }

    async fn get_disk_in(&self, subscription_id: &str, resource_group: &str, name: &str) -> Lookup<Disk> {
        let inner = self.inner.read().await;
        if inner.unavailable {
            return Lookup::TransportError(DriverError::Transport("local cloud unavailable".into()));
        }
        let key = Self::compute_key(subscription_id, resource_group, "disks", name);
        match inner.objects.get(&key) {
            Some(Object::Disk(disk)) => Lookup::Found(disk.clone()),
            _ => Lookup::NotFound,
        }
    }

    async fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Lookup<VirtualMachine> {
        let inner = self.inner.read().await;
        if inner.unavailable {
            return Lookup::TransportError(DriverError::Transport("local cloud unavailable".into()));
        }
        let key = Self::compute_key(&inner.subscription_id, resource_group, "virtualMachines", name);
        match inner.objects.get(&key) {
            Some(Object::Machine(machine)) => Lookup::Found(machine.vm.clone()),
            _ => Lookup::NotFound,
        }
    }
}

// ── Simulation ────────────────────────────────────────────────────────────────

/// A disk block resolved against the cloud, before anything is committed.
struct PlannedDisk {
    name: String,
    caching: Option<String>,
    create_option: CreateOption,
    size: Option<u32>,
    managed: Option<ManagedDiskParameters>,
    vhd: Option<VirtualHardDisk>,
}

impl Inner {
    fn create(&mut self, resource: &Resource) -> Result<(), ApplyError> {
        let address = resource.address();
        let mut attributes = self.resolve_body(&resource.body)?;
        let name = required_str(&address, &attributes, "name")?.to_string();

        let id = match resource.resource_type.as_str() {
            RESOURCE_GROUP => {
                let id = format!("/subscriptions/{}/resourceGroups/{}", self.subscription_id, name);
                self.claim(&id, Object::Group)?;
                id
            }
            VIRTUAL_NETWORK => {
                let group = self.group_of(&address, &attributes)?;
                let id = format!("{}/providers/Microsoft.Network/virtualNetworks/{}", group, name);
                self.claim(&id, Object::Network)?;
                id
            }
            SUBNET => {
                let group = self.group_of(&address, &attributes)?;
                let vnet = format!(
                    "{}/providers/Microsoft.Network/virtualNetworks/{}",
                    group,
                    required_str(&address, &attributes, "virtual_network_name")?
                );
                self.require(&address, "Virtual Network", &vnet)?;
                let id = format!("{}/subnets/{}", vnet, name);
                self.claim(&id, Object::Network)?;
                id
            }
            NETWORK_INTERFACE => {
                let group = self.group_of(&address, &attributes)?;
                for config in resource.body.blocks("ip_configuration") {
                    let config = self.resolve_body(config)?;
                    if let Some(subnet) = config.get("subnet_id").and_then(Json::as_str) {
                        self.require(&address, "Subnet", subnet)?;
                    }
                }
                let id = format!("{}/providers/Microsoft.Network/networkInterfaces/{}", group, name);
                self.claim(&id, Object::Network)?;
                id
            }
            MANAGED_DISK => {
                let group = self.group_of(&address, &attributes)?;
                let id = format!("{}/providers/Microsoft.Compute/disks/{}", group, name);
                let disk = Disk {
                    id: id.clone(),
                    name: name.clone(),
                    location: optional_str(&attributes, "location").unwrap_or_default(),
                    sku: optional_str(&attributes, "storage_account_type").map(|name| DiskSku { name }),
                    properties: DiskProperties {
                        disk_size_gb: optional_u32(&attributes, "disk_size_gb"),
                        creation_data: Some(CreationData {
                            create_option: create_option(&address, &attributes)?,
                        }),
                        provisioning_state: Some("Succeeded".into()),
                        disk_state: Some("Unattached".into()),
                    },
                };
                self.claim(&id, Object::Disk(disk))?;
                id
            }
            VIRTUAL_MACHINE => self.create_machine(&address, &name, &attributes, &resource.body)?,
            other => {
                return Err(ApplyError::Rejected(format!(
                    "{}: resource type {:?} is not supported by the local cloud",
                    address, other
                )))
            }
        };

        debug!(address = %address, id = %id, "local resource created");
        attributes.insert("id".into(), json!(id));
        self.state.insert(ResourceState {
            resource_type: resource.resource_type.clone(),
            name: resource.name.clone(),
            id,
            attributes,
        });
        self.order.push(address);
        Ok(())
    }

    fn create_machine(
        &mut self,
        address: &str,
        name: &str,
        attributes: &Attributes,
        body: &Body,
    ) -> Result<String, ApplyError> {
        let group = self.group_of(address, attributes)?;
        let id = format!("{}/providers/Microsoft.Compute/virtualMachines/{}", group, name);
        if self.objects.contains_key(&id.to_lowercase()) {
            return Err(already_exists(&id));
        }
        if let Some(Json::Array(nics)) = attributes.get("network_interface_ids") {
            for nic in nics {
                self.require(address, "Network Interface", nic.as_str().unwrap_or_default())?;
            }
        }

        let location = optional_str(attributes, "location").unwrap_or_default();
        let mut planned = Vec::new();

        let os_disk = match body.blocks("storage_os_disk").next() {
            Some(block) => {
                let disk = self.plan_disk(address, &group, &location, block, &mut planned)?;
                Some(OsDisk {
                    name: disk.name,
                    caching: disk.caching,
                    create_option: Some(disk.create_option),
                    disk_size_gb: disk.size,
                    managed_disk: disk.managed,
                    vhd: disk.vhd,
                })
            }
            None => None,
        };

        let mut data_disks = Vec::new();
        for block in body.blocks("storage_data_disk") {
            let lun = match block.get("lun") {
                Some(Value::Int(lun)) => i32::try_from(*lun).map_err(|_| {
                    ApplyError::Rejected(format!(
                        "{}: `lun` {} on `storage_data_disk` is out of range",
                        address, lun
                    ))
                })?,
                _ => 0,
            };
            let disk = self.plan_disk(address, &group, &location, block, &mut planned)?;
            data_disks.push(DataDisk {
                name: disk.name,
                lun,
                caching: disk.caching,
                create_option: Some(disk.create_option),
                disk_size_gb: disk.size,
                managed_disk: disk.managed,
                vhd: disk.vhd,
            });
        }

        for disk in planned {
            debug!(vm = %name, disk = %disk.id, "implicit managed disk created");
            self.objects.insert(disk.id.to_lowercase(), Object::Disk(disk));
        }

        let machine = Machine {
            vm: VirtualMachine {
                id: Some(id.clone()),
                name: name.to_string(),
                location,
                properties: VirtualMachineProperties {
                    vm_id: None,
                    provisioning_state: Some("Succeeded".into()),
                    storage_profile: StorageProfile { os_disk, data_disks },
                },
            },
            delete_os_disk: flag(attributes, "delete_os_disk_on_termination"),
            delete_data_disks: flag(attributes, "delete_data_disks_on_termination"),
        };
        self.objects.insert(id.to_lowercase(), Object::Machine(machine));
        Ok(id)
    }

    fn plan_disk(
        &self,
        address: &str,
        group: &str,
        location: &str,
        block: &Body,
        planned: &mut Vec<Disk>,
    ) -> Result<PlannedDisk, ApplyError> {
        let attributes = self.resolve_body(block)?;
        let name = required_str(address, &attributes, "name")?.to_string();
        let create_option = create_option(address, &attributes)?;
        let size = optional_u32(&attributes, "disk_size_gb");
        let caching = optional_str(&attributes, "caching");

        if let Some(uri) = optional_str(&attributes, "vhd_uri") {
            return Ok(PlannedDisk {
                name,
                caching,
                create_option,
                size,
                managed: None,
                vhd: Some(VirtualHardDisk { uri: Some(uri) }),
            });
        }

        let managed = match optional_str(&attributes, "managed_disk_id") {
            Some(id) => {
                let Some(Object::Disk(existing)) = self.objects.get(&id.to_lowercase()) else {
                    return Err(ApplyError::Rejected(format!(
                        "{}: Managed Disk {:?} was not found",
                        address, id
                    )));
                };
                ManagedDiskParameters {
                    storage_account_type: existing.sku.as_ref().map(|s| s.name.clone()),
                    id: Some(existing.id.clone()),
                }
            }
            None if create_option == CreateOption::Attach => {
                return Err(ApplyError::Rejected(format!(
                    "{}: [ERROR] Must specify `vhd_uri` or `managed_disk_id` to attach",
                    address
                )));
            }
            None => {
                let id = format!("{}/providers/Microsoft.Compute/disks/{}", group, name);
                if self.objects.contains_key(&id.to_lowercase())
                    || planned.iter().any(|d| d.id.eq_ignore_ascii_case(&id))
                {
                    return Err(already_exists(&id));
                }
                let sku = optional_str(&attributes, "managed_disk_type")
                    .unwrap_or_else(|| "Standard_LRS".to_string());
                planned.push(Disk {
                    id: id.clone(),
                    name: name.clone(),
                    location: location.to_string(),
                    sku: Some(DiskSku { name: sku.clone() }),
                    properties: DiskProperties {
                        disk_size_gb: size,
                        creation_data: Some(CreationData { create_option }),
                        provisioning_state: Some("Succeeded".into()),
                        disk_state: Some("Attached".into()),
                    },
                });
                ManagedDiskParameters {
                    id: Some(id),
                    storage_account_type: Some(sku),
                }
            }
        };

        Ok(PlannedDisk {
            name,
            caching,
            create_option,
            size,
            managed: Some(managed),
            vhd: None,
        })
    }

    fn destroy(&mut self, address: &str) -> Result<(), ApplyError> {
        let Some(id) = self.state.get(address).map(|r| r.id.clone()) else {
            return Ok(());
        };
        let key = id.to_lowercase();

        match self.objects.remove(&key) {
            Some(Object::Disk(disk)) => {
                if let Some(vm) = self.attached_machine(&key) {
                    self.objects.insert(key, Object::Disk(disk));
                    return Err(ApplyError::Rejected(format!(
                        "Error deleting Managed Disk {:?}: disk is attached to Virtual Machine {:?}",
                        id, vm
                    )));
                }
            }
            Some(Object::Machine(machine)) => self.release_disks(&machine),
            Some(Object::Group) => {
                let prefix = format!("{}/", key);
                self.objects.retain(|k, _| !k.starts_with(&prefix));
            }
            Some(Object::Network) | None => {}
        }

        debug!(address, id = %id, "local resource destroyed");
        self.state.resources.remove(address);
        self.order.retain(|a| a != address);
        Ok(())
    }

    /// Delete the managed disks a machine's termination flags cover.
    fn release_disks(&mut self, machine: &Machine) {
        let profile = machine.vm.storage_profile();
        let mut doomed: Vec<String> = Vec::new();
        if machine.delete_os_disk {
            doomed.extend(profile.os_disk.as_ref().and_then(managed_id));
        }
        if machine.delete_data_disks {
            doomed.extend(profile.data_disks.iter().filter_map(managed_id));
        }
        for id in doomed {
            debug!(vm = %machine.vm.name, disk = %id, "deleting disk on termination");
            self.objects.remove(&id.to_lowercase());
        }
    }

    fn attached_machine(&self, disk_key: &str) -> Option<String> {
        self.objects.values().find_map(|object| match object {
            Object::Machine(m)
                if m.vm.disks().any(|d| {
                    d.managed_disk()
                        .and_then(|p| p.id.as_deref())
                        .is_some_and(|id| id.eq_ignore_ascii_case(disk_key))
                }) =>
            {
                Some(m.vm.name.clone())
            }
            _ => None,
        })
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn claim(&mut self, id: &str, object: Object) -> Result<(), ApplyError> {
        let key = id.to_lowercase();
        if self.objects.contains_key(&key) {
            return Err(already_exists(id));
        }
        self.objects.insert(key, object);
        Ok(())
    }

    fn require(&self, address: &str, kind: &str, id: &str) -> Result<(), ApplyError> {
        if self.objects.contains_key(&id.to_lowercase()) {
            Ok(())
        } else {
            Err(ApplyError::Rejected(format!("{}: {} {:?} was not found", address, kind, id)))
        }
    }

    /// Id of the resource group named by `resource_group_name`, which must exist.
    fn group_of(&self, address: &str, attributes: &Attributes) -> Result<String, ApplyError> {
        let name = required_str(address, attributes, "resource_group_name")?;
        let id = format!("/subscriptions/{}/resourceGroups/{}", self.subscription_id, name);
        self.require(address, "Resource Group", &id)?;
        Ok(id)
    }

    fn resolve_body(&self, body: &Body) -> Result<Attributes, ApplyError> {
        body.attributes()
            .map(|(key, value)| Ok((key.to_string(), self.resolve(value)?)))
            .collect()
    }

    fn resolve(&self, value: &Value) -> Result<Json, ApplyError> {
        Ok(match value {
            Value::Str(s) => json!(s),
            Value::Int(n) => json!(n),
            Value::Bool(b) => json!(b),
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .map(|v| self.resolve(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.resolve(v)?)))
                    .collect::<Result<_, ApplyError>>()?,
            ),
            Value::Ref(reference) => self
                .state
                .get(&reference.target())
                .and_then(|r| r.attributes.get(&reference.attribute))
                .cloned()
                .ok_or_else(|| ApplyError::Internal(format!("unresolved reference {}", reference)))?,
        })
    }
}

fn managed_id<D: DiskEntry>(disk: &D) -> Option<String> {
    disk.managed_disk().and_then(|m| m.id.clone())
}

fn already_exists(id: &str) -> ApplyError {
    ApplyError::Rejected(format!(
        "A resource with the ID {:?} already exists",
        id
    ))
}

fn required_str<'a>(address: &str, attributes: &'a Attributes, key: &str) -> Result<&'a str, ApplyError> {
    attributes
        .get(key)
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApplyError::Rejected(format!("{}: {:?}: required field is not set", address, key)))
}

fn optional_str(attributes: &Attributes, key: &str) -> Option<String> {
    attributes
        .get(key)
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn optional_u32(attributes: &Attributes, key: &str) -> Option<u32> {
    attributes
        .get(key)
        .and_then(Json::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn flag(attributes: &Attributes, key: &str) -> bool {
    attributes.get(key).and_then(Json::as_bool).unwrap_or(false)
}

fn create_option(address: &str, attributes: &Attributes) -> Result<CreateOption, ApplyError> {
    required_str(address, attributes, "create_option")?
        .parse()
        .map_err(|e| ApplyError::Rejected(format!("{}: {}", address, e)))
}
