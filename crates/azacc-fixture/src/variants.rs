use serde::{Deserialize, Serialize};

use crate::error::FixtureError;
use crate::hcl::{Body, Document, Reference, Resource, Value};
use crate::seed::Seed;
use crate::validate::{MANAGED_DISK, VIRTUAL_MACHINE};

pub const RESOURCE_GROUP: &str = "azurerm_resource_group";
pub const VIRTUAL_NETWORK: &str = "azurerm_virtual_network";
pub const SUBNET: &str = "azurerm_subnet";
pub const NETWORK_INTERFACE: &str = "azurerm_network_interface";

/// Every resource in a fixture is named `test`; uniqueness comes from the seed.
pub const LOCAL_NAME: &str = "test";

// ── Variants ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Linux machine whose OS disk declares `managed_disk_type`.
    ManagedDiskExplicit,
    /// Linux machine whose managed OS disk type is left to the default.
    ManagedDiskImplicit,
    /// Separately declared managed disk attached as a data disk.
    ManagedDiskAttach,
    /// OS and data disk both opted in to deletion on termination.
    DestroyDisksBefore,
    /// Network, subnet and NIC only. The machine is gone.
    NetworkOnly,
    /// Explicitly typed OS and data disks.
    DataDiskExplicit,
    /// `myosdisk1` and `mydatadisk1` with default managed types.
    DataDiskImplicit,
    /// OS disk sets both `vhd_uri` and `managed_disk_type`.
    OsDiskTypeConflict,
    /// Second data disk sets both `vhd_uri` and `managed_disk_type`.
    DataDiskTypeConflict,
    /// Windows machine named from the string suffix.
    WindowsMachine,
}

impl Variant {
    pub const ALL: [Variant; 10] = [
        Variant::ManagedDiskExplicit,
        Variant::ManagedDiskImplicit,
        Variant::ManagedDiskAttach,
        Variant::DestroyDisksBefore,
        Variant::NetworkOnly,
        Variant::DataDiskExplicit,
        Variant::DataDiskImplicit,
        Variant::OsDiskTypeConflict,
        Variant::DataDiskTypeConflict,
        Variant::WindowsMachine,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Variant::ManagedDiskExplicit => "managed-disk-explicit",
            Variant::ManagedDiskImplicit => "managed-disk-implicit",
            Variant::ManagedDiskAttach => "managed-disk-attach",
            Variant::DestroyDisksBefore => "destroy-disks-before",
            Variant::NetworkOnly => "network-only",
            Variant::DataDiskExplicit => "data-disk-explicit",
            Variant::DataDiskImplicit => "data-disk-implicit",
            Variant::OsDiskTypeConflict => "os-disk-type-conflict",
            Variant::DataDiskTypeConflict => "data-disk-type-conflict",
            Variant::WindowsMachine => "windows-machine",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Variant {
    type Err = FixtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| FixtureError::UnknownVariant(s.to_string()))
    }
}

// ── Names ─────────────────────────────────────────────────────────────────────

/// Seed-derived cloud names used across the fixtures.
#[derive(Debug, Clone)]
pub struct Names {
    seed: Seed,
}

impl Names {
    pub fn new(seed: &Seed) -> Self {
        Self { seed: seed.clone() }
    }

    pub fn resource_group(&self) -> String {
        format!("acctestRG-{}", self.seed.int)
    }

    pub fn virtual_network(&self) -> String {
        format!("acctvn-{}", self.seed.int)
    }

    pub fn subnet(&self) -> String {
        format!("acctsub-{}", self.seed.int)
    }

    pub fn network_interface(&self) -> String {
        format!("acctni-{}", self.seed.int)
    }

    pub fn managed_disk(&self) -> String {
        format!("acctmd-{}", self.seed.int)
    }

    pub fn virtual_machine(&self) -> String {
        format!("acctvm-{}", self.seed.int)
    }

    pub fn os_disk(&self) -> String {
        format!("osd-{}", self.seed.int)
    }

    pub fn data_disk(&self) -> String {
        format!("dtd-{}", self.seed.int)
    }

    pub fn host(&self) -> String {
        format!("hn{}", self.seed.int)
    }

    /// Windows machine and computer name share this value; it must stay short.
    pub fn windows_machine(&self) -> String {
        format!("acctvm{}", self.seed.suffix)
    }
}

// ── Generation ────────────────────────────────────────────────────────────────

/// Build the resource graph for `variant`. Pure: the same inputs always give
/// the same document. Inputs are not validated here.
pub fn generate(seed: &Seed, location: &str, variant: Variant) -> Document {
    let names = Names::new(seed);
    let mut resources = network(&names, location);

    match variant {
        Variant::NetworkOnly => {}
        Variant::ManagedDiskExplicit => resources.push(linux_machine(
            &names,
            os_disk(&names.os_disk())
                .attr("disk_size_gb", 50)
                .attr("managed_disk_type", "Standard_LRS"),
            vec![],
            Termination::default(),
        )),
        Variant::ManagedDiskImplicit => resources.push(linux_machine(
            &names,
            os_disk(&names.os_disk()).attr("disk_size_gb", 50),
            vec![],
            Termination::default(),
        )),
        Variant::ManagedDiskAttach => {
            let disk = standalone_disk(&names);
            let data = Body::new()
                .attr("name", disk.reference("name"))
                .attr("create_option", "Attach")
                .attr("disk_size_gb", 1)
                .attr("lun", 0)
                .attr("managed_disk_id", disk.reference("id"));
            let vm = linux_machine(
                &names,
                os_disk(&names.os_disk())
                    .attr("disk_size_gb", 50)
                    .attr("managed_disk_type", "Standard_LRS"),
                vec![data],
                Termination::default(),
            );
            resources.push(disk);
            resources.push(vm);
        }
        Variant::DestroyDisksBefore => resources.push(linux_machine(
            &names,
            os_disk("myosdisk1"),
            vec![Body::new()
                .attr("name", "mydatadisk1")
                .attr("disk_size_gb", 1)
                .attr("create_option", "Empty")
                .attr("lun", 0)],
            Termination {
                delete_os_disk: true,
                delete_data_disks: true,
            },
        )),
        Variant::DataDiskExplicit => resources.push(linux_machine(
            &names,
            os_disk(&names.os_disk()).attr("managed_disk_type", "Standard_LRS"),
            vec![empty_data_disk(&names.data_disk(), 0).attr("managed_disk_type", "Standard_LRS")],
            Termination::default(),
        )),
        Variant::DataDiskImplicit => resources.push(linux_machine(
            &names,
            os_disk("myosdisk1"),
            vec![empty_data_disk("mydatadisk1", 0)],
            Termination::default(),
        )),
        Variant::OsDiskTypeConflict => resources.push(linux_machine(
            &names,
            os_disk(&names.os_disk())
                .attr("disk_size_gb", 10)
                .attr("managed_disk_type", "Standard_LRS")
                .attr("vhd_uri", "should_cause_conflict"),
            vec![conflict_data_disk(0)],
            Termination::default(),
        )),
        Variant::DataDiskTypeConflict => resources.push(linux_machine(
            &names,
            os_disk(&names.os_disk())
                .attr("disk_size_gb", 10)
                .attr("managed_disk_type", "Standard_LRS"),
            vec![
                conflict_data_disk(0),
                conflict_data_disk(1).attr("vhd_uri", "should_cause_conflict"),
            ],
            Termination::default(),
        )),
        Variant::WindowsMachine => resources.push(windows_machine(&names)),
    }

    Document::new(resources)
}

/// Convenience wrapper returning the rendered text.
pub fn generate_text(seed: &Seed, location: &str, variant: Variant) -> String {
    generate(seed, location, variant).render()
}

// ── Building blocks ───────────────────────────────────────────────────────────

fn group_ref(attribute: &str) -> Reference {
    Reference::new(RESOURCE_GROUP, LOCAL_NAME, attribute)
}

fn network(names: &Names, location: &str) -> Vec<Resource> {
    let rg = Resource::new(
        RESOURCE_GROUP,
        LOCAL_NAME,
        Body::new()
            .attr("name", names.resource_group())
            .attr("location", location),
    );
    let vnet = Resource::new(
        VIRTUAL_NETWORK,
        LOCAL_NAME,
        Body::new()
            .attr("name", names.virtual_network())
            .attr("address_space", vec!["10.0.0.0/16"])
            .attr("location", group_ref("location"))
            .attr("resource_group_name", group_ref("name")),
    );
    let subnet = Resource::new(
        SUBNET,
        LOCAL_NAME,
        Body::new()
            .attr("name", names.subnet())
            .attr("resource_group_name", group_ref("name"))
            .attr("virtual_network_name", vnet.reference("name"))
            .attr("address_prefix", "10.0.2.0/24"),
    );
    let nic = Resource::new(
        NETWORK_INTERFACE,
        LOCAL_NAME,
        Body::new()
            .attr("name", names.network_interface())
            .attr("location", group_ref("location"))
            .attr("resource_group_name", group_ref("name"))
            .block(
                "ip_configuration",
                Body::new()
                    .attr("name", "testconfiguration1")
                    .attr("subnet_id", subnet.reference("id"))
                    .attr("private_ip_address_allocation", "dynamic"),
            ),
    );
    vec![rg, vnet, subnet, nic]
}

fn standalone_disk(names: &Names) -> Resource {
    Resource::new(
        MANAGED_DISK,
        LOCAL_NAME,
        Body::new()
            .attr("name", names.managed_disk())
            .attr("location", group_ref("location"))
            .attr("resource_group_name", group_ref("name"))
            .attr("storage_account_type", "Standard_LRS")
            .attr("create_option", "Empty")
            .attr("disk_size_gb", 1),
    )
}

fn os_disk(name: &str) -> Body {
    Body::new()
        .attr("name", name)
        .attr("caching", "ReadWrite")
        .attr("create_option", "FromImage")
}

fn empty_data_disk(name: &str, lun: i64) -> Body {
    Body::new()
        .attr("name", name)
        .attr("disk_size_gb", 1)
        .attr("create_option", "Empty")
        .attr("caching", "ReadWrite")
        .attr("lun", lun)
}

fn conflict_data_disk(lun: i64) -> Body {
    Body::new()
        .attr("name", "mydatadisk1")
        .attr("caching", "ReadWrite")
        .attr("create_option", "Empty")
        .attr("disk_size_gb", 45)
        .attr("managed_disk_type", "Standard_LRS")
        .attr("lun", lun)
}

#[derive(Debug, Default, Clone, Copy)]
struct Termination {
    delete_os_disk: bool,
    delete_data_disks: bool,
}

fn tags() -> Value {
    Value::map([("environment", "Production"), ("cost-center", "Ops")])
}

fn machine_head(name: String, vm_size: &str) -> Body {
    Body::new()
        .attr("name", name)
        .attr("location", group_ref("location"))
        .attr("resource_group_name", group_ref("name"))
        .attr(
            "network_interface_ids",
            vec![Reference::new(NETWORK_INTERFACE, LOCAL_NAME, "id")],
        )
        .attr("vm_size", vm_size)
}

fn image(publisher: &str, offer: &str, sku: &str) -> Body {
    Body::new()
        .attr("publisher", publisher)
        .attr("offer", offer)
        .attr("sku", sku)
        .attr("version", "latest")
}

fn os_profile(computer_name: String) -> Body {
    Body::new()
        .attr("computer_name", computer_name)
        .attr("admin_username", "testadmin")
        .attr("admin_password", "Password1234!")
}

fn linux_machine(names: &Names, os: Body, data_disks: Vec<Body>, termination: Termination) -> Resource {
    let mut body = machine_head(names.virtual_machine(), "Standard_D1_v2")
        .block("storage_image_reference", image("Canonical", "UbuntuServer", "14.04.2-LTS"))
        .block("storage_os_disk", os);
    if termination.delete_os_disk {
        body = body.attr("delete_os_disk_on_termination", true);
    }
    for disk in data_disks {
        body = body.block("storage_data_disk", disk);
    }
    if termination.delete_data_disks {
        body = body.attr("delete_data_disks_on_termination", true);
    }
    let body = body
        .block("os_profile", os_profile(names.host()))
        .block(
            "os_profile_linux_config",
            Body::new().attr("disable_password_authentication", false),
        )
        .attr("tags", tags());
    Resource::new(VIRTUAL_MACHINE, LOCAL_NAME, body)
}

fn windows_machine(names: &Names) -> Resource {
    let body = machine_head(names.windows_machine(), "Standard_F1")
        .block(
            "storage_image_reference",
            image("MicrosoftWindowsServer", "WindowsServer", "2012-Datacenter"),
        )
        .block(
            "storage_os_disk",
            os_disk("myosdisk1").attr("managed_disk_type", "Standard_LRS"),
        )
        .block("os_profile", os_profile(names.windows_machine()))
        .block("os_profile_windows_config", Body::new())
        .attr("tags", tags());
    Resource::new(VIRTUAL_MACHINE, LOCAL_NAME, body)
}
