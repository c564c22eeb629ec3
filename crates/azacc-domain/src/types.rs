use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ── Enums ─────────────────────────────────────────────────────────────────────

/// How a disk is initialised when the machine is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateOption {
    FromImage,
    Empty,
    Attach,
}

impl std::fmt::Display for CreateOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreateOption::FromImage => write!(f, "FromImage"),
            CreateOption::Empty => write!(f, "Empty"),
            CreateOption::Attach => write!(f, "Attach"),
        }
    }
}

impl std::str::FromStr for CreateOption {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("FromImage") {
            Ok(CreateOption::FromImage)
        } else if s.eq_ignore_ascii_case("Empty") {
            Ok(CreateOption::Empty)
        } else if s.eq_ignore_ascii_case("Attach") {
            Ok(CreateOption::Attach)
        } else {
            Err(DomainError::InvalidCreateOption(s.to_string()))
        }
    }
}

/// Where on the machine a disk entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiskSlot {
    Os,
    Data { lun: i32 },
}

impl std::fmt::Display for DiskSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskSlot::Os => write!(f, "OS Disk"),
            DiskSlot::Data { .. } => write!(f, "Data Disk"),
        }
    }
}

// ── Virtual machine descriptor ────────────────────────────────────────────────

/// Read-only snapshot of a virtual machine as returned by the compute API.
/// Only the fields the disk checks care about are modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub properties: VirtualMachineProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    #[serde(default)]
    pub vm_id: Option<String>,
    #[serde(default)]
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub storage_profile: StorageProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    #[serde(default)]
    pub os_disk: Option<OsDisk>,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    pub name: String,
    #[serde(default)]
    pub caching: Option<String>,
    #[serde(default)]
    pub create_option: Option<CreateOption>,
    #[serde(default, rename = "diskSizeGB")]
    pub disk_size_gb: Option<u32>,
    #[serde(default)]
    pub managed_disk: Option<ManagedDiskParameters>,
    #[serde(default)]
    pub vhd: Option<VirtualHardDisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub name: String,
    pub lun: i32,
    #[serde(default)]
    pub caching: Option<String>,
    #[serde(default)]
    pub create_option: Option<CreateOption>,
    #[serde(default, rename = "diskSizeGB")]
    pub disk_size_gb: Option<u32>,
    #[serde(default)]
    pub managed_disk: Option<ManagedDiskParameters>,
    #[serde(default)]
    pub vhd: Option<VirtualHardDisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDiskParameters {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub storage_account_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualHardDisk {
    #[serde(default)]
    pub uri: Option<String>,
}

/// Common view over OS and data disk entries.
pub trait DiskEntry {
    fn name(&self) -> &str;
    fn slot(&self) -> DiskSlot;
    fn managed_disk(&self) -> Option<&ManagedDiskParameters>;
    fn vhd(&self) -> Option<&VirtualHardDisk>;

    fn is_managed(&self) -> bool {
        self.managed_disk().is_some()
    }
}

impl DiskEntry for OsDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn slot(&self) -> DiskSlot {
        DiskSlot::Os
    }

    fn managed_disk(&self) -> Option<&ManagedDiskParameters> {
        self.managed_disk.as_ref()
    }

    fn vhd(&self) -> Option<&VirtualHardDisk> {
        self.vhd.as_ref()
    }
}

impl DiskEntry for DataDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn slot(&self) -> DiskSlot {
        DiskSlot::Data { lun: self.lun }
    }

    fn managed_disk(&self) -> Option<&ManagedDiskParameters> {
        self.managed_disk.as_ref()
    }

    fn vhd(&self) -> Option<&VirtualHardDisk> {
        self.vhd.as_ref()
    }
}

impl VirtualMachine {
    pub fn storage_profile(&self) -> &StorageProfile {
        &self.properties.storage_profile
    }

    /// Every disk entry, OS disk first, data disks in declaration order.
    pub fn disks(&self) -> impl Iterator<Item = &dyn DiskEntry> {
        let profile = self.storage_profile();
        profile
            .os_disk
            .iter()
            .map(|d| d as &dyn DiskEntry)
            .chain(profile.data_disks.iter().map(|d| d as &dyn DiskEntry))
    }
}

// ── Managed disk record ───────────────────────────────────────────────────────

/// A managed disk as returned by the disks API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub sku: Option<DiskSku>,
    #[serde(default)]
    pub properties: DiskProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSku {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskProperties {
    #[serde(default, rename = "diskSizeGB")]
    pub disk_size_gb: Option<u32>,
    #[serde(default)]
    pub creation_data: Option<CreationData>,
    #[serde(default)]
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub disk_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationData {
    pub create_option: CreateOption,
}
