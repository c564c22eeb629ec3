use crate::error::DomainError;
use crate::resource_id::ArmResourceId;
use crate::types::VirtualMachine;

/// Find the managed disk id of the disk called `disk_name` on `vm`.
///
/// The OS disk is consulted first, then data disks in order. Names compare
/// case-insensitively and only entries backed by a managed disk qualify, so a
/// matching but unmanaged entry is skipped. The first managed match wins.
pub fn resolve_managed_disk_id(
    vm: &VirtualMachine,
    disk_name: &str,
) -> Result<ArmResourceId, DomainError> {
    for disk in vm.disks() {
        if !disk.name().eq_ignore_ascii_case(disk_name) {
            continue;
        }
        let Some(managed) = disk.managed_disk() else {
            continue;
        };

        let malformed = |reason: String| DomainError::MalformedDiskReference {
            slot: disk.slot(),
            disk: disk_name.to_string(),
            reason,
        };
        let raw = managed
            .id
            .as_deref()
            .ok_or_else(|| malformed("managed disk reference carries no id".into()))?;
        return ArmResourceId::parse(raw).map_err(|e| malformed(e.to_string()));
    }

    Err(DomainError::DiskNotFound {
        disk: disk_name.to_string(),
        vm: vm.name.clone(),
    })
}
