use azacc_domain::resolve_managed_disk_id;
use azacc_driver::{fetch_disk, ComputeClient, Lookup, ResourceState, State};
use tracing::debug;

use crate::case::{Captures, Check};
use crate::error::HarnessError;

/// Run one check against `state` (the last applied state).
pub async fn run_check(
    check: &Check,
    state: &State,
    client: &dyn ComputeClient,
    captures: &mut Captures,
) -> Result<(), HarnessError> {
    debug!(?check, "running check");
    match check {
        Check::VirtualMachineExists { address, capture } => {
            let resource = state
                .get(address)
                .ok_or_else(|| HarnessError::NotFound(format!("Not found: {}", address)))?;
            let (name, group) = vm_location(resource)?;

            match client.get_virtual_machine(group, name).await {
                Lookup::Found(vm) => {
                    if let Some(key) = capture {
                        captures.insert_vm(key, vm);
                    }
                    Ok(())
                }
                Lookup::NotFound => Err(HarnessError::NotFound(format!(
                    "Bad: VirtualMachine {:?} (resource group: {:?}) does not exist",
                    name, group
                ))),
                Lookup::TransportError(e) => Err(HarnessError::LookupFailure(format!(
                    "Bad: Get on vmClient: {}",
                    e
                ))),
            }
        }

        Check::LookupManagedDiskId { vm, disk_name, capture } => {
            let id = resolve_managed_disk_id(captures.vm(vm)?, disk_name)?;
            debug!(disk = %disk_name, id = %id, "captured managed disk id");
            captures.insert_disk(capture, id);
            Ok(())
        }

        Check::ManagedDiskExists { disk, should_exist } => {
            let id = captures.disk(disk)?;
            match fetch_disk(client, id).await {
                Lookup::TransportError(e) => Err(HarnessError::LookupFailure(format!(
                    "Error trying to retrieve Managed Disk {}, {}",
                    id, e
                ))),
                Lookup::NotFound if *should_exist => Err(HarnessError::NotFound(format!(
                    "Unable to find Managed Disk {}",
                    id
                ))),
                Lookup::Found(_) if !*should_exist => Err(HarnessError::UnexpectedResource(
                    format!("Found unexpected Managed Disk {}", id),
                )),
                _ => Ok(()),
            }
        }
    }
}

/// Every virtual machine in `vms` must be gone.
pub async fn check_destroyed<'a>(
    client: &dyn ComputeClient,
    vms: impl IntoIterator<Item = &'a ResourceState>,
) -> Result<(), HarnessError> {
    for resource in vms {
        let (name, group) = vm_location(resource)?;
        match client.get_virtual_machine(group, name).await {
            Lookup::NotFound => {}
            Lookup::Found(_) => {
                return Err(HarnessError::UnexpectedResource(format!(
                    "Virtual Machine still exists: {}",
                    resource.id
                )))
            }
            Lookup::TransportError(e) => {
                return Err(HarnessError::LookupFailure(format!(
                    "Bad: Get on vmClient: {}",
                    e
                )))
            }
        }
    }
    Ok(())
}

fn vm_location(resource: &ResourceState) -> Result<(&str, &str), HarnessError> {
    let name = resource.attr_str("name").unwrap_or(&resource.name);
    let group = resource.attr_str("resource_group_name").ok_or_else(|| {
        HarnessError::NotFound(format!(
            "Bad: no resource group found in state for virtual machine: {}",
            name
        ))
    })?;
    Ok((name, group))
}
