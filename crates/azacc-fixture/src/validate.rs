use std::collections::{HashMap, HashSet};

use azacc_domain::CreateOption;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::FixtureError;
use crate::hcl::{Body, Document, Value};

pub const VIRTUAL_MACHINE: &str = "azurerm_virtual_machine";
pub const MANAGED_DISK: &str = "azurerm_managed_disk";

/// Result returned by [`validate_references`] on success.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    /// Resource addresses in creation order (dependencies first).
    pub creation_order: Vec<String>,
}

/// Run every check and report all problems at once.
pub fn validate(document: &Document) -> Result<ResolvedDocument, FixtureError> {
    let mut errors = disk_errors(document);
    match validate_references(document) {
        Ok(resolved) if errors.is_empty() => return Ok(resolved),
        Ok(_) => {}
        Err(FixtureError::Multiple(inner)) => errors.extend(inner),
        Err(e) => errors.push(e),
    }
    Err(FixtureError::collect(errors).unwrap_or(FixtureError::CycleDetected))
}

/// Check that every interpolation names a declared resource and that the
/// resource graph is acyclic.
///
/// Checks:
/// 1. Duplicate resource addresses
/// 2. Dangling references
/// 3. Cycle detection
pub fn validate_references(document: &Document) -> Result<ResolvedDocument, FixtureError> {
    let mut errors: Vec<FixtureError> = Vec::new();

    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut node_map: HashMap<String, NodeIndex> = HashMap::new();
    for resource in &document.resources {
        let address = resource.address();
        if node_map.contains_key(&address) {
            errors.push(FixtureError::DuplicateResource { address });
            continue;
        }
        let idx = graph.add_node(address.clone());
        node_map.insert(address, idx);
    }

    // Edges: referenced → referrer ("referenced must exist before referrer").
    let mut seen_edges: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
    for resource in &document.resources {
        let from = resource.address();
        for reference in resource.body.references() {
            let target = reference.target();
            match node_map.get(&target) {
                Some(&dep) => {
                    let me = node_map[&from];
                    if seen_edges.insert((dep, me)) {
                        graph.add_edge(dep, me, ());
                    }
                }
                None => errors.push(FixtureError::DanglingReference {
                    from: from.clone(),
                    reference: reference.to_string(),
                    target,
                }),
            }
        }
    }

    if let Some(err) = FixtureError::collect(errors) {
        return Err(err);
    }

    if is_cyclic_directed(&graph) {
        return Err(FixtureError::CycleDetected);
    }

    let topo = petgraph::algo::toposort(&graph, None).map_err(|_| FixtureError::CycleDetected)?;
    let creation_order = topo.iter().map(|idx| graph[*idx].clone()).collect();

    Ok(ResolvedDocument { creation_order })
}

/// Field-level checks the provider performs on disk blocks before any API
/// call is made.
pub fn validate_disks(document: &Document) -> Result<(), FixtureError> {
    match FixtureError::collect(disk_errors(document)) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn disk_errors(document: &Document) -> Vec<FixtureError> {
    let mut errors = Vec::new();

    for vm in document.of_type(VIRTUAL_MACHINE) {
        let address = vm.address();

        let os_disks: Vec<&Body> = vm.body.blocks("storage_os_disk").collect();
        if os_disks.len() != 1 {
            errors.push(FixtureError::OsDiskCount {
                address: address.clone(),
                count: os_disks.len(),
            });
        }
        for disk in os_disks {
            check_disk_block(&address, "storage_os_disk", disk, &mut errors);
        }

        let mut luns: HashSet<i64> = HashSet::new();
        for disk in vm.body.blocks("storage_data_disk") {
            check_disk_block(&address, "storage_data_disk", disk, &mut errors);
            match disk.get("lun") {
                Some(Value::Int(lun)) => {
                    if !luns.insert(*lun) {
                        errors.push(FixtureError::DuplicateLun {
                            address: address.clone(),
                            lun: *lun,
                        });
                    }
                }
                _ => errors.push(FixtureError::MissingAttribute {
                    address: address.clone(),
                    block: "storage_data_disk".into(),
                    attribute: "lun".into(),
                }),
            }
        }
    }

    for disk in document.of_type(MANAGED_DISK) {
        let address = disk.address();
        if let Err(e) = create_option(&address, MANAGED_DISK, &disk.body) {
            errors.push(e);
        }
        if disk.body.get_str("storage_account_type").is_none() {
            errors.push(FixtureError::MissingAttribute {
                address,
                block: MANAGED_DISK.into(),
                attribute: "storage_account_type".into(),
            });
        }
    }

    errors
}

fn check_disk_block(address: &str, block: &str, disk: &Body, errors: &mut Vec<FixtureError>) {
    let has_vhd = disk.get_str("vhd_uri").is_some();
    let has_type = disk.get_str("managed_disk_type").is_some();
    let has_id = has_managed_disk_id(disk);

    if disk.get("name").is_none() {
        errors.push(FixtureError::MissingAttribute {
            address: address.into(),
            block: block.into(),
            attribute: "name".into(),
        });
    }

    if has_vhd && has_type {
        errors.push(FixtureError::Conflict {
            address: address.into(),
            block: block.into(),
            field: "managed_disk_type".into(),
        });
    }
    if has_vhd && has_id {
        errors.push(FixtureError::Conflict {
            address: address.into(),
            block: block.into(),
            field: "managed_disk_id".into(),
        });
    }

    match create_option(address, block, disk) {
        Ok(CreateOption::Attach) if !has_vhd && !has_id => {
            errors.push(FixtureError::AttachWithoutSource {
                address: address.into(),
                block: block.into(),
            });
        }
        Ok(_) => {}
        Err(e) => errors.push(e),
    }
}

/// `managed_disk_id` counts as set when it is a reference or a non-empty string.
pub fn has_managed_disk_id(disk: &Body) -> bool {
    match disk.get("managed_disk_id") {
        Some(Value::Str(s)) => !s.is_empty(),
        Some(_) => true,
        None => false,
    }
}

fn create_option(address: &str, block: &str, body: &Body) -> Result<CreateOption, FixtureError> {
    let raw = body
        .get_str("create_option")
        .ok_or_else(|| FixtureError::MissingAttribute {
            address: address.into(),
            block: block.into(),
            attribute: "create_option".into(),
        })?;
    raw.parse().map_err(|_| FixtureError::InvalidCreateOption {
        address: address.into(),
        block: block.into(),
        value: raw.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hcl::{Reference, Resource};

    fn rg() -> Resource {
        Resource::new(
            "azurerm_resource_group",
            "test",
            Body::new().attr("name", "acctestRG-1").attr("location", "westus"),
        )
    }

    fn vm(os_disk: Body, data_disks: Vec<Body>) -> Resource {
        let mut body = Body::new()
            .attr("name", "acctvm-1")
            .attr("resource_group_name", Reference::new("azurerm_resource_group", "test", "name"))
            .block("storage_os_disk", os_disk);
        for d in data_disks {
            body = body.block("storage_data_disk", d);
        }
        Resource::new(VIRTUAL_MACHINE, "test", body)
    }

    fn os_disk() -> Body {
        Body::new()
            .attr("name", "osd-1")
            .attr("caching", "ReadWrite")
            .attr("create_option", "FromImage")
    }

    #[test]
    fn valid_document_passes() {
        let doc = Document::new(vec![rg(), vm(os_disk(), vec![])]);
        let resolved = validate(&doc).unwrap();
        assert_eq!(
            resolved.creation_order,
            vec!["azurerm_resource_group.test", "azurerm_virtual_machine.test"]
        );
    }

    #[test]
    fn dangling_reference_detected() {
        let doc = Document::new(vec![vm(os_disk(), vec![])]);
        let err = validate_references(&doc).unwrap_err();
        assert!(matches!(err, FixtureError::DanglingReference { ref target, .. } if target == "azurerm_resource_group.test"));
    }

    #[test]
    fn duplicate_resource_detected() {
        let doc = Document::new(vec![rg(), rg()]);
        assert!(matches!(
            validate_references(&doc),
            Err(FixtureError::DuplicateResource { .. })
        ));
    }

    #[test]
    fn cycle_detected() {
        let a = Resource::new("t", "a", Body::new().attr("x", Reference::new("t", "b", "id")));
        let b = Resource::new("t", "b", Body::new().attr("x", Reference::new("t", "a", "id")));
        let err = validate_references(&Document::new(vec![a, b])).unwrap_err();
        assert!(matches!(err, FixtureError::CycleDetected));
    }

    #[test]
    fn os_disk_vhd_and_type_conflict() {
        let disk = os_disk()
            .attr("managed_disk_type", "Standard_LRS")
            .attr("vhd_uri", "should_cause_conflict");
        let err = validate_disks(&Document::new(vec![rg(), vm(disk, vec![])])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Conflict between `vhd_uri`"), "{}", msg);
        assert!(msg.contains("`managed_disk_type` on `storage_os_disk`"), "{}", msg);
    }

    #[test]
    fn data_disk_vhd_and_id_conflict() {
        let data = Body::new()
            .attr("name", "d")
            .attr("create_option", "Attach")
            .attr("lun", 0)
            .attr("vhd_uri", "https://example/vhds/d.vhd")
            .attr("managed_disk_id", Reference::new(MANAGED_DISK, "test", "id"));
        let err = validate_disks(&Document::new(vec![vm(os_disk(), vec![data])])).unwrap_err();
        assert_eq!(
            err,
            FixtureError::Conflict {
                address: "azurerm_virtual_machine.test".into(),
                block: "storage_data_disk".into(),
                field: "managed_disk_id".into(),
            }
        );
    }

    #[test]
    fn attach_requires_a_source() {
        let data = Body::new()
            .attr("name", "d")
            .attr("create_option", "Attach")
            .attr("lun", 0);
        let err = validate_disks(&Document::new(vec![vm(os_disk(), vec![data])])).unwrap_err();
        assert!(err.to_string().contains("Must specify `vhd_uri` or `managed_disk_id` to attach"));
    }

    #[test]
    fn empty_vhd_uri_is_not_a_conflict() {
        let disk = os_disk()
            .attr("managed_disk_type", "Standard_LRS")
            .attr("vhd_uri", "");
        assert!(validate_disks(&Document::new(vec![vm(disk, vec![])])).is_ok());
    }

    #[test]
    fn errors_accumulate() {
        let disk = os_disk()
            .attr("managed_disk_type", "Standard_LRS")
            .attr("vhd_uri", "x");
        let d1 = Body::new().attr("name", "a").attr("create_option", "Empty").attr("lun", 0);
        let d2 = Body::new().attr("name", "b").attr("create_option", "Empty").attr("lun", 0);
        let err = validate_disks(&Document::new(vec![vm(disk, vec![d1, d2])])).unwrap_err();
        match err {
            FixtureError::Multiple(errs) => {
                assert!(errs.iter().any(|e| matches!(e, FixtureError::Conflict { .. })));
                assert!(errs.iter().any(|e| matches!(e, FixtureError::DuplicateLun { lun: 0, .. })));
            }
            other => panic!("expected Multiple, got {:?}", other),
        }
    }

    #[test]
    fn missing_os_disk_is_counted() {
        let body = Body::new().attr("name", "acctvm-1");
        let doc = Document::new(vec![Resource::new(VIRTUAL_MACHINE, "test", body)]);
        assert_eq!(
            validate_disks(&doc).unwrap_err(),
            FixtureError::OsDiskCount { address: "azurerm_virtual_machine.test".into(), count: 0 }
        );
    }

    #[test]
    fn second_os_disk_is_counted() {
        let mut doc = Document::new(vec![vm(os_disk(), vec![])]);
        doc.resources[0].body = doc.resources[0].body.clone().block("storage_os_disk", os_disk());
        assert_eq!(
            validate_disks(&doc).unwrap_err(),
            FixtureError::OsDiskCount { address: "azurerm_virtual_machine.test".into(), count: 2 }
        );
    }

    #[test]
    fn unknown_create_option_rejected() {
        let disk = Body::new().attr("name", "osd-1").attr("create_option", "Copy");
        let err = validate_disks(&Document::new(vec![vm(disk, vec![])])).unwrap_err();
        assert_eq!(
            err,
            FixtureError::InvalidCreateOption {
                address: "azurerm_virtual_machine.test".into(),
                block: "storage_os_disk".into(),
                value: "Copy".into(),
            }
        );
    }

    #[test]
    fn disk_block_requires_a_name() {
        let disk = Body::new().attr("caching", "ReadWrite").attr("create_option", "FromImage");
        let err = validate_disks(&Document::new(vec![vm(disk, vec![])])).unwrap_err();
        assert_eq!(
            err,
            FixtureError::MissingAttribute {
                address: "azurerm_virtual_machine.test".into(),
                block: "storage_os_disk".into(),
                attribute: "name".into(),
            }
        );
    }

    #[test]
    fn data_disk_requires_a_lun() {
        let data = Body::new().attr("name", "d").attr("create_option", "Empty");
        let err = validate_disks(&Document::new(vec![vm(os_disk(), vec![data])])).unwrap_err();
        assert_eq!(
            err,
            FixtureError::MissingAttribute {
                address: "azurerm_virtual_machine.test".into(),
                block: "storage_data_disk".into(),
                attribute: "lun".into(),
            }
        );
    }

    #[test]
    fn managed_disk_requires_storage_account_type() {
        let body = Body::new()
            .attr("name", "acctestd-1")
            .attr("create_option", "Empty")
            .attr("disk_size_gb", 1);
        let doc = Document::new(vec![Resource::new(MANAGED_DISK, "test", body)]);
        assert_eq!(
            validate_disks(&doc).unwrap_err(),
            FixtureError::MissingAttribute {
                address: "azurerm_managed_disk.test".into(),
                block: MANAGED_DISK.into(),
                attribute: "storage_account_type".into(),
            }
        );
    }

    #[test]
    fn multiple_error_text_keeps_each_message() {
        let err = FixtureError::Multiple(vec![
            FixtureError::CycleDetected,
            FixtureError::AttachWithoutSource {
                address: "a.b".into(),
                block: "storage_data_disk".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 errors occurred:"));
        assert!(msg.contains("* a.b: [ERROR] Must specify"));
    }
}
