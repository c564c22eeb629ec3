use std::collections::BTreeMap;

use async_trait::async_trait;
use azacc_fixture::Document;
use serde::{Deserialize, Serialize};

use crate::error::ApplyError;

// ── State ─────────────────────────────────────────────────────────────────────

/// One applied resource, keyed in [`State`] by its `type.name` address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_type: String,
    pub name: String,
    /// Cloud identifier assigned on creation.
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    /// String attribute lookup. `id` is always available.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        if key == "id" {
            return Some(&self.id);
        }
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

/// Everything the last successful apply produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub resources: BTreeMap<String, ResourceState>,
}

impl State {
    pub fn get(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a ResourceState> + 'a {
        self.resources
            .values()
            .filter(move |r| r.resource_type == resource_type)
    }

    pub fn insert(&mut self, resource: ResourceState) {
        self.resources.insert(resource.address(), resource);
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

// ── ApplyEngine ───────────────────────────────────────────────────────────────

/// Converges real (or simulated) infrastructure onto a configuration document.
///
/// Applying a new document replaces the previous one: resources no longer
/// present are destroyed, changed ones are replaced.
#[async_trait]
pub trait ApplyEngine: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn apply(&self, document: &Document) -> Result<State, ApplyError>;

    /// Destroy everything the engine created. Safe to call when nothing was applied.
    async fn destroy(&self) -> Result<(), ApplyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rs(ty: &str, name: &str, id: &str) -> ResourceState {
        ResourceState {
            resource_type: ty.into(),
            name: name.into(),
            id: id.into(),
            attributes: BTreeMap::from([("name".to_string(), json!(format!("{}-name", name)))]),
        }
    }

    #[test]
    fn state_lookup_by_address_and_type() {
        let mut state = State::default();
        state.insert(rs("azurerm_virtual_machine", "test", "/vm"));
        state.insert(rs("azurerm_managed_disk", "test", "/disk"));

        assert_eq!(state.get("azurerm_virtual_machine.test").unwrap().id, "/vm");
        assert_eq!(state.of_type("azurerm_managed_disk").count(), 1);
        assert!(state.get("azurerm_subnet.test").is_none());
    }

    #[test]
    fn attr_str_exposes_id() {
        let r = rs("azurerm_resource_group", "test", "/rg");
        assert_eq!(r.attr_str("id"), Some("/rg"));
        assert_eq!(r.attr_str("name"), Some("test-name"));
        assert_eq!(r.attr_str("missing"), None);
    }
}
