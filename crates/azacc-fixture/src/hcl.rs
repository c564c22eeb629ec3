use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

// ── Values ────────────────────────────────────────────────────────────────────

/// Reference to another resource's attribute, rendered as `"${type.name.attr}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub resource_type: String,
    pub name: String,
    pub attribute: String,
}

impl Reference {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            attribute: attribute.into(),
        }
    }

    /// Address of the referenced resource (`type.name`).
    pub fn target(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.resource_type, self.name, self.attribute)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    /// Object constructor; keys keep their insertion order.
    Map(Vec<(String, Value)>),
    Ref(Reference),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Map value built from ordered key/value pairs.
    pub fn map<K: Into<String>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Every reference contained in this value, including inside lists and maps.
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Value::Ref(r) => vec![r],
            Value::List(items) => items.iter().flat_map(Value::references).collect(),
            Value::Map(entries) => entries.iter().flat_map(|(_, v)| v.references()).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Ref(r)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

// ── Blocks ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyItem {
    Attribute { key: String, value: Value },
    Block(NestedBlock),
}

/// Ordered attributes and nested blocks of a resource or sub-block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub items: Vec<BodyItem>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.items.push(BodyItem::Attribute {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn block(mut self, name: impl Into<String>, body: Body) -> Self {
        self.items.push(BodyItem::Block(NestedBlock {
            name: name.into(),
            body,
        }));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items.iter().find_map(|item| match item {
            BodyItem::Attribute { key: k, value } if k == key => Some(value),
            _ => None,
        })
    }

    /// String attribute, treating an empty string as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn blocks<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Body> + 'a {
        self.items.iter().filter_map(move |item| match item {
            BodyItem::Block(b) if b.name == name => Some(&b.body),
            _ => None,
        })
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.items.iter().filter_map(|item| match item {
            BodyItem::Attribute { key, value } => Some((key.as_str(), value)),
            BodyItem::Block(_) => None,
        })
    }

    /// Every reference in this body and its nested blocks.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        for item in &self.items {
            match item {
                BodyItem::Attribute { value, .. } => out.extend(value.references()),
                BodyItem::Block(b) => out.extend(b.body.references()),
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    pub name: String,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub resource_type: String,
    pub name: String,
    pub body: Body,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>, body: Body) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            body,
        }
    }

    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    /// Reference one of this resource's attributes.
    pub fn reference(&self, attribute: &str) -> Reference {
        Reference::new(&self.resource_type, &self.name, attribute)
    }
}

/// An immutable declarative resource graph, rendered once and applied once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub resources: Vec<Resource>,
}

impl Document {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    pub fn resource(&self, address: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.address() == address)
    }

    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.resource_type == resource_type)
    }

    pub fn render(&self) -> String {
        render(self)
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Render a document as configuration text. Output is deterministic for a
/// given document.
pub fn render(document: &Document) -> String {
    let mut out = String::new();
    for (i, resource) in document.resources.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "resource {} {} {{",
            quote(&resource.resource_type),
            quote(&resource.name)
        );
        render_body(&mut out, &resource.body, 1);
        out.push_str("}\n");
    }
    out
}

fn render_body(out: &mut String, body: &Body, depth: usize) {
    let indent = "  ".repeat(depth);
    let mut previous_was_block = false;
    for (i, item) in body.items.iter().enumerate() {
        match item {
            BodyItem::Attribute { key, value } => {
                if previous_was_block {
                    out.push('\n');
                }
                match value {
                    Value::Map(entries) if !entries.is_empty() => {
                        let _ = writeln!(out, "{}{} = {{", indent, key);
                        for (k, v) in entries {
                            let _ = writeln!(out, "{}  {} = {}", indent, map_key(k), render_value(v));
                        }
                        let _ = writeln!(out, "{}}}", indent);
                    }
                    _ => {
                        let _ = writeln!(out, "{}{} = {}", indent, key, render_value(value));
                    }
                }
                previous_was_block = false;
            }
            BodyItem::Block(block) => {
                if i > 0 {
                    out.push('\n');
                }
                if block.body.items.is_empty() {
                    let _ = writeln!(out, "{}{} {{}}", indent, block.name);
                } else {
                    let _ = writeln!(out, "{}{} {{", indent, block.name);
                    render_body(out, &block.body, depth + 1);
                    let _ = writeln!(out, "{}}}", indent);
                }
                previous_was_block = true;
            }
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Str(s) => quote(s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Map(entries) => {
            let inner: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{} = {}", map_key(k), render_value(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        Value::Ref(r) => format!("\"${{{}}}\"", r),
    }
}

/// Bare identifiers stay bare; anything else is quoted.
fn map_key(key: &str) -> String {
    let mut chars = key.chars();
    let bare = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if bare {
        key.to_string()
    } else {
        quote(key)
    }
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Resource {
        Resource::new(
            "azurerm_resource_group",
            "test",
            Body::new().attr("name", "acctestRG-1").attr("location", "westus"),
        )
    }

    #[test]
    fn renders_resource_with_reference() {
        let rg = group();
        let vnet = Resource::new(
            "azurerm_virtual_network",
            "test",
            Body::new()
                .attr("name", "acctvn-1")
                .attr("address_space", vec!["10.0.0.0/16"])
                .attr("resource_group_name", rg.reference("name")),
        );
        let text = render(&Document::new(vec![rg, vnet]));
        assert!(text.contains("resource \"azurerm_resource_group\" \"test\" {"));
        assert!(text.contains("  address_space = [\"10.0.0.0/16\"]\n"));
        assert!(text.contains("  resource_group_name = \"${azurerm_resource_group.test.name}\"\n"));
    }

    #[test]
    fn renders_nested_and_empty_blocks() {
        let body = Body::new()
            .attr("name", "vm")
            .block("os_profile", Body::new().attr("computer_name", "hn1"))
            .block("os_profile_windows_config", Body::new())
            .attr("delete_os_disk_on_termination", true);
        let text = render(&Document::new(vec![Resource::new("azurerm_virtual_machine", "test", body)]));
        assert!(text.contains("  os_profile {\n    computer_name = \"hn1\"\n  }\n"));
        assert!(text.contains("  os_profile_windows_config {}\n"));
        assert!(text.contains("  delete_os_disk_on_termination = true\n"));
    }

    #[test]
    fn maps_render_as_attributes() {
        let body = Body::new()
            .attr("name", "vm")
            .attr("tags", Value::map([("environment", "Production"), ("cost-center", "Ops")]));
        let text = render(&Document::new(vec![Resource::new("azurerm_virtual_machine", "test", body)]));
        assert!(
            text.contains("  tags = {\n    environment = \"Production\"\n    \"cost-center\" = \"Ops\"\n  }\n"),
            "{}",
            text
        );
        assert!(!text.contains("tags {"));
    }

    #[test]
    fn inline_maps_and_map_references() {
        let value = Value::map([("id", Value::from(Reference::new("azurerm_managed_disk", "test", "id")))]);
        assert_eq!(render_value(&value), "{id = \"${azurerm_managed_disk.test.id}\"}");
        assert_eq!(value.references().len(), 1);
        assert_eq!(render_value(&Value::Map(Vec::new())), "{}");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(render_value(&Value::from("a\"b\\c")), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn render_is_deterministic() {
        let doc = Document::new(vec![group()]);
        assert_eq!(render(&doc), render(&doc.clone()));
    }

    #[test]
    fn empty_string_reads_as_unset() {
        let body = Body::new().attr("vhd_uri", "").attr("managed_disk_type", "Standard_LRS");
        assert_eq!(body.get_str("vhd_uri"), None);
        assert_eq!(body.get_str("managed_disk_type"), Some("Standard_LRS"));
    }

    #[test]
    fn references_are_collected_from_nested_blocks() {
        let body = Body::new()
            .attr("network_interface_ids", vec![Reference::new("azurerm_network_interface", "test", "id")])
            .block(
                "storage_data_disk",
                Body::new().attr("managed_disk_id", Reference::new("azurerm_managed_disk", "test", "id")),
            );
        let targets: Vec<String> = body.references().iter().map(|r| r.target()).collect();
        assert_eq!(
            targets,
            vec!["azurerm_network_interface.test", "azurerm_managed_disk.test"]
        );
    }
}
