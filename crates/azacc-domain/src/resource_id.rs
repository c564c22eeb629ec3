use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A parsed Azure Resource Manager identifier.
///
/// ```text
/// /subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{type}/{name}...]
/// ```
///
/// The original text is kept verbatim so a captured id always re-renders to
/// the exact string the API handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArmResourceId {
    raw: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: Option<String>,
    /// Remaining `{type}/{name}` pairs, e.g. `disks -> acctmd-42`.
    pub path: BTreeMap<String, String>,
}

impl ArmResourceId {
    pub fn parse(id: &str) -> Result<Self, DomainError> {
        let malformed = |reason: String| DomainError::MalformedResourceId {
            id: id.to_string(),
            reason,
        };

        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(malformed("empty identifier".into()));
        }
        if !trimmed.starts_with('/') {
            return Err(malformed("identifier must be an absolute path".into()));
        }

        // Drop any query string before splitting into segments.
        let path = trimmed.split('?').next().unwrap_or_default();
        let path = path.trim_start_matches('/').trim_end_matches('/');
        let components: Vec<&str> = path.split('/').collect();
        if components.len() % 2 != 0 {
            return Err(malformed(format!(
                "the number of path segments is not divisible by 2 in {:?}",
                path
            )));
        }

        let mut pairs: BTreeMap<String, String> = BTreeMap::new();
        for chunk in components.chunks(2) {
            let (key, value) = (chunk[0], chunk[1]);
            if key.is_empty() || value.is_empty() {
                return Err(malformed(format!(
                    "key/value cannot be empty strings. Key: '{}', Value: '{}'",
                    key, value
                )));
            }
            pairs.insert(key.to_string(), value.to_string());
        }

        let subscription_id = pairs
            .remove("subscriptions")
            .ok_or_else(|| malformed("no subscription id found".into()))?;

        // Some APIs hand back the lower-case spelling.
        let resource_group = pairs
            .remove("resourceGroups")
            .or_else(|| pairs.remove("resourcegroups"))
            .ok_or_else(|| malformed("no resource group found".into()))?;

        let provider = pairs.remove("providers");

        Ok(Self {
            raw: trimmed.to_string(),
            subscription_id,
            resource_group,
            provider,
            path: pairs,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Look up a `{type}/{name}` pair. Exact key first, then case-insensitive.
    pub fn segment(&self, key: &str) -> Option<&str> {
        self.path
            .get(key)
            .or_else(|| {
                self.path
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// The managed disk name carried in the `disks` segment.
    pub fn disk_name(&self) -> Option<&str> {
        self.segment("disks")
    }
}

impl std::fmt::Display for ArmResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl std::str::FromStr for ArmResourceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ArmResourceId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArmResourceId> for String {
    fn from(id: ArmResourceId) -> Self {
        id.raw
    }
}
