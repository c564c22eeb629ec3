use serde::{Deserialize, Serialize};

/// Raw YAML representation of the acceptance config file.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Azure region every fixture is created in.
    pub location: Option<String>,
    /// Equivalent of `TF_ACC`: allow runs that create real resources.
    pub acceptance: Option<bool>,
    pub terraform: RawTerraform,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawTerraform {
    /// `terraform` (default) or `tofu`, or an absolute path.
    pub binary: Option<String>,
    /// Relative paths are resolved against the config file's directory.
    pub workspace_root: Option<String>,
    pub keep_workspaces: bool,
}
