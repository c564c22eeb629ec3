use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawConfig;

/// Env var naming the YAML config file when no path is given.
pub const CONFIG_ENV: &str = "AZACC_CONFIG";

const SUBSCRIPTION_ID: &str = "ARM_SUBSCRIPTION_ID";
const TENANT_ID: &str = "ARM_TENANT_ID";
const CLIENT_ID: &str = "ARM_CLIENT_ID";
const CLIENT_SECRET: &str = "ARM_CLIENT_SECRET";
const LOCATION: &str = "ARM_TEST_LOCATION";
const ACCEPTANCE: &str = "TF_ACC";
const TERRAFORM_BIN: &str = "AZACC_TERRAFORM_BIN";
const WORKSPACE: &str = "AZACC_WORKSPACE";

// ── Resolved configuration ────────────────────────────────────────────────────

/// Settings shared by every test case in a run.
///
/// Everything is optional at load time; [`AccConfig::precheck`] decides
/// whether a live run can go ahead.
#[derive(Clone)]
pub struct AccConfig {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub location: Option<String>,
    /// Live runs are only allowed when set.
    pub acceptance: bool,
    pub terraform: TerraformSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformSettings {
    pub binary: String,
    pub workspace_root: PathBuf,
    pub keep_workspaces: bool,
}

/// The complete credential set a live run needs.
#[derive(Clone)]
pub struct Credentials {
    pub subscription_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub location: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("location", &self.location)
            .finish()
    }
}

impl fmt::Debug for AccConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccConfig")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("location", &self.location)
            .field("acceptance", &self.acceptance)
            .field("terraform", &self.terraform)
            .finish()
    }
}

impl AccConfig {
    /// Fail unless every credential and a location are present.
    pub fn precheck(&self) -> Result<Credentials, ConfigError> {
        fn need(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
            value.clone().ok_or(ConfigError::MissingSetting(name))
        }
        Ok(Credentials {
            subscription_id: need(&self.subscription_id, SUBSCRIPTION_ID)?,
            client_id: need(&self.client_id, CLIENT_ID)?,
            client_secret: need(&self.client_secret, CLIENT_SECRET)?,
            tenant_id: need(&self.tenant_id, TENANT_ID)?,
            location: need(&self.location, LOCATION)?,
        })
    }

    /// `ARM_*` variables handed to the terraform subprocess.
    pub fn auth_env(&self) -> HashMap<String, String> {
        [
            (SUBSCRIPTION_ID, &self.subscription_id),
            (TENANT_ID, &self.tenant_id),
            (CLIENT_ID, &self.client_id),
            (CLIENT_SECRET, &self.client_secret),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone())))
        .collect()
    }

    /// Per-case workspace directory under the workspace root.
    pub fn workspace_for(&self, case: &str) -> PathBuf {
        self.terraform.workspace_root.join(case)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load configuration from `path` (or `$AZACC_CONFIG`) merged with the
/// process environment.
pub fn load(path: Option<&Path>) -> Result<AccConfig, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

/// Like [`load`], reading variables through `env` instead of the process
/// environment. Environment values win over the file; empty values count
/// as unset.
pub fn load_with_env(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AccConfig, ConfigError> {
    let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let path = path
        .map(Path::to_path_buf)
        .or_else(|| env(CONFIG_ENV).map(PathBuf::from));

    let raw = match &path {
        Some(path) => read_raw(path)?,
        None => RawConfig::default(),
    };

    convert(raw, path.as_deref(), &env)
}

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    debug!("Loading acceptance config from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    if content.trim().is_empty() {
        return Ok(RawConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })
}

fn convert(
    raw: RawConfig,
    path: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<AccConfig, ConfigError> {
    let source = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<environment>".into());
    let pick = |key: &str, file: Option<String>| env(key).or(file.filter(|v| !v.trim().is_empty()));

    let binary = pick(TERRAFORM_BIN, raw.terraform.binary).unwrap_or_else(|| "terraform".into());

    let workspace_root = match env(WORKSPACE) {
        Some(dir) => PathBuf::from(dir),
        None => match raw.terraform.workspace_root {
            Some(dir) if Path::new(&dir).is_relative() => path
                .and_then(Path::parent)
                .map(|base| base.join(&dir))
                .unwrap_or_else(|| PathBuf::from(&dir)),
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = env("HOME").unwrap_or_else(|| ".".into());
                PathBuf::from(home).join(".azacc").join("workspaces")
            }
        },
    };

    let acceptance = match env(ACCEPTANCE) {
        Some(v) => !matches!(v.trim(), "0" | "false"),
        None => raw.acceptance.unwrap_or(false),
    };

    let client_id = pick(CLIENT_ID, raw.client_id);
    let client_secret = pick(CLIENT_SECRET, raw.client_secret);
    if client_id.is_some() != client_secret.is_some() {
        return Err(ConfigError::Conversion {
            path: source,
            message: format!("{} and {} must be set together", CLIENT_ID, CLIENT_SECRET),
        });
    }

    Ok(AccConfig {
        subscription_id: pick(SUBSCRIPTION_ID, raw.subscription_id),
        tenant_id: pick(TENANT_ID, raw.tenant_id),
        client_id,
        client_secret,
        location: pick(LOCATION, raw.location),
        acceptance,
        terraform: TerraformSettings {
            binary,
            workspace_root,
            keep_workspaces: raw.terraform.keep_workspaces,
        },
    })
}
