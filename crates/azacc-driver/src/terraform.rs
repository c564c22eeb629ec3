use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use azacc_fixture::Document;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::{ApplyEngine, ResourceState, State};
use crate::error::ApplyError;

const CONFIG_FILE: &str = "main.tf";
const PROVIDER_FILE: &str = "azacc_provider.tf";
const STATE_FILE: &str = "terraform.tfstate";

/// Terraform should never need more than 30 minutes for a single command.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

// ── TerraformEngine ───────────────────────────────────────────────────────────

/// Applies configuration documents by invoking the `terraform` binary.
///
/// Responsibilities:
/// - Maintain one workspace directory per test case
/// - Write the rendered document to `main.tf` and generate `azacc_provider.tf`
/// - Run `terraform init` once, then `terraform apply` per step
/// - Capture combined stdout+stderr so failures carry the provider's message
/// - Read applied resources back from the local `terraform.tfstate`
pub struct TerraformEngine {
    binary:      String,
    workspace:   PathBuf,
    /// Credentials passed to the subprocess (`ARM_*`).
    auth_env:    HashMap<String, String>,
    initialised: Mutex<bool>,
    timeout:     Duration,
}

impl TerraformEngine {
    pub fn new(
        binary: impl Into<String>,
        workspace: impl Into<PathBuf>,
        auth_env: HashMap<String, String>,
    ) -> Self {
        Self {
            binary:      binary.into(),
            workspace:   workspace.into(),
            auth_env,
            initialised: Mutex::new(false),
            timeout:     DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // ── Workspace helpers ─────────────────────────────────────────────────────

    fn write_config(&self, document: &Document) -> Result<(), ApplyError> {
        std::fs::create_dir_all(&self.workspace)
            .map_err(|e| ApplyError::Internal(format!("create workspace dir: {}", e)))?;

        let provider = "# Generated by azacc - do not edit\n\
                        provider \"azurerm\" {}\n";
        std::fs::write(self.workspace.join(PROVIDER_FILE), provider)
            .map_err(|e| ApplyError::Internal(format!("write {}: {}", PROVIDER_FILE, e)))?;

        let mut config = String::from("# Generated by azacc - do not edit\n\n");
        config.push_str(&document.render());
        std::fs::write(self.workspace.join(CONFIG_FILE), config)
            .map_err(|e| ApplyError::Internal(format!("write {}: {}", CONFIG_FILE, e)))?;
        Ok(())
    }

    fn read_state(&self) -> Result<State, ApplyError> {
        let path = self.workspace.join(STATE_FILE);
        if !path.exists() {
            return Ok(State::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| ApplyError::Internal(format!("read {}: {}", path.display(), e)))?;
        let json: Value = serde_json::from_str(&raw)
            .map_err(|e| ApplyError::Internal(format!("parse {}: {}", path.display(), e)))?;
        Ok(parse_state(&json))
    }

    async fn init_once(&self) -> Result<(), ApplyError> {
        let mut initialised = self.initialised.lock().await;
        if *initialised {
            return Ok(());
        }
        self.run_checked(&["init", "-no-color"]).await?;
        *initialised = true;
        Ok(())
    }

    // ── Process execution ─────────────────────────────────────────────────────

    async fn run_checked(&self, args: &[&str]) -> Result<String, ApplyError> {
        let (code, log) = self.run_tf(args).await?;
        if code != 0 {
            return Err(ApplyError::Failed {
                command: format!("{} {}", self.binary, args.first().copied().unwrap_or("")),
                exit_code: code,
                log,
            });
        }
        Ok(log)
    }

    /// Run a terraform sub-command, capturing combined stdout+stderr.
    /// Returns (exit_code, combined_log).
    async fn run_tf(&self, args: &[&str]) -> Result<(i32, String), ApplyError> {
        info!(binary = %self.binary, ?args, workspace = %self.workspace.display(), "running terraform command");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.workspace)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            // Disable interactive prompts and colour
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(&self.auth_env);

        let mut child = cmd
            .spawn()
            .map_err(|e| ApplyError::Internal(format!("spawn {}: {}", self.binary, e)))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ApplyError::Internal(format!("{}: output not captured", self.binary)));
        };

        // Both streams feed one channel so the log keeps arrival order.
        let mut log = String::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

        let tx1 = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx1.send(line);
            }
        });

        let tx2 = tx.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx2.send(line);
            }
        });

        drop(tx);

        let collect = async {
            while let Some(line) = rx.recv().await {
                debug!(target: "azacc::terraform", "{}", line);
                log.push_str(&line);
                log.push('\n');
            }
        };
        let timed_out = tokio::time::timeout(self.timeout, collect).await.is_err();

        if timed_out {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(ApplyError::TimedOut {
                command: format!("{} {}", self.binary, args.first().copied().unwrap_or("")),
                minutes: self.timeout.as_secs() / 60,
            });
        }

        stdout_task.await.ok();
        stderr_task.await.ok();

        let status = child
            .wait()
            .await
            .map_err(|e| ApplyError::Internal(format!("wait {}: {}", self.binary, e)))?;

        let code = status.code().unwrap_or(-1);
        if code != 0 {
            warn!(binary = %self.binary, code, "terraform command exited non-zero");
        }
        Ok((code, log))
    }
}

#[async_trait]
impl ApplyEngine for TerraformEngine {
    fn name(&self) -> &'static str {
        "terraform"
    }

    async fn apply(&self, document: &Document) -> Result<State, ApplyError> {
        self.write_config(document)?;
        self.init_once().await?;
        self.run_checked(&["apply", "-auto-approve", "-no-color"]).await?;
        let state = self.read_state()?;
        info!(resources = state.resources.len(), "terraform apply complete");
        Ok(state)
    }

    async fn destroy(&self) -> Result<(), ApplyError> {
        if !self.workspace.join(STATE_FILE).exists() {
            debug!(workspace = %self.workspace.display(), "no state found; nothing to destroy");
            return Ok(());
        }
        self.init_once().await?;
        self.run_checked(&["destroy", "-auto-approve", "-no-color"]).await?;
        Ok(())
    }
}

// ── State parsing ─────────────────────────────────────────────────────────────

/// Extract managed resources from a `terraform.tfstate` document.
///
/// Handles both the current layout (`resources[].instances[]`) and the legacy
/// one (`modules[].resources{address: {primary}}`).
fn parse_state(json: &Value) -> State {
    let mut state = State::default();

    if let Some(resources) = json["resources"].as_array() {
        for r in resources {
            if r["mode"].as_str().unwrap_or("managed") != "managed" {
                continue;
            }
            let (Some(ty), Some(name)) = (r["type"].as_str(), r["name"].as_str()) else {
                continue;
            };
            let Some(attrs) = r["instances"]
                .as_array()
                .and_then(|i| i.first())
                .and_then(|i| i["attributes"].as_object())
            else {
                continue;
            };
            state.insert(ResourceState {
                resource_type: ty.to_string(),
                name: name.to_string(),
                id: attrs.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                attributes: attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            });
        }
        return state;
    }

    for module in json["modules"].as_array().into_iter().flatten() {
        let Some(resources) = module["resources"].as_object() else {
            continue;
        };
        for (address, r) in resources {
            if address.starts_with("data.") {
                continue;
            }
            let Some((ty, name)) = address.split_once('.') else {
                continue;
            };
            let primary = &r["primary"];
            let attributes = primary["attributes"]
                .as_object()
                .map(|a| a.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            state.insert(ResourceState {
                resource_type: ty.to_string(),
                name: name.to_string(),
                id: primary["id"].as_str().unwrap_or_default().to_string(),
                attributes,
            });
        }
    }
    state
}
