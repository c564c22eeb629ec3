use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use azacc_config::{AccConfig, CONFIG_ENV};
use azacc_domain::ArmResourceId;
use azacc_driver::{
    fetch_disk, AzureClientConfig, AzureComputeClient, ComputeClient, LocalCloud, Lookup,
    TerraformEngine,
};
use azacc_fixture::{generate, generate_text, Seed, Variant};
use azacc_harness::{run_case, CaseReport, Context, Scenario, TestCase};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cli::{EngineArg, OutputFormat};
use crate::output;

const DEFAULT_LOCATION: &str = "westus";

// ── Render ────────────────────────────────────────────────────────────────────

pub fn render(variant: Variant, seed: Option<u64>, location: &str) -> Result<()> {
    print!("{}", generate_text(&seed_or_random(seed), location, variant));
    Ok(())
}

// ── Validate ──────────────────────────────────────────────────────────────────

pub fn validate(variant: Option<Variant>, seed: Option<u64>, location: &str) -> Result<()> {
    let seed = seed_or_random(seed);
    let variants: Vec<Variant> = match variant {
        Some(v) => vec![v],
        None => Variant::ALL.to_vec(),
    };

    let mut unexpected = 0;
    for variant in variants {
        let result = azacc_fixture::validate(&generate(&seed, location, variant));
        let line = output::render_validation(variant, &result, expects_rejection(variant));
        if result.is_ok() == expects_rejection(variant) {
            unexpected += 1;
        }
        println!("{}", line);
    }

    if unexpected > 0 {
        bail!("{} fixture(s) did not validate as expected", unexpected);
    }
    Ok(())
}

/// Variants built to trip the `vhd_uri` conflict.
fn expects_rejection(variant: Variant) -> bool {
    matches!(variant, Variant::OsDiskTypeConflict | Variant::DataDiskTypeConflict)
}

// ── List ──────────────────────────────────────────────────────────────────────

pub fn list() -> Result<()> {
    for scenario in Scenario::ALL {
        println!("{}", scenario);
    }
    Ok(())
}

// ── Run ───────────────────────────────────────────────────────────────────────

pub async fn run(
    config_path: Option<PathBuf>,
    selected: Vec<Scenario>,
    engine: EngineArg,
    seed: Option<u64>,
    location: Option<String>,
    parallel: usize,
    format: OutputFormat,
) -> Result<()> {
    let config = azacc_config::load(config_path.as_deref())
        .with_context(|| format!("Failed to load config (set --config or {})", CONFIG_ENV))?;
    let seed = seed_or_random(seed);
    let location = location
        .or_else(|| config.location.clone())
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

    // Offsets follow the catalogue order so a scenario keeps its names
    // whether it runs alone or with the rest.
    let mut cases = Vec::new();
    for (i, scenario) in Scenario::ALL.iter().enumerate() {
        if selected.is_empty() || selected.contains(scenario) {
            cases.push(scenario.build(&seed.offset(i as u64), &location)?);
        }
    }
    info!(seed = %seed, location = %location, cases = cases.len(), "running acceptance cases");

    let live_client: Option<Arc<dyn ComputeClient>> = match engine {
        EngineArg::Local => None,
        EngineArg::Terraform => {
            if !config.acceptance {
                bail!("live runs require TF_ACC to be set");
            }
            let creds = config.precheck()?;
            let client = AzureComputeClient::new(AzureClientConfig {
                subscription_id: creds.subscription_id,
                tenant_id: creds.tenant_id,
                client_id: Some(creds.client_id),
                client_secret: Some(creds.client_secret),
            })
            .context("Failed to initialise Azure compute client")?;
            let client: Arc<dyn ComputeClient> = Arc::new(client);
            Some(client)
        }
    };

    let permits = Arc::new(Semaphore::new(parallel.max(1)));
    let mut set = JoinSet::new();
    for (index, case) in cases.into_iter().enumerate() {
        let ctx = context_for(&case, &config, live_client.clone());
        let permits = permits.clone();
        let keep = config.terraform.keep_workspaces;
        let workspace = live_client.as_ref().map(|_| config.workspace_for(&case.name));
        set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let report = run_case(&ctx, &case).await;
            if let Some(dir) = workspace {
                if report.passed() && !keep {
                    if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                        warn!(workspace = %dir.display(), error = %e, "could not remove workspace");
                    }
                }
            }
            (index, report)
        });
    }

    let mut reports: Vec<(usize, CaseReport)> = Vec::new();
    while let Some(joined) = set.join_next().await {
        reports.push(joined.context("test case task panicked")?);
    }
    reports.sort_by_key(|(index, _)| *index);
    let reports: Vec<CaseReport> = reports.into_iter().map(|(_, r)| r).collect();

    match format {
        OutputFormat::Text => print!("{}", output::render_reports(&reports)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed > 0 {
        bail!("{} of {} case(s) failed", failed, reports.len());
    }
    Ok(())
}

fn context_for(
    case: &TestCase,
    config: &AccConfig,
    live_client: Option<Arc<dyn ComputeClient>>,
) -> Context {
    match live_client {
        Some(client) => {
            let engine = TerraformEngine::new(
                config.terraform.binary.clone(),
                config.workspace_for(&case.name),
                config.auth_env(),
            );
            Context::new(Arc::new(engine), client).with_config(config.clone())
        }
        None => {
            let cloud = LocalCloud::new();
            Context::new(Arc::new(cloud.clone()), Arc::new(cloud))
        }
    }
}

// ── Lookup ────────────────────────────────────────────────────────────────────

pub async fn lookup_disk(config_path: Option<PathBuf>, id: &str) -> Result<()> {
    let config = azacc_config::load(config_path.as_deref())?;
    let id = ArmResourceId::parse(id)?;

    let client = AzureComputeClient::new(lookup_client_config(&config, &id))?;

    match fetch_disk(&client, &id).await {
        Lookup::Found(disk) => {
            println!("{}", serde_json::to_string_pretty(&disk)?);
            Ok(())
        }
        Lookup::NotFound => bail!("Managed Disk {} not found", id),
        Lookup::TransportError(e) => {
            Err(e).with_context(|| format!("Error trying to retrieve Managed Disk {}", id))
        }
    }
}

/// Credentials come from config; the subscription always comes from the id.
fn lookup_client_config(config: &AccConfig, id: &ArmResourceId) -> AzureClientConfig {
    AzureClientConfig {
        subscription_id: id.subscription_id.clone(),
        tenant_id: config.tenant_id.clone().unwrap_or_default(),
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn seed_or_random(seed: Option<u64>) -> Seed {
    seed.map(Seed::from_int).unwrap_or_else(Seed::random)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_uses_the_id_subscription_over_config() {
        let env: HashMap<&str, &str> = [
            ("ARM_SUBSCRIPTION_ID", "aaaa"),
            ("ARM_TENANT_ID", "tenant"),
            ("ARM_CLIENT_ID", "client"),
        ]
        .into_iter()
        .collect();
        let config =
            azacc_config::load_with_env(None, |key| env.get(key).map(|v| v.to_string())).unwrap();
        let id = ArmResourceId::parse(
            "/subscriptions/bbbb/resourceGroups/rg/providers/Microsoft.Compute/disks/d1",
        )
        .unwrap();

        let client = lookup_client_config(&config, &id);
        assert_eq!(client.subscription_id, "bbbb");
        assert_eq!(client.tenant_id, "tenant");
        assert_eq!(client.client_id.as_deref(), Some("client"));
    }

    #[test]
    fn only_conflict_variants_expect_rejection() {
        let rejected: Vec<Variant> =
            Variant::ALL.iter().copied().filter(|v| expects_rejection(*v)).collect();
        assert_eq!(rejected, vec![Variant::OsDiskTypeConflict, Variant::DataDiskTypeConflict]);
    }
}
