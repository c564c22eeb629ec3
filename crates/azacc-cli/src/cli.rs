use azacc_fixture::Variant;
use azacc_harness::Scenario;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "azacc",
    about = "Managed-disk acceptance tests for Azure virtual machines",
    version
)]
pub struct Cli {
    /// Acceptance config file. Environment variables override its values.
    #[arg(long, env = "AZACC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log line format (logs go to stderr).
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the configuration document for a fixture variant.
    Render {
        variant: Variant,

        /// Integer seed for resource names (random when omitted).
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value = "westus")]
        location: String,
    },

    /// Check generated fixtures for disk conflicts and dangling references.
    Validate {
        /// Only this variant (default: all of them).
        variant: Option<Variant>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value = "westus")]
        location: String,
    },

    /// List the acceptance scenarios.
    List,

    /// Run acceptance scenarios.
    Run {
        /// Scenarios to run (default: all).
        scenarios: Vec<Scenario>,

        /// Where fixtures are applied.
        #[arg(long, default_value = "local")]
        engine: EngineArg,

        /// Base seed; each case gets its own offset.
        #[arg(long)]
        seed: Option<u64>,

        /// Azure region (default: ARM_TEST_LOCATION, then westus).
        #[arg(long)]
        location: Option<String>,

        /// Maximum number of cases in flight.
        #[arg(long, default_value_t = 1)]
        parallel: usize,

        #[arg(long, default_value = "text")]
        output: OutputFormat,
    },

    /// Fetch a managed disk by its full resource ID.
    LookupDisk {
        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EngineArg {
    /// In-process simulated cloud. No credentials needed.
    Local,
    /// terraform (or tofu) against a real subscription. Requires TF_ACC.
    Terraform,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
