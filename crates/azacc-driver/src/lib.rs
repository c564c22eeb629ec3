pub mod azure;
pub mod client;
pub mod engine;
pub mod error;
pub mod local;
pub mod terraform;

pub use azure::{AzureClientConfig, AzureComputeClient};
pub use client::{fetch_disk, ComputeClient, Lookup};
pub use engine::{ApplyEngine, ResourceState, State};
pub use error::{ApplyError, DriverError};
pub use local::{LocalCloud, LOCAL_SUBSCRIPTION};
pub use terraform::TerraformEngine;
