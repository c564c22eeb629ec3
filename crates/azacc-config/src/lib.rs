mod raw;
mod loader;
pub mod error;

pub use loader::{load, load_with_env, AccConfig, Credentials, TerraformSettings, CONFIG_ENV};
pub use error::ConfigError;
