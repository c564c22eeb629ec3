pub mod error;
pub mod resolve;
pub mod resource_id;
pub mod types;


pub use error::DomainError;
pub use resolve::resolve_managed_disk_id;
pub use resource_id::ArmResourceId;
pub use types::*;
