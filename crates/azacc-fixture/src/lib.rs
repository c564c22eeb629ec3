mod error;
mod hcl;
mod seed;
mod validate;
mod variants;

pub use error::FixtureError;
pub use hcl::{render, Body, BodyItem, Document, NestedBlock, Reference, Resource, Value};
pub use seed::Seed;
pub use validate::{
    has_managed_disk_id, validate, validate_disks, validate_references, ResolvedDocument,
    MANAGED_DISK, VIRTUAL_MACHINE,
};
pub use variants::{
    generate, generate_text, Names, Variant, LOCAL_NAME, NETWORK_INTERFACE, RESOURCE_GROUP, SUBNET,
    VIRTUAL_NETWORK,
};
