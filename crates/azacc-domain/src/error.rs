use thiserror::Error;

use crate::types::DiskSlot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid resource id {id:?}: {reason}")]
    MalformedResourceId { id: String, reason: String },

    #[error("Unable to parse Managed Disk ID for {slot} {disk}, {reason}")]
    MalformedDiskReference {
        slot: DiskSlot,
        disk: String,
        reason: String,
    },

    #[error("Unable to locate disk {disk} on vm {vm}")]
    DiskNotFound { disk: String, vm: String },

    #[error("invalid create option: {0}")]
    InvalidCreateOption(String),
}
