use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixtureError {
    #[error("duplicate resource '{address}'")]
    DuplicateResource { address: String },

    #[error("dangling reference: '{from}' references '{reference}' but '{target}' is not declared")]
    DanglingReference {
        from: String,
        reference: String,
        target: String,
    },

    #[error("cycle detected in resource dependency graph")]
    CycleDetected,

    #[error("{address}: [ERROR] Conflict between `vhd_uri` and `{field}` on `{block}` (only one or the other can be used)")]
    Conflict {
        address: String,
        block: String,
        field: String,
    },

    #[error("{address}: [ERROR] Must specify `vhd_uri` or `managed_disk_id` to attach")]
    AttachWithoutSource { address: String, block: String },

    #[error("{address}: `{block}` is missing required attribute `{attribute}`")]
    MissingAttribute {
        address: String,
        block: String,
        attribute: String,
    },

    #[error("{address}: invalid `create_option` {value:?} on `{block}`")]
    InvalidCreateOption {
        address: String,
        block: String,
        value: String,
    },

    #[error("{address}: exactly one `storage_os_disk` block is required, found {count}")]
    OsDiskCount { address: String, count: usize },

    #[error("{address}: lun {lun} is used by more than one `storage_data_disk`")]
    DuplicateLun { address: String, lun: i64 },

    #[error("unknown fixture variant '{0}'")]
    UnknownVariant(String),

    #[error("{}", join_errors(.0))]
    Multiple(Vec<FixtureError>),
}

impl FixtureError {
    /// Collapse accumulated errors: `None` when empty, the error itself when
    /// there is one, `Multiple` otherwise.
    pub fn collect(mut errors: Vec<FixtureError>) -> Option<FixtureError> {
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => Some(FixtureError::Multiple(errors)),
        }
    }
}

fn join_errors(errors: &[FixtureError]) -> String {
    let lines: Vec<String> = errors.iter().map(|e| format!("* {}", e)).collect();
    format!("{} errors occurred:\n{}", errors.len(), lines.join("\n"))
}
