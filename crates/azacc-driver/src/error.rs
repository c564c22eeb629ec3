use thiserror::Error;

/// Failures talking to the compute API.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid resource id: {0}")]
    InvalidResourceId(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("GET {url}: status {status}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}

/// Failures applying or destroying a configuration document.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The configuration was refused before any resource was touched.
    #[error("{0}")]
    Rejected(String),

    #[error("{command} exited with code {exit_code}:\n{log}")]
    Failed {
        command: String,
        exit_code: i32,
        log: String,
    },

    #[error("{command} timed out after {minutes} minutes")]
    TimedOut { command: String, minutes: u64 },

    #[error("internal apply error: {0}")]
    Internal(String),
}
