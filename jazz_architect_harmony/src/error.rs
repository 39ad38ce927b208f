// Error type for the I/O and user-input boundary.
//
// The generation core is total: malformed chord text, empty rule sets and
// out-of-range style parameters all resolve to defaults. Only loading a
// style file and interpreting command-line names can fail.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarmonyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown style: {0}")]
    UnknownStyle(String),
    #[error("Unknown key: {0}")]
    UnknownKey(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, HarmonyError>;
