use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestingError {
    #[error("scenario not found for '{name}' in {dir:?}")]
    ScenarioNotFound { name: String, dir: PathBuf },
    #[error("invalid scenario '{name}': {reason}")]
    ScenarioInvalid { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TestingError>;
