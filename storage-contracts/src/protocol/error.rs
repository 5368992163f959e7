// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure class of a disk service query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    NotFound,
    PermissionDenied,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotFound, what)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Unavailable, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_roundtrips() {
        let error = StorageError::not_found("/dev/sdz");
        let json = serde_json::to_string(&error).expect("serialize error");
        let parsed: StorageError = serde_json::from_str(&json).expect("deserialize error");
        assert_eq!(parsed, error);
        assert_eq!(parsed.kind, StorageErrorKind::NotFound);
        assert!(json.contains("\"not_found\""));
    }

    #[test]
    fn display_includes_kind_and_message() {
        let error = StorageError::unavailable("udisks not running");
        assert_eq!(error.to_string(), "Unavailable: udisks not running");
    }
}
