//! Closed status codes for each operation family
//!
//! Every enum carries a `Success` variant so one value can be handed to the
//! caller's continuation and to observers alike. Use `into_result()` to bridge
//! into `?`-style code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountError {
    #[default]
    #[error("success")]
    Success,
    #[error("unknown error")]
    Unknown,
    #[error("internal error")]
    Internal,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid path")]
    InvalidPath,
    #[error("path already mounted")]
    PathAlreadyMounted,
    #[error("path not mounted")]
    PathNotMounted,
    #[error("mount directory creation failed")]
    DirectoryCreationFailed,
    #[error("invalid mount options")]
    InvalidMountOptions,
    #[error("invalid unmount options")]
    InvalidUnmountOptions,
    #[error("insufficient permissions")]
    InsufficientPermissions,
    #[error("mount program not found")]
    MountProgramNotFound,
    #[error("mount program failed")]
    MountProgramFailed,
    #[error("invalid device path")]
    InvalidDevicePath,
    #[error("unknown filesystem")]
    UnknownFilesystem,
    #[error("unsupported filesystem")]
    UnsupportedFilesystem,
    #[error("invalid archive")]
    InvalidArchive,
    #[error("password needed")]
    NeedPassword,
    #[error("operation in progress")]
    InProgress,
    #[error("operation cancelled")]
    Cancelled,
    #[error("device busy")]
    Busy,
}

impl MountError {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_success() { Ok(()) } else { Err(self) }
    }

    /// "Already unmounted" is not a failure for unmount-class operations.
    pub fn normalized_for_unmount(self) -> Self {
        match self {
            Self::PathNotMounted | Self::InvalidPath => Self::Success,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatError {
    #[default]
    #[error("success")]
    Success,
    #[error("unknown error")]
    Unknown,
    #[error("internal error")]
    Internal,
    #[error("invalid device path")]
    InvalidDevicePath,
    #[error("device is being formatted")]
    DeviceBeingFormatted,
    #[error("unsupported filesystem")]
    UnsupportedFilesystem,
    #[error("format program not found")]
    FormatProgramNotFound,
    #[error("format program failed")]
    FormatProgramFailed,
    #[error("device not allowed")]
    DeviceNotAllowed,
    #[error("invalid format options")]
    InvalidOptions,
    #[error("label too long")]
    LongName,
    #[error("label contains an invalid character")]
    InvalidCharacter,
}

impl FormatError {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_success() { Ok(()) } else { Err(self) }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionError {
    #[default]
    #[error("success")]
    Success,
    #[error("unknown error")]
    Unknown,
    #[error("internal error")]
    Internal,
    #[error("invalid device path")]
    InvalidDevicePath,
    #[error("device is being partitioned")]
    DeviceBeingPartitioned,
    #[error("partition program not found")]
    ProgramNotFound,
    #[error("partition program failed")]
    ProgramFailed,
    #[error("device not allowed")]
    DeviceNotAllowed,
}

impl PartitionError {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_success() { Ok(()) } else { Err(self) }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameError {
    #[default]
    #[error("success")]
    Success,
    #[error("unknown error")]
    Unknown,
    #[error("internal error")]
    Internal,
    #[error("invalid device path")]
    InvalidDevicePath,
    #[error("device is being renamed")]
    DeviceBeingRenamed,
    #[error("unsupported filesystem")]
    UnsupportedFilesystem,
    #[error("rename program not found")]
    RenameProgramNotFound,
    #[error("rename program failed")]
    RenameProgramFailed,
    #[error("device not allowed")]
    DeviceNotAllowed,
    #[error("volume name too long")]
    LongName,
    #[error("volume name contains an invalid character")]
    InvalidCharacter,
}

impl RenameError {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_success() { Ok(()) } else { Err(self) }
    }
}
