// SPDX-License-Identifier: GPL-3.0-only

//! Volume label limits per filesystem

use storage_types::{FormatError, RenameError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelProblem {
    TooLong,
    InvalidCharacter,
}

fn max_len(filesystem: &str) -> Option<usize> {
    match filesystem {
        "vfat" | "fat" | "fat32" => Some(11),
        "exfat" => Some(15),
        "ntfs" => Some(32),
        _ => None,
    }
}

fn forbidden(filesystem: &str) -> &'static [char] {
    match filesystem {
        "vfat" | "fat" | "fat32" => &['*', '?', '.', ',', ';', ':', '/', '\\', '|', '+', '=', '<', '>', '[', ']', '"'],
        "exfat" => &['*', '?', '/', '\\', '|', '<', '>', ':', '"'],
        "ntfs" => &['/', '\\'],
        _ => &[],
    }
}

/// Check `label` against the limits of `filesystem`. Unknown filesystems are
/// not checked.
pub fn check_label(filesystem: &str, label: &str) -> Result<(), LabelProblem> {
    if let Some(max) = max_len(filesystem)
        && label.chars().count() > max
    {
        return Err(LabelProblem::TooLong);
    }

    let forbidden = forbidden(filesystem);
    if label
        .chars()
        .any(|c| c.is_control() || forbidden.contains(&c))
    {
        return Err(LabelProblem::InvalidCharacter);
    }
    Ok(())
}

impl From<LabelProblem> for FormatError {
    fn from(problem: LabelProblem) -> Self {
        match problem {
            LabelProblem::TooLong => FormatError::LongName,
            LabelProblem::InvalidCharacter => FormatError::InvalidCharacter,
        }
    }
}

impl From<LabelProblem> for RenameError {
    fn from(problem: LabelProblem) -> Self {
        match problem {
            LabelProblem::TooLong => RenameError::LongName,
            LabelProblem::InvalidCharacter => RenameError::InvalidCharacter,
        }
    }
}
