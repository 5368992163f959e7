// SPDX-License-Identifier: GPL-3.0-only

//! Byte string helpers for UDisks2 properties (`ay`, NUL terminated)

/// Decode a NUL terminated byte string, dropping everything after the first NUL.
pub fn decode_c_string(bytes: &[u8]) -> String {
    let raw = bytes.split(|b| *b == 0).next().unwrap_or(bytes);
    String::from_utf8_lossy(raw).into_owned()
}

/// Decode `Filesystem.MountPoints`, skipping empty entries.
pub fn decode_mount_points(mount_points: Vec<Vec<u8>>) -> Vec<String> {
    mount_points
        .iter()
        .map(|mp| decode_c_string(mp))
        .filter(|mp| !mp.is_empty())
        .collect()
}
