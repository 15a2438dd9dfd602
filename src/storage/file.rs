use std::fs;
use std::path::{Path, PathBuf};

use crate::models::Timetable;
use super::format_bytes;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("invalid snapshot: too small")]
    TooSmall,
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
    #[error("failed to serialize timetable: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to parse timetable: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("cannot access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Serialize a timetable to bytes with version header
///
/// # Errors
/// Returns an error if `MessagePack` serialization fails
pub fn serialize_timetable(timetable: &Timetable) -> Result<Vec<u8>, SnapshotError> {
    let payload = rmp_serde::to_vec(timetable)?;

    // Versioned format: [4 bytes u32 version][`MessagePack` data]
    let mut bytes = Vec::with_capacity(4 + payload.len());
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);

    Ok(bytes)
}

/// Deserialize a timetable from bytes with version header validation
///
/// # Errors
/// Returns an error if the data is truncated, the version is unsupported, or deserialization fails
pub fn deserialize_timetable(bytes: &[u8]) -> Result<Timetable, SnapshotError> {
    let Some((header, payload)) = bytes.split_first_chunk::<4>() else {
        return Err(SnapshotError::TooSmall);
    };

    let version = u32::from_le_bytes(*header);
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    Ok(rmp_serde::from_slice(payload)?)
}

/// Write a snapshot next to `path` and move it into place
///
/// # Errors
/// Returns an error if serialization or any file operation fails
pub fn save_snapshot(path: &Path, timetable: &Timetable) -> Result<(), SnapshotError> {
    let bytes = serialize_timetable(timetable)?;
    let io_error = |source| SnapshotError::Io { path: path.to_path_buf(), source };

    let partial = path.with_extension("partial");
    fs::write(&partial, &bytes).map_err(io_error)?;
    fs::rename(&partial, path).map_err(io_error)?;

    log::info!(
        "saved snapshot of {} trains to {} ({})",
        timetable.trains.len(),
        path.display(),
        format_bytes(bytes.len() as u64)
    );
    Ok(())
}

/// Read a snapshot written by `save_snapshot`
///
/// # Errors
/// Returns an error if the file cannot be read or is not a valid snapshot
pub fn load_snapshot(path: &Path) -> Result<Timetable, SnapshotError> {
    let bytes = fs::read(path).map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })?;
    let timetable = deserialize_timetable(&bytes)?;
    log::info!("loaded snapshot of {} trains from {}", timetable.trains.len(), path.display());
    Ok(timetable)
}
