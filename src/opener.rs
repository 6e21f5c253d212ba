//! File opener: resolves a request to a readable or writable
//! byte stream, translating filesystem errors into protocol error codes.

use std::path::{Path, PathBuf};

use tokio::fs::File;

use crate::packet::{ErrorCode, Packet};

/// Join `dir` and `filename`, using the filename verbatim; path-traversal
/// defences are out of scope here.
fn resolve(dir: &Path, filename: &str) -> PathBuf {
    dir.join(filename)
}

/// Open an existing file read-only for an RRQ.
pub async fn open_read(dir: &Path, filename: &str) -> Result<(File, u64), Packet> {
    let path = resolve(dir, filename);
    let file = File::open(&path).await.map_err(translate_read_error)?;

    let metadata = file.metadata().await.map_err(|_| {
        Packet::error(ErrorCode::Undefined, "")
    })?;
    if metadata.is_dir() {
        return Err(Packet::error(ErrorCode::Undefined, "is a directory"));
    }

    Ok((file, metadata.len()))
}

/// Create a new file exclusively, write-only, for a WRQ.
pub async fn create_write(dir: &Path, filename: &str) -> Result<File, Packet> {
    let path = resolve(dir, filename);
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(translate_write_error)?;

    let metadata = file.metadata().await.map_err(|_| {
        Packet::error(ErrorCode::Undefined, "")
    })?;
    if metadata.is_dir() {
        return Err(Packet::error(ErrorCode::Undefined, "is a directory"));
    }

    Ok(file)
}

fn translate_read_error(err: std::io::Error) -> Packet {
    use std::io::ErrorKind::*;
    match err.kind() {
        NotFound => Packet::error(ErrorCode::NotFound, "file not found"),
        PermissionDenied => Packet::error(ErrorCode::Permission, "permission denied"),
        _ => Packet::error(ErrorCode::Undefined, ""),
    }
}

fn translate_write_error(err: std::io::Error) -> Packet {
    use std::io::ErrorKind::*;
    match err.kind() {
        AlreadyExists => Packet::error(ErrorCode::AlreadyExists, "file already exists"),
        PermissionDenied => Packet::error(ErrorCode::Permission, "permission denied"),
        _ => Packet::error(ErrorCode::Undefined, ""),
    }
}
