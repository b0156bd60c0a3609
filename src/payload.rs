//! Payload file materialization
//!
//! Each size token maps to one zero-filled file under the payload directory.
//! A file that already has the expected length is reused untouched.

use crate::defaults::PAYLOAD_CHUNK;
use crate::error::{AppError, Result};
use crate::types::SizeSpec;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// What `materialize` did to produce the payload file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Materialization {
    /// Existing file already had the expected length
    Reused,
    /// File was (re)written with the expected length
    Created,
    /// Writing failed; an empty placeholder stands in
    Placeholder { reason: String },
    /// Even the placeholder could not be created
    Degraded { reason: String },
}

impl Materialization {
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Reused | Self::Created => None,
            Self::Placeholder { reason } | Self::Degraded { reason } => Some(reason),
        }
    }
}

/// Owns the payload directory
#[derive(Debug, Clone)]
pub struct PayloadStore {
    dir: PathBuf,
}

impl PayloadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the payload directory if needed
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::config(format!(
                "Cannot create payload directory '{}': {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// Path of the payload file for a size token
    pub fn path_for(&self, size: &SizeSpec) -> PathBuf {
        self.dir.join(format!("payload_{}.bin", size.token()))
    }

    /// Make sure the payload file for `size` exists with exactly the expected
    /// length. Never fails; degraded results are reported in the return value.
    pub fn materialize(&self, size: &SizeSpec) -> Materialization {
        let path = self.path_for(size);

        if let Ok(metadata) = fs::metadata(&path) {
            if metadata.is_file() && metadata.len() == size.bytes() {
                return Materialization::Reused;
            }
        }

        match write_payload(&path, size.bytes()) {
            Ok(()) => Materialization::Created,
            Err(e) => {
                let reason = e.to_string();
                match File::create(&path) {
                    Ok(_) => Materialization::Placeholder { reason },
                    Err(placeholder) => Materialization::Degraded {
                        reason: format!("{}; placeholder failed: {}", reason, placeholder),
                    },
                }
            }
        }
    }
}

fn write_payload(path: &Path, len: u64) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut file = File::create(path)?;
    let chunk = vec![0u8; PAYLOAD_CHUNK];
    let mut remaining = len;

    while remaining > 0 {
        let n = remaining.min(chunk.len() as u64) as usize;
        file.write_all(&chunk[..n])?;
        remaining -= n as u64;
    }

    file.sync_all()
}
