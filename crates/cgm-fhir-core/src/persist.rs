use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::info;

use crate::fhir::build_bundle;
use crate::resources::Observation;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no free bundle file name in {0}")]
    NoFreeName(PathBuf),
}

const MAX_NAME_SUFFIX: u32 = 1000;

pub fn bundle_file_name(now: DateTime<Utc>) -> String {
    let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true).replace(':', "-");
    format!("fhir_bundle_{stamp}.json")
}

/// Opens a bundle file that did not exist before. Names taken within the
/// same millisecond get a `-1`, `-2`, ... suffix.
fn create_bundle_file(out_dir: &Path, now: DateTime<Utc>) -> Result<(PathBuf, File), PersistError> {
    let name = bundle_file_name(now);
    let stem = name.trim_end_matches(".json");

    for suffix in 0..MAX_NAME_SUFFIX {
        let path = match suffix {
            0 => out_dir.join(&name),
            n => out_dir.join(format!("{stem}-{n}.json")),
        };
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(PersistError::NoFreeName(out_dir.to_path_buf()))
}

/// Writes the transaction bundle that would otherwise be POSTed. Existing
/// files are never overwritten. Returns `Ok(None)` without touching the disk
/// when there is nothing to write.
pub fn save_bundle_to_file(
    out_dir: &Path,
    observations: &[Observation],
    now: DateTime<Utc>,
) -> Result<Option<PathBuf>, PersistError> {
    if observations.is_empty() {
        info!("no new measurements to save");
        return Ok(None);
    }

    let body = serde_json::to_vec_pretty(&build_bundle(observations))?;
    fs::create_dir_all(out_dir)?;
    let (path, mut file) = create_bundle_file(out_dir, now)?;
    file.write_all(&body)?;

    info!(path = %path.display(), count = observations.len(), "bundle saved");
    Ok(Some(path))
}
