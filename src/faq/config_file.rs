//! Loading the corpus file.
//!
//! A missing file is replaced by an empty corpus. An unparseable file is
//! copied to `<file>.bak` before startup is aborted, so hand edits are
//! never lost to a later regeneration.

use std::io::Write;
use std::path::{Path, PathBuf};

use super::FaqConfig;

#[derive(Debug, thiserror::Error)]
pub enum FaqConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("FAQ config {path} is unreadable (backed up to {backup}): {source}")]
    Unreadable {
        path: PathBuf,
        backup: PathBuf,
        source: serde_json::Error,
    },

    #[error("FAQ config {path} is unreadable ({source}) and could not be backed up: {backup_error}")]
    BackupFailed {
        path: PathBuf,
        source: serde_json::Error,
        backup_error: std::io::Error,
    },

    #[error("Failed to serialize FAQ config: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Read the corpus at `path`, creating an empty one if it does not exist.
pub fn load(path: &Path) -> Result<FaqConfig, FaqConfigError> {
    if !path.exists() {
        log::info!("No FAQ config at {}, writing an empty one", path.display());
        let config = FaqConfig::default();
        save(path, &config)?;
        return Ok(config);
    }

    let data = std::fs::read(path).map_err(|source| FaqConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match serde_json::from_slice::<FaqConfig>(&data) {
        Ok(config) => {
            log::info!(
                "Loaded {} FAQ records from {}",
                config.faqs.len(),
                path.display()
            );
            Ok(config)
        }
        Err(source) => {
            log::error!("Failed to parse FAQ config {}: {}", path.display(), source);
            let backup = backup_path(path);
            match write_atomic(&backup, &data) {
                Ok(()) => {
                    log::info!("Backed up FAQ config to {}", backup.display());
                    Err(FaqConfigError::Unreadable {
                        path: path.to_path_buf(),
                        backup,
                        source,
                    })
                }
                Err(backup_error) => Err(FaqConfigError::BackupFailed {
                    path: path.to_path_buf(),
                    source,
                    backup_error,
                }),
            }
        }
    }
}

pub fn save(path: &Path, config: &FaqConfig) -> Result<(), FaqConfigError> {
    let data = serde_json::to_vec_pretty(config)?;
    write_atomic(path, &data).map_err(|source| FaqConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write through a temp file in the target directory, then rename over.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
