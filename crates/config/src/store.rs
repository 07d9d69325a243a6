//! Certificate record store
//!
//! A single JSON file mapping certificate name to [`CertificateRecord`].
//! Every update is a full read-modify-write that lands through a temporary
//! file and a rename, so a crash mid-write leaves the previous file intact.
//!
//! There is no cross-process lock: two concurrent writers race and the last
//! one wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::error::ConfigError;
use crate::record::CertificateRecord;

/// Records keyed by certificate name
pub type RecordMap = BTreeMap<String, CertificateRecord>;

/// File-backed store of managed certificates
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store backed by the given file (which need not exist yet)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records
    ///
    /// A missing file is an empty store.
    pub fn read(&self) -> Result<RecordMap, ConfigError> {
        if !self.path.exists() {
            trace!(path = %self.path.display(), "Certificate store not found, treating as empty");
            return Ok(RecordMap::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| ConfigError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(RecordMap::new());
        }

        let records: RecordMap =
            serde_json::from_str(&content).map_err(|e| ConfigError::parse(&self.path, e))?;

        for (key, record) in &records {
            if key != &record.name {
                return Err(ConfigError::parse(
                    &self.path,
                    format!("entry '{}' carries mismatched name '{}'", key, record.name),
                ));
            }
            record
                .validate()
                .map_err(|e| ConfigError::parse(&self.path, e))?;
        }

        debug!(path = %self.path.display(), count = records.len(), "Loaded certificate store");
        Ok(records)
    }

    /// Look up a single record
    pub fn get(&self, name: &str) -> Result<Option<CertificateRecord>, ConfigError> {
        Ok(self.read()?.remove(name))
    }

    /// All records, ordered by name
    pub fn list(&self) -> Result<Vec<CertificateRecord>, ConfigError> {
        Ok(self.read()?.into_values().collect())
    }

    /// Insert or replace the record for `record.name`
    pub fn upsert(&self, record: &CertificateRecord) -> Result<(), ConfigError> {
        record.validate()?;

        let mut records = self.read()?;
        records.insert(record.name.clone(), record.clone());

        let mut content = serde_json::to_string_pretty(&records)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        content.push('\n');
        write_atomic(&self.path, content.as_bytes(), 0o644)
            .map_err(|e| ConfigError::io(&self.path, e))?;

        info!(
            name = %record.name,
            expires = %record.expires_at,
            path = %self.path.display(),
            "Updated certificate store"
        );
        Ok(())
    }
}

/// Write `contents` to `path` through a temporary file in the same directory
/// and an atomic rename. The file ends up with the given Unix mode.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    stage(path, contents, mode)?
        .persist(path)
        .map_err(|e| e.error)?;
    Ok(())
}

/// A staged file that could not be moved into place
#[derive(Debug, Error)]
#[error("Failed to write '{}': {source}", path.display())]
pub struct StagedWriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Group of files written together
///
/// Every file is fully written to a temporary file next to its target
/// before any of them is renamed into place. Dropping the group before
/// [`commit`](Self::commit) removes the temporaries and leaves the targets
/// untouched.
#[derive(Debug, Default)]
pub struct StagedFiles {
    staged: Vec<(PathBuf, NamedTempFile)>,
}

impl StagedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `contents` for `path` into a temporary file
    pub fn stage(&mut self, path: &Path, contents: &[u8], mode: u32) -> Result<(), StagedWriteError> {
        let tmp = stage(path, contents, mode).map_err(|source| StagedWriteError {
            path: path.to_path_buf(),
            source,
        })?;
        self.staged.push((path.to_path_buf(), tmp));
        Ok(())
    }

    /// Rename every staged file into place, in staging order
    pub fn commit(self) -> Result<(), StagedWriteError> {
        for (path, tmp) in self.staged {
            trace!(path = %path.display(), "Committing staged file");
            tmp.persist(&path).map_err(|e| StagedWriteError {
                path: path.clone(),
                source: e.error,
            })?;
        }
        Ok(())
    }
}

fn stage(path: &Path, contents: &[u8], mode: u32) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(tmp)
}
