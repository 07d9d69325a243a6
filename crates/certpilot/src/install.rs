//! Certificate installation
//!
//! Moves freshly issued material from the per-certificate work directory
//! into the deploy directory that servers read from.

use std::fs;
use std::path::{Path, PathBuf};

use certpilot_config::{Settings, StagedFiles};
use thiserror::Error;

use crate::acme::{CERT_FILE_NAME, KEY_FILE_NAME};

/// Errors that can occur during installation
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Issued file is missing: {0}")]
    MissingFile(String),

    #[error("Failed to create directory: {0}")]
    CreateDir(String),
}

/// Work and deploy directory pair
#[derive(Debug, Clone)]
pub struct Installer {
    /// Where issuance writes `<name>/cert.pem` and `<name>/privateKey.pem`
    pub work_dir: PathBuf,

    /// Where installed certificates live
    pub deploy_dir: PathBuf,
}

impl Installer {
    pub fn new(work_dir: impl Into<PathBuf>, deploy_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            deploy_dir: deploy_dir.into(),
        }
    }

    /// Installer for the directories named in the settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.work_dir, &settings.deploy_dir)
    }

    /// Work directory of one certificate
    pub fn cert_work_dir(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    /// Deploy directory of one certificate
    pub fn cert_deploy_dir(&self, name: &str) -> PathBuf {
        self.deploy_dir.join(name)
    }

    /// Copy the material for `name` into the deploy directory
    ///
    /// Both files must exist before anything is copied. Returns the
    /// certificate's deploy directory.
    pub fn install(&self, name: &str) -> Result<PathBuf, InstallError> {
        let source_dir = self.cert_work_dir(name);
        let dest_dir = self.cert_deploy_dir(name);

        // Key first: a failed rename never leaves a new chain beside an old key
        let files = [KEY_FILE_NAME, CERT_FILE_NAME];
        for file in files {
            let source = source_dir.join(file);
            if !source.is_file() {
                return Err(InstallError::MissingFile(source.display().to_string()));
            }
        }

        create_dir_if_missing(&dest_dir)?;

        let mut staged = StagedFiles::new();
        for file in files {
            stage_file(&mut staged, &source_dir.join(file), &dest_dir.join(file))?;
        }
        staged.commit().map_err(|e| InstallError::Io {
            path: e.path,
            source: e.source,
        })?;

        tracing::info!(
            name = %name,
            dest = %dest_dir.display(),
            "Installed certificate"
        );
        Ok(dest_dir)
    }
}

/// Create a directory if it doesn't exist
fn create_dir_if_missing(path: &Path) -> Result<(), InstallError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                InstallError::PermissionDenied(path.display().to_string())
            } else {
                InstallError::CreateDir(format!("{}: {}", path.display(), e))
            }
        })?;
    }
    Ok(())
}

/// Stage an owner-only copy of `source` for `dest`
fn stage_file(staged: &mut StagedFiles, source: &Path, dest: &Path) -> Result<(), InstallError> {
    tracing::debug!(
        source = %source.display(),
        dest = %dest.display(),
        "Installing file"
    );

    let contents = fs::read(source).map_err(|e| InstallError::Io {
        path: source.to_path_buf(),
        source: e,
    })?;
    staged
        .stage(dest, &contents, 0o600)
        .map_err(|e| InstallError::Io {
            path: e.path,
            source: e.source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Installer) {
        let temp_dir = TempDir::new().unwrap();
        let installer = Installer::new(temp_dir.path().join("tmp"), temp_dir.path().join("live"));
        (temp_dir, installer)
    }

    fn write_material(installer: &Installer, name: &str) {
        let dir = installer.cert_work_dir(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CERT_FILE_NAME), "chain").unwrap();
        fs::write(dir.join(KEY_FILE_NAME), "key").unwrap();
    }

    #[test]
    fn test_install_copies_both_files() {
        let (_temp_dir, installer) = setup();
        write_material(&installer, "example");

        let dest = installer.install("example").unwrap();
        assert_eq!(dest, installer.deploy_dir.join("example"));
        assert_eq!(fs::read_to_string(dest.join(CERT_FILE_NAME)).unwrap(), "chain");
        assert_eq!(fs::read_to_string(dest.join(KEY_FILE_NAME)).unwrap(), "key");
    }

    #[test]
    fn test_install_replaces_previous_files() {
        let (_temp_dir, installer) = setup();
        write_material(&installer, "example");
        installer.install("example").unwrap();

        fs::write(installer.work_dir.join("example").join(CERT_FILE_NAME), "renewed").unwrap();
        let dest = installer.install("example").unwrap();
        assert_eq!(fs::read_to_string(dest.join(CERT_FILE_NAME)).unwrap(), "renewed");
    }

    #[test]
    fn test_install_missing_key_copies_nothing() {
        let (_temp_dir, installer) = setup();
        write_material(&installer, "example");
        fs::remove_file(installer.work_dir.join("example").join(KEY_FILE_NAME)).unwrap();

        let result = installer.install("example");
        assert!(matches!(result, Err(InstallError::MissingFile(_))));
        assert!(!installer.deploy_dir.join("example").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_installed_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp_dir, installer) = setup();
        write_material(&installer, "example");
        let dest = installer.install("example").unwrap();

        let mode = fs::metadata(dest.join(KEY_FILE_NAME))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_failed_key_install_keeps_deployed_chain() {
        let (_temp_dir, installer) = setup();
        write_material(&installer, "example");
        let dest = installer.cert_deploy_dir("example");
        fs::create_dir_all(dest.join(KEY_FILE_NAME).join("occupied")).unwrap();
        fs::write(dest.join(CERT_FILE_NAME), "deployed").unwrap();

        let result = installer.install("example");
        assert!(matches!(result, Err(InstallError::Io { ref path, .. }) if *path == dest.join(KEY_FILE_NAME)));
        assert_eq!(fs::read_to_string(dest.join(CERT_FILE_NAME)).unwrap(), "deployed");
    }

    #[test]
    fn test_certificate_directories() {
        let installer = Installer::new("/var/lib/certpilot/tmp", "/var/lib/certpilot/live");
        assert_eq!(
            installer.cert_work_dir("example"),
            PathBuf::from("/var/lib/certpilot/tmp/example")
        );
        assert_eq!(
            installer.cert_deploy_dir("example"),
            PathBuf::from("/var/lib/certpilot/live/example")
        );
    }
}
