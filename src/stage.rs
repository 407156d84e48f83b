//! Local staging directory management.

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::CleanupError;

/// Owns the directory that holds files between download and upload.
#[derive(Debug, Clone)]
pub struct Stager {
    dir: PathBuf,
}

impl Stager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the staging directory if it does not exist yet.
    pub fn ensure_directory(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        debug!("Staging directory ready at {:?}", self.dir);
        Ok(())
    }

    pub fn staging_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Whether a file called `name` is already staged.
    pub fn is_staged(&self, name: &str) -> bool {
        self.staging_path(name).is_file()
    }

    /// Removes a staged file.
    ///
    /// A file that is already gone yields `CleanupError::Missing`; callers
    /// treat every cleanup error as non-fatal.
    pub fn cleanup(&self, path: &Path) -> Result<(), CleanupError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed staged file {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CleanupError::Missing(path.to_path_buf()))
            }
            Err(source) => Err(CleanupError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
