//! Staging area for raw files pending use as package content.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};
use crate::fs::extract_archive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct Uploads {
    dir: PathBuf,
}

impl Uploads {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Staged files, sorted by name. A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<UploadedFile>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| VaultError::io(&self.dir, e))? {
            let entry = entry.map_err(|e| VaultError::io(&self.dir, e))?;
            let meta = entry.metadata().map_err(|e| VaultError::io(entry.path(), e))?;
            if !meta.is_file() {
                continue;
            }
            files.push(UploadedFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                size: meta.len(),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    pub fn get(&self, name: &str) -> Result<UploadedFile> {
        self.list()?
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| VaultError::NoSuchUpload(name.to_string()))
    }

    /// Copy `source` into the staging area under its file name.
    pub fn stage(&self, source: &Path) -> Result<UploadedFile> {
        let name = source
            .file_name()
            .ok_or_else(|| VaultError::InvalidPath(source.display().to_string()))?
            .to_string_lossy()
            .into_owned();

        fs::create_dir_all(&self.dir).map_err(|e| VaultError::io(&self.dir, e))?;
        let path = self.dir.join(&name);
        let size = fs::copy(source, &path).map_err(|e| VaultError::io(source, e))?;

        tracing::info!("File uploaded: {}", path.display());
        Ok(UploadedFile { name, path, size })
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let file = self.get(name)?;
        fs::remove_file(&file.path).map_err(|e| VaultError::io(&file.path, e))
    }

    /// Unpack a staged zip into `target`. A plain file at `target` is replaced.
    pub fn extract(&self, name: &str, target: &Path) -> Result<usize> {
        let file = self.get(name)?;
        tracing::info!("Extracting file: {} -> {}", file.path.display(), target.display());

        if target.is_file() {
            tracing::warn!("Replacing previous content: {}", target.display());
            fs::remove_file(target).map_err(|e| VaultError::io(target, e))?;
        }

        extract_archive(&file.path, target).map_err(|source| VaultError::Archive {
            path: file.path.clone(),
            source,
        })
    }
}
