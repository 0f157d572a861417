//! Content store for uploaded and generated documents.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use super::{DocumentKind, DocumentRef};
use crate::error::{LoanrError, Result};

/// Where document bytes live.
pub trait DocumentStore: Send + Sync {
    /// Persist `bytes` under `name` in the directory for `kind`.
    ///
    /// Never overwrites an existing document.
    fn store(&self, kind: DocumentKind, name: &str, bytes: &[u8]) -> Result<DocumentRef>;

    /// Read a previously stored document back.
    fn retrieve(&self, reference: &DocumentRef) -> Result<Vec<u8>>;
}

/// Filesystem-backed document store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, reference: &DocumentRef) -> Result<PathBuf> {
        let relative = Path::new(reference.as_str());
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(LoanrError::StorageFailure(format!(
                "invalid document reference: {}",
                reference
            )));
        }
        Ok(self.root.join(relative))
    }
}

/// Reduce a caller-supplied name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '-',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

impl DocumentStore for FsDocumentStore {
    fn store(&self, kind: DocumentKind, name: &str, bytes: &[u8]) -> Result<DocumentRef> {
        let file_name = sanitize_file_name(name);
        let reference = DocumentRef::new(format!("{}/{}", kind.dir_name(), file_name));

        let dir = self.root.join(kind.dir_name());
        fs::create_dir_all(&dir).map_err(|e| {
            LoanrError::StorageFailure(format!("failed to create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(&file_name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| LoanrError::StorageFailure(format!("failed to create {}: {}", path.display(), e)))?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| LoanrError::StorageFailure(format!("failed to write {}: {}", path.display(), e)))?;

        log::debug!("Stored {} ({} bytes)", reference, bytes.len());
        Ok(reference)
    }

    fn retrieve(&self, reference: &DocumentRef) -> Result<Vec<u8>> {
        let path = self.resolve(reference)?;
        fs::read(&path)
            .map_err(|e| LoanrError::StorageFailure(format!("failed to read {}: {}", path.display(), e)))
    }
}
