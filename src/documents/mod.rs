//! Documents attached to a loan: uploads and the generated agreement letter.

pub mod agreement;
pub mod pdf;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use agreement::AgreementGenerator;
pub use store::{DocumentStore, FsDocumentStore, sanitize_file_name};

/// Reference to a stored document, relative to the store root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component, used as the attachment name
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// MIME type guessed from the file extension
    pub fn content_type(&self) -> &'static str {
        let extension = self
            .file_name()
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("pdf") => "application/pdf",
            Some("txt") => "text/plain; charset=utf-8",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            _ => "application/octet-stream",
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category a document is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Photo or scan taken on the field visit
    VisitProof,
    /// Generated investment agreement letter
    AgreementLetter,
    /// Agreement letter signed by the borrower
    SignedAgreement,
}

impl DocumentKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            DocumentKind::VisitProof => "visit-documents",
            DocumentKind::AgreementLetter => "agreement-letters",
            DocumentKind::SignedAgreement => "signed-agreement-letters",
        }
    }
}
