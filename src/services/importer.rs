use crate::models::{AssetId, FileDescriptor, SideloadOptions};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("File type not allowed: {0}")]
    FileTypeNotAllowed(String),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("File too large: {0}")]
    TooLarge(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::FileTypeNotAllowed(_) => "file_type_not_allowed",
            ImportError::InvalidFile(_) => "invalid_file",
            ImportError::TooLarge(_) => "file_too_large",
            ImportError::Storage(_) => "upload_error",
        }
    }
}

/// Persists a local file as a managed media asset.
///
/// Implementations must not take ownership of `file.tmp_name`; the caller
/// removes it once `import` returns.
#[async_trait]
pub trait MediaImporter: Send + Sync {
    async fn import(
        &self,
        file: &FileDescriptor,
        options: &SideloadOptions,
    ) -> Result<AssetId, ImportError>;
}
