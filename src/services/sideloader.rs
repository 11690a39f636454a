use crate::models::{AssetId, FileDescriptor, SideloadOptions, SideloadRequest};
use crate::services::fetcher::{FetchError, Fetcher};
use crate::services::importer::{ImportError, MediaImporter};
use crate::utils::url::{UrlError, UrlPolicy, file_name_from_url, mime_type_for_path, validate_url};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidUrl,
    Fetch,
    Import,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SideloadError {
    #[error("File URL is invalid: {0}")]
    InvalidUrl(#[source] UrlError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

impl SideloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SideloadError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            SideloadError::Fetch(_) => ErrorKind::Fetch,
            SideloadError::Import(_) => ErrorKind::Import,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> String {
        match self {
            SideloadError::InvalidUrl(_) => "invalid_url".to_string(),
            SideloadError::Fetch(e) => e.code(),
            SideloadError::Import(e) => e.code().to_string(),
        }
    }

    /// Status attached to the failure: 400 for a rejected URL, the upstream
    /// status for a failed download, none otherwise
    pub fn status(&self) -> Option<u16> {
        match self {
            SideloadError::InvalidUrl(_) => Some(400),
            SideloadError::Fetch(FetchError::Http { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Downloads remote files and hands them to a media importer
#[derive(Clone)]
pub struct Sideloader {
    fetcher: Arc<dyn Fetcher>,
    importer: Arc<dyn MediaImporter>,
    policy: UrlPolicy,
}

impl Sideloader {
    pub fn new(fetcher: Arc<dyn Fetcher>, importer: Arc<dyn MediaImporter>) -> Self {
        Self {
            fetcher,
            importer,
            policy: UrlPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: UrlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn sideload(
        &self,
        url: &str,
        options: SideloadOptions,
    ) -> Result<AssetId, SideloadError> {
        let url = validate_url(url, &self.policy).map_err(|e| {
            tracing::debug!("Rejected sideload URL {:?}: {}", url, e);
            SideloadError::InvalidUrl(e)
        })?;

        // A failed fetch drops its own partial file
        let temp = self.fetcher.fetch(&url).await?;

        let size = temp.size_on_disk().await.unwrap_or_else(|e| {
            tracing::warn!("Could not stat {}: {}", temp.path().display(), e);
            0
        });
        let name = file_name_from_url(&url);
        let file = FileDescriptor {
            tmp_name: temp.path().to_path_buf(),
            mime_type: mime_type_for_path(&name),
            name,
            size,
        };

        let result = self.importer.import(&file, &options).await;

        if let Err(e) = temp.close() {
            tracing::debug!("Ignoring temp file cleanup failure: {}", e);
        }

        match &result {
            Ok(id) => tracing::info!("Sideloaded {} as asset {}", url, id),
            Err(e) => tracing::warn!("Import of {} failed: {}", url, e),
        }

        result.map_err(SideloadError::Import)
    }

    pub async fn sideload_request(&self, request: SideloadRequest) -> Result<AssetId, SideloadError> {
        self.sideload(&request.url, request.options).await
    }
}
