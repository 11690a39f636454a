use crate::config::SideloadConfig;
use crate::utils::url::{UrlPolicy, validate_url};
use async_trait::async_trait;
use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use tempfile::TempPath;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status} {reason}")]
    Http { status: u16, reason: String },

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Download exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Could not write temporary file: {0}")]
    Io(String),
}

impl FetchError {
    pub fn code(&self) -> String {
        match self {
            FetchError::Http { status, .. } => format!("http_{}", status),
            FetchError::Network(_) => "http_request_failed".to_string(),
            FetchError::Timeout => "http_request_timeout".to_string(),
            FetchError::TooLarge { .. } => "http_too_large".to_string(),
            FetchError::Io(_) => "http_no_file".to_string(),
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return FetchError::Timeout;
        }
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        FetchError::Network(message)
    }
}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        FetchError::Io(e.to_string())
    }
}

/// A downloaded file on local disk.
///
/// The file is removed when the value is closed or dropped, whichever comes
/// first, and never twice.
#[derive(Debug)]
pub struct TempFile {
    path: Option<TempPath>,
    #[cfg(test)]
    removals: Option<Arc<AtomicUsize>>,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    /// Current size of the file on disk
    pub async fn size_on_disk(&self) -> io::Result<u64> {
        Ok(tokio::fs::metadata(self.path()).await?.len())
    }

    /// Deletes the file now, reporting the outcome
    pub fn close(mut self) -> io::Result<()> {
        match self.path.take() {
            Some(path) => {
                self.removed();
                path.close()
            }
            None => Ok(()),
        }
    }

    /// Counts every removal into `removals`
    #[cfg(test)]
    pub(crate) fn counted(path: TempPath, removals: Arc<AtomicUsize>) -> Self {
        Self {
            path: Some(path),
            removals: Some(removals),
        }
    }

    #[cfg(test)]
    fn removed(&self) {
        if let Some(removals) = &self.removals {
            removals.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[cfg(not(test))]
    fn removed(&self) {}
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            self.removed();
            drop(path);
        }
    }
}

impl From<TempPath> for TempFile {
    fn from(path: TempPath) -> Self {
        Self {
            path: Some(path),
            #[cfg(test)]
            removals: None,
        }
    }
}

/// Downloads a URL into a temporary file
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<TempFile, FetchError>;
}

/// Fetcher backed by a reqwest client
pub struct HttpFetcher {
    client: reqwest::Client,
    max_download_size: u64,
    temp_dir: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(config: &SideloadConfig) -> Result<Self, FetchError> {
        // Every redirect hop has to pass the same URL checks as the original request
        let policy = UrlPolicy::from(config);
        let max_redirects = config.max_redirects;
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                attempt.error(format!("too many redirects (max {})", max_redirects))
            } else if let Err(e) = validate_url(attempt.url().as_str(), &policy) {
                attempt.error(e)
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(redirect)
            .build()
            .map_err(FetchError::from_reqwest)?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &SideloadConfig) -> Self {
        Self {
            client,
            max_download_size: config.max_download_size,
            temp_dir: config.temp_dir.clone(),
        }
    }

    fn create_temp_file(&self) -> io::Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sideload-").suffix(".tmp");
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<TempFile, FetchError> {
        tracing::debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Download of {} failed with status {}", url, status);
            return Err(FetchError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_download_size {
                return Err(FetchError::TooLarge {
                    limit: self.max_download_size,
                });
            }
        }

        // The TempPath removes the partial file on every early return below
        let (file, path) = self.create_temp_file()?.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut stream = response.bytes_stream();
        let mut total_size: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(FetchError::from_reqwest)?;
            total_size += chunk.len() as u64;

            if total_size > self.max_download_size {
                tracing::warn!(
                    "Download of {} aborted after {} bytes (limit {})",
                    url,
                    total_size,
                    self.max_download_size
                );
                return Err(FetchError::TooLarge {
                    limit: self.max_download_size,
                });
            }

            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        tracing::debug!(
            "Downloaded {} bytes from {} to {}",
            total_size,
            url,
            path.display()
        );

        Ok(TempFile::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> SideloadConfig {
        SideloadConfig {
            temp_dir: Some(dir.to_path_buf()),
            ..SideloadConfig::development()
        }
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_temp_file_close_removes_file() {
        let named = tempfile::NamedTempFile::new().unwrap();
        let temp = TempFile::from(named.into_temp_path());
        let path = temp.path().to_path_buf();
        assert!(path.exists());

        temp.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_file_drop_removes_file() {
        let named = tempfile::NamedTempFile::new().unwrap();
        let temp = TempFile::from(named.into_temp_path());
        let path = temp.path().to_path_buf();

        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_file_counts_one_removal() {
        let removals = Arc::new(AtomicUsize::new(0));

        let closed = TempFile::counted(
            tempfile::NamedTempFile::new().unwrap().into_temp_path(),
            removals.clone(),
        );
        closed.close().unwrap();
        assert_eq!(removals.load(Ordering::SeqCst), 1);

        let dropped = TempFile::counted(
            tempfile::NamedTempFile::new().unwrap().into_temp_path(),
            removals.clone(),
        );
        drop(dropped);
        assert_eq!(removals.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_error_codes() {
        let err = FetchError::Http {
            status: 404,
            reason: "Not Found".to_string(),
        };
        assert_eq!(err.code(), "http_404");
        assert_eq!(err.to_string(), "HTTP 404 Not Found");
        assert_eq!(FetchError::Timeout.code(), "http_request_timeout");
    }

    #[tokio::test]
    async fn test_fetch_writes_body_to_temp_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/files/photo.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body(vec![0xAB; 1024])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(&config_in(dir.path())).unwrap();
        let url = Url::parse(&format!("{}/files/photo.jpg", server.url())).unwrap();

        let temp = fetcher.fetch(&url).await.unwrap();
        assert!(temp.path().starts_with(dir.path()));
        assert_eq!(temp.size_on_disk().await.unwrap(), 1024);
        mock.assert_async().await;

        temp.close().unwrap();
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.png")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(&config_in(dir.path())).unwrap();
        let url = Url::parse(&format!("{}/missing.png", server.url())).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Http {
                status: 404,
                reason: "Not Found".to_string()
            }
        );
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_fetch_too_large_leaves_no_file() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/big.bin")
            .with_status(200)
            .with_body(vec![0u8; 4096])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = SideloadConfig {
            max_download_size: 1000,
            ..config_in(dir.path())
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let url = Url::parse(&format!("{}/big.bin", server.url())).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert_eq!(err, FetchError::TooLarge { limit: 1000 });
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind then drop a listener to get a port nobody is serving
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(&config_in(dir.path())).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{}/a.png", port)).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
        assert!(dir_is_empty(dir.path()));
    }
}
