use std::env;
use std::path::PathBuf;

/// MIME types the local media library accepts by default
pub const DEFAULT_ALLOWED_MIMES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/avif",
    "image/bmp",
    "image/tiff",
    "image/x-icon",
    "image/vnd.microsoft.icon",
    "audio/mpeg",
    "audio/ogg",
    "audio/wav",
    "audio/x-wav",
    "audio/flac",
    "audio/aac",
    "audio/mp4",
    "audio/m4a",
    "video/mp4",
    "video/webm",
    "video/ogg",
    "video/quicktime",
    "video/x-msvideo",
    "video/mpeg",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.text",
    "application/rtf",
    "application/zip",
    "application/gzip",
    "text/plain",
    "text/csv",
];

/// Extensions that are never stored, whatever MIME type the URL suggests
pub const DEFAULT_BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "msi", "scr", "ps1", "sh", "php", "phtml", "cgi", "pl", "js",
    "jar", "dll", "so", "htaccess",
];

/// Configuration for fetching remote files and storing media
#[derive(Debug, Clone)]
pub struct SideloadConfig {
    /// Whole-request timeout for a download in seconds (default: 300)
    pub fetch_timeout_secs: u64,

    /// Maximum number of bytes a download may write to disk (default: 256 MB)
    pub max_download_size: u64,

    /// Maximum redirects followed by the fetcher (default: 5)
    pub max_redirects: usize,

    /// User-Agent header sent with downloads
    pub user_agent: String,

    /// Directory for temporary downloads (default: system temp dir)
    pub temp_dir: Option<PathBuf>,

    /// Root of the media library (default: "./uploads")
    pub uploads_dir: PathBuf,

    /// Largest file the media library accepts (default: 256 MB)
    pub max_file_size: u64,

    /// Accept loopback, private and link-local hosts in URLs (default: false)
    pub allow_private_hosts: bool,

    /// Explicit URL ports that are accepted; empty means any (default: 80, 443, 8080)
    pub allowed_ports: Vec<u16>,

    /// MIME allowlist for imported media
    pub allowed_mimes: Vec<String>,

    /// Extension blocklist for imported media
    pub blocked_extensions: Vec<String>,
}

impl Default for SideloadConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 300,
            max_download_size: 256 * 1024 * 1024, // 256 MB
            max_redirects: 5,
            user_agent: format!("sideloader/{}", env!("CARGO_PKG_VERSION")),
            temp_dir: None,
            uploads_dir: PathBuf::from("uploads"),
            max_file_size: 256 * 1024 * 1024, // 256 MB
            allow_private_hosts: false,
            allowed_ports: vec![80, 443, 8080],
            allowed_mimes: DEFAULT_ALLOWED_MIMES.iter().map(|m| m.to_string()).collect(),
            blocked_extensions: DEFAULT_BLOCKED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl SideloadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            fetch_timeout_secs: env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.fetch_timeout_secs),

            max_download_size: env::var("MAX_DOWNLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_download_size),

            max_redirects: env::var("MAX_REDIRECTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_redirects),

            user_agent: env::var("USER_AGENT").unwrap_or(default.user_agent),

            temp_dir: env::var("TEMP_DIR").ok().map(PathBuf::from),

            uploads_dir: env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.uploads_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            allow_private_hosts: env::var("ALLOW_PRIVATE_HOSTS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.allow_private_hosts),

            allowed_ports: env::var("ALLOWED_PORTS")
                .ok()
                .map(|v| parse_list(&v).filter_map(|p| p.parse().ok()).collect())
                .unwrap_or(default.allowed_ports),

            allowed_mimes: env::var("ALLOWED_MIMES")
                .ok()
                .map(|v| parse_list(&v).map(|m| m.to_lowercase()).collect())
                .unwrap_or(default.allowed_mimes),

            blocked_extensions: default.blocked_extensions,
        }
    }

    /// Create config for development (local hosts and any port allowed)
    pub fn development() -> Self {
        Self {
            fetch_timeout_secs: 30,
            allow_private_hosts: true,
            allowed_ports: Vec::new(),
            ..Self::default()
        }
    }
}

fn parse_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
