use crate::config::SideloadConfig;
use percent_encoding::percent_decode_str;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("malformed URL: {0}")]
    Malformed(String),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("URL must not contain credentials")]
    Credentials,

    #[error("host '{0}' is not publicly routable")]
    PrivateHost(String),

    #[error("port {0} is not allowed")]
    PortNotAllowed(u16),
}

/// Rules a URL has to satisfy before anything is downloaded from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPolicy {
    pub allow_private_hosts: bool,
    /// Empty accepts any explicit port
    pub allowed_ports: Vec<u16>,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self {
            allow_private_hosts: false,
            allowed_ports: vec![80, 443, 8080],
        }
    }
}

impl UrlPolicy {
    pub fn permissive() -> Self {
        Self {
            allow_private_hosts: true,
            allowed_ports: Vec::new(),
        }
    }
}

impl From<&SideloadConfig> for UrlPolicy {
    fn from(config: &SideloadConfig) -> Self {
        Self {
            allow_private_hosts: config.allow_private_hosts,
            allowed_ports: config.allowed_ports.clone(),
        }
    }
}

/// Checks that `raw` is an absolute http(s) URL that is safe to fetch.
/// No DNS lookups are made; only literal IPs and `localhost` names are screened.
pub fn validate_url(raw: &str, policy: &UrlPolicy) -> Result<Url, UrlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::Malformed("empty URL".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| UrlError::Malformed(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::UnsupportedScheme(other.to_string())),
    }

    let host = match url.host() {
        Some(Host::Domain(d)) if d.is_empty() => return Err(UrlError::MissingHost),
        Some(host) => host,
        None => return Err(UrlError::MissingHost),
    };

    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlError::Credentials);
    }

    if !policy.allow_private_hosts && is_private_host(&host) {
        return Err(UrlError::PrivateHost(host.to_string()));
    }

    if let Some(port) = url.port() {
        if !policy.allowed_ports.is_empty() && !policy.allowed_ports.contains(&port) {
            return Err(UrlError::PortNotAllowed(port));
        }
    }

    Ok(url)
}

fn is_private_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(ip) => is_private_ipv4(ip),
        Host::Ipv6(ip) => is_private_ipv6(ip),
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        // 0.0.0.0/8 "this network"
        || a == 0
        // 100.64.0.0/10 shared address space
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    // ::ffff:a.b.c.d and the deprecated ::a.b.c.d both reach the embedded v4 host
    if let Some(v4) = ip.to_ipv4() {
        return is_private_ipv4(&v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}

/// Last non-empty segment of the URL path, percent-decoded. Trailing slashes
/// are skipped, so `/photo.jpg/` names `photo.jpg`.
pub fn file_name_from_url(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .unwrap_or("");
    percent_decode_str(last).decode_utf8_lossy().into_owned()
}

/// MIME type implied by the extension of a path, `None` when the extension is unknown
pub fn mime_type_for_path(path: &str) -> Option<String> {
    std::path::Path::new(path).extension()?;
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
}
