use crate::config::SideloadConfig;
use std::path::Path;

/// Longest file name most filesystems accept, in bytes
pub const MAX_FILENAME_BYTES: usize = 255;

/// Room left after sanitizing for a `-N` suffix (`-` plus the ten digits of `u32::MAX`)
pub const UNIQUE_SUFFIX_RESERVE: usize = 11;

#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    pub allowed_mimes: Vec<String>,
    pub blocked_extensions: Vec<String>,
    pub max_file_size: u64,
}

impl From<&SideloadConfig> for ValidationRules {
    fn from(config: &SideloadConfig) -> Self {
        Self {
            allowed_mimes: config.allowed_mimes.clone(),
            blocked_extensions: config.blocked_extensions.clone(),
            max_file_size: config.max_file_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates file size against the configured bounds
pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError {
            code: "EMPTY_FILE",
            message: "File is empty.".to_string(),
        });
    }
    if size > max_size {
        return Err(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "File size {} bytes exceeds maximum allowed {} bytes ({} MB)",
                size,
                max_size,
                max_size / 1024 / 1024
            ),
        });
    }
    Ok(())
}

/// Validates MIME type against allowlist
pub fn validate_mime_type(mime_type: Option<&str>, rules: &ValidationRules) -> Result<(), ValidationError> {
    let Some(mime_type) = mime_type else {
        return Err(ValidationError {
            code: "INVALID_MIME_TYPE",
            message: "Sorry, the file type could not be determined.".to_string(),
        });
    };

    let normalized = mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if rules
        .allowed_mimes
        .iter()
        .any(|allowed| allowed == &normalized)
    {
        return Ok(());
    }

    Err(ValidationError {
        code: "INVALID_MIME_TYPE",
        message: format!("Sorry, files of type '{}' are not allowed.", mime_type),
    })
}

/// Sanitizes filename to prevent path traversal and injection attacks
/// Returns the sanitized filename or an error if the name is invalid
pub fn sanitize_filename(filename: &str, rules: &ValidationRules) -> Result<String, ValidationError> {
    // Keep only the final component
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        });
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else if c.is_whitespace() {
                '-'
            } else {
                c
            }
        })
        .collect();

    let sanitized = truncate_keeping_extension(
        &sanitized,
        MAX_FILENAME_BYTES - UNIQUE_SUFFIX_RESERVE,
    );

    // Every dotted segment counts, so "shell.php.jpg" is caught too
    let lower = sanitized.to_lowercase();
    if let Some(ext) = lower
        .split('.')
        .skip(1)
        .find(|segment| rules.blocked_extensions.iter().any(|b| b == segment))
    {
        return Err(ValidationError {
            code: "BLOCKED_EXTENSION",
            message: format!("File extension '.{}' is not allowed", ext),
        });
    }

    if sanitized.starts_with('.') {
        return Err(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not allowed".to_string(),
        });
    }

    Ok(sanitized)
}

/// Shortens `name` to at most `max` bytes, cutting the stem so the extension survives
fn truncate_keeping_extension(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    match split_extension(name) {
        (stem, Some(ext)) if ext.len() + 1 < max => {
            format!("{}.{}", truncate_at_char_boundary(stem, max - ext.len() - 1), ext)
        }
        _ => truncate_at_char_boundary(name, max).to_string(),
    }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Splits `name` into stem and extension (without the dot)
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    let path = Path::new(name);
    match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(ext)) => (stem, Some(ext)),
        _ => (name, None),
    }
}
