use crate::config::SideloadConfig;
use crate::models::{AssetId, AssetRecord, FileDescriptor, SideloadOptions};
use crate::services::importer::{ImportError, MediaImporter};
use crate::utils::validation::{
    ValidationError, ValidationRules, sanitize_filename, split_extension, validate_file_size,
    validate_mime_type,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, File, OpenOptions};

/// Media library that keeps files under a local uploads directory
/// (`<root>/<YYYY>/<MM>/<name>`) and asset records in memory.
pub struct LocalMediaLibrary {
    root: PathBuf,
    rules: ValidationRules,
    records: DashMap<AssetId, AssetRecord>,
    next_id: AtomicU64,
}

impl LocalMediaLibrary {
    pub fn new(root: impl Into<PathBuf>, rules: ValidationRules) -> Self {
        Self {
            root: root.into(),
            rules,
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &SideloadConfig) -> Self {
        Self::new(config.uploads_dir.clone(), ValidationRules::from(config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, id: AssetId) -> Option<AssetRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Absolute location of a stored asset
    pub fn file_path(&self, record: &AssetRecord) -> PathBuf {
        record
            .path
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Creates the uploads directory if it is missing
    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// The uploads directory exists and is not read-only. Never touches the filesystem.
    pub async fn health_check(&self) -> bool {
        match fs::metadata(&self.root).await {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => false,
        }
    }

    fn validate(&self, file: &FileDescriptor) -> Result<String, ImportError> {
        let name = sanitize_filename(&file.name, &self.rules).map_err(|e| match e.code {
            "BLOCKED_EXTENSION" => ImportError::FileTypeNotAllowed(e.message),
            _ => ImportError::InvalidFile(e.message),
        })?;

        validate_mime_type(file.mime_type.as_deref(), &self.rules)
            .map_err(|e| ImportError::FileTypeNotAllowed(e.message))?;

        validate_file_size(file.size, self.rules.max_file_size).map_err(
            |ValidationError { code, message }| match code {
                "FILE_TOO_LARGE" => ImportError::TooLarge(message),
                _ => ImportError::InvalidFile(message),
            },
        )?;

        Ok(name)
    }

    /// Creates a file named `name` in `dir`, or `stem-1.ext`, `stem-2.ext`, ...
    /// when the name is taken. Creation is exclusive so concurrent imports never
    /// share a destination. Sanitized names leave room for the suffix.
    async fn claim_unique(dir: &Path, name: &str) -> io::Result<(String, File)> {
        let (stem, ext) = split_extension(name);
        let mut suffix = 0u32;
        loop {
            let candidate = match (suffix, ext) {
                (0, _) => name.to_string(),
                (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
                (n, None) => format!("{}-{}", stem, n),
            };

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&candidate))
                .await
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e),
            }
        }
    }

    async fn store(&self, source: &Path, name: &str) -> io::Result<(String, String)> {
        let subdir = Utc::now().format("%Y/%m").to_string();
        let dir = subdir
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part));
        fs::create_dir_all(&dir).await?;

        let (stored_name, mut dest) = Self::claim_unique(&dir, name).await?;
        let dest_path = dir.join(&stored_name);

        let copied = async {
            let mut src = File::open(source).await?;
            tokio::io::copy(&mut src, &mut dest).await?;
            dest.sync_all().await
        }
        .await;

        if let Err(e) = copied {
            let _ = fs::remove_file(&dest_path).await;
            return Err(e);
        }

        Ok((stored_name.clone(), format!("{}/{}", subdir, stored_name)))
    }
}

#[async_trait]
impl MediaImporter for LocalMediaLibrary {
    async fn import(
        &self,
        file: &FileDescriptor,
        options: &SideloadOptions,
    ) -> Result<AssetId, ImportError> {
        let name = self.validate(file)?;
        let mime_type = file.mime_type.clone().unwrap_or_default();

        let (file_name, path) = self.store(&file.tmp_name, &name).await.map_err(|e| {
            tracing::error!("Failed to store {}: {}", name, e);
            ImportError::Storage(format!("The uploaded file could not be moved: {}", e))
        })?;

        let mut title = split_extension(&file_name).0.to_string();
        let mut description = options.description.clone();
        let mut extra = serde_json::Map::new();
        for (key, value) in &options.override_fields {
            match (key.as_str(), value) {
                ("title", Value::String(s)) => title = s.clone(),
                ("description", Value::String(s)) => description = Some(s.clone()),
                _ => {
                    extra.insert(key.clone(), value.clone());
                }
            }
        }

        let id = AssetId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = AssetRecord {
            id,
            title,
            description,
            file_name,
            path,
            mime_type,
            size: file.size,
            associated_record_id: options.associated_record_id,
            created_at: Utc::now(),
            extra,
        };

        tracing::info!(
            "Stored asset {} at {} ({} bytes, record {})",
            id,
            record.path,
            record.size,
            record.associated_record_id
        );
        self.records.insert(id, record);

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn library(root: &Path) -> LocalMediaLibrary {
        LocalMediaLibrary::from_config(&SideloadConfig {
            uploads_dir: root.to_path_buf(),
            ..SideloadConfig::default()
        })
    }

    fn temp_with(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    fn descriptor(file: &tempfile::NamedTempFile, name: &str, mime: Option<&str>) -> FileDescriptor {
        FileDescriptor {
            tmp_name: file.path().to_path_buf(),
            mime_type: mime.map(|m| m.to_string()),
            name: name.to_string(),
            size: std::fs::metadata(file.path()).unwrap().len(),
        }
    }

    #[tokio::test]
    async fn test_import_stores_copy_and_record() {
        let root = tempfile::tempdir().unwrap();
        let library = library(root.path());
        let tmp = temp_with(b"jpeg bytes");

        let options = SideloadOptions::attached_to(42).with_description("A photo");
        let id = library
            .import(&descriptor(&tmp, "photo.jpg", Some("image/jpeg")), &options)
            .await
            .unwrap();

        assert_eq!(id, AssetId(1));
        let record = library.get(id).unwrap();
        assert_eq!(record.title, "photo");
        assert_eq!(record.file_name, "photo.jpg");
        assert_eq!(record.mime_type, "image/jpeg");
        assert_eq!(record.size, 10);
        assert_eq!(record.associated_record_id, 42);
        assert_eq!(record.description.as_deref(), Some("A photo"));

        let stored = library.file_path(&record);
        assert_eq!(std::fs::read(&stored).unwrap(), b"jpeg bytes");
        // the source stays for the caller to remove
        assert!(tmp.path().exists());
    }

    #[tokio::test]
    async fn test_import_makes_names_unique() {
        let root = tempfile::tempdir().unwrap();
        let library = library(root.path());
        let tmp = temp_with(b"abc");
        let file = descriptor(&tmp, "photo.jpg", Some("image/jpeg"));
        let options = SideloadOptions::default();

        let first = library.import(&file, &options).await.unwrap();
        let second = library.import(&file, &options).await.unwrap();
        let third = library.import(&file, &options).await.unwrap();

        assert_eq!(library.get(first).unwrap().file_name, "photo.jpg");
        assert_eq!(library.get(second).unwrap().file_name, "photo-1.jpg");
        assert_eq!(library.get(third).unwrap().file_name, "photo-2.jpg");
        assert_eq!(library.len(), 3);
    }

    #[tokio::test]
    async fn test_import_long_names_stay_unique_and_short() {
        let root = tempfile::tempdir().unwrap();
        let library = library(root.path());
        let tmp = temp_with(b"abc");
        let name = format!("{}.jpg", "b".repeat(251));
        assert_eq!(name.len(), 255);
        let file = descriptor(&tmp, &name, Some("image/jpeg"));
        let options = SideloadOptions::default();

        let first = library.import(&file, &options).await.unwrap();
        let second = library.import(&file, &options).await.unwrap();

        let first = library.get(first).unwrap();
        let second = library.get(second).unwrap();
        assert!(first.file_name.ends_with(".jpg"));
        assert!(second.file_name.ends_with("-1.jpg"));
        assert!(second.file_name.len() <= 255);
        assert_ne!(first.file_name, second.file_name);
        assert!(library.file_path(&second).exists());
    }

    #[tokio::test]
    async fn test_health_check_does_not_create_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        let library = library(&root);

        assert!(!library.health_check().await);
        assert!(!root.exists());

        library.ensure_root().await.unwrap();
        assert!(library.health_check().await);
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_type() {
        let root = tempfile::tempdir().unwrap();
        let library = library(root.path());
        let tmp = temp_with(b"abc");

        let err = library
            .import(&descriptor(&tmp, "data.xyz", None), &SideloadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::FileTypeNotAllowed(_)));
        assert!(library.is_empty());
    }

    #[tokio::test]
    async fn test_import_rejects_blocked_extension() {
        let root = tempfile::tempdir().unwrap();
        let library = library(root.path());
        let tmp = temp_with(b"<?php echo 1;");

        let err = library
            .import(
                &descriptor(&tmp, "shell.php", Some("image/jpeg")),
                &SideloadOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "file_type_not_allowed");
    }

    #[tokio::test]
    async fn test_import_rejects_empty_file() {
        let root = tempfile::tempdir().unwrap();
        let library = library(root.path());
        let tmp = temp_with(b"");

        let err = library
            .import(
                &descriptor(&tmp, "photo.jpg", Some("image/jpeg")),
                &SideloadOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ImportError::InvalidFile("File is empty.".to_string()));
    }

    #[tokio::test]
    async fn test_import_applies_overrides() {
        let root = tempfile::tempdir().unwrap();
        let library = library(root.path());
        let tmp = temp_with(b"abc");

        let options = SideloadOptions::attached_to(3)
            .with_description("original")
            .with_override("title", "Sunset over the bay")
            .with_override("description", "replaced")
            .with_override("menu_order", 4);
        let id = library
            .import(&descriptor(&tmp, "sunset.png", Some("image/png")), &options)
            .await
            .unwrap();

        let record = library.get(id).unwrap();
        assert_eq!(record.title, "Sunset over the bay");
        assert_eq!(record.description.as_deref(), Some("replaced"));
        assert_eq!(record.extra["menu_order"], 4);
        assert!(!record.extra.contains_key("title"));
    }

    #[tokio::test]
    async fn test_import_missing_source_is_storage_error() {
        let root = tempfile::tempdir().unwrap();
        let library = library(root.path());
        let file = FileDescriptor {
            tmp_name: root.path().join("does-not-exist"),
            mime_type: Some("image/png".to_string()),
            name: "ghost.png".to_string(),
            size: 10,
        };

        let err = library
            .import(&file, &SideloadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Storage(_)));

        // the claimed destination is released again
        let subdir = Utc::now().format("%Y/%m").to_string();
        let dir = root.path().join(subdir);
        assert!(std::fs::read_dir(dir).unwrap().next().is_none());
    }
}
