use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use utoipa::ToSchema;

/// Identifier of a stored media asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AssetId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Optional inputs of a sideload.
///
/// * `associated_record_id` - record the asset is attached to, `0` leaves it unattached
/// * `description` - free text stored with the asset
/// * `override_fields` - importer-specific values that replace derived ones
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideloadOptions {
    pub associated_record_id: u64,
    pub description: Option<String>,
    pub override_fields: Map<String, Value>,
}

impl SideloadOptions {
    pub fn attached_to(associated_record_id: u64) -> Self {
        Self {
            associated_record_id,
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.override_fields.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SideloadRequest {
    pub url: String,
    pub options: SideloadOptions,
}

/// Upload-like description of a downloaded file handed to the importer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub tmp_name: PathBuf,
    pub mime_type: Option<String>,
    pub name: String,
    pub size: u64,
}

/// A media asset held by the local media library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AssetRecord {
    #[schema(value_type = u64)]
    pub id: AssetId,
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    /// Path relative to the uploads directory, always with `/` separators
    pub path: String,
    pub mime_type: String,
    pub size: u64,
    pub associated_record_id: u64,
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}
