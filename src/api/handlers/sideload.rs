use crate::AppState;
use crate::api::error::AppError;
use crate::models::{AssetRecord, SideloadOptions, SideloadRequest};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct SideloadPayload {
    /// Absolute http(s) URL of the remote file
    pub url: String,
    /// Record the asset is attached to; 0 leaves it unattached
    #[serde(default, alias = "post_id")]
    pub associated_record_id: u64,
    pub description: Option<String>,
    /// Importer-specific values, e.g. `title`
    #[serde(default, alias = "post_data")]
    #[schema(value_type = Object)]
    pub override_fields: Map<String, Value>,
}

impl From<SideloadPayload> for SideloadRequest {
    fn from(payload: SideloadPayload) -> Self {
        Self {
            url: payload.url,
            options: SideloadOptions {
                associated_record_id: payload.associated_record_id,
                description: payload.description,
                override_fields: payload.override_fields,
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SideloadResponse {
    pub id: u64,
    pub asset: Option<AssetRecord>,
}

#[utoipa::path(
    post,
    path = "/sideload",
    request_body = SideloadPayload,
    responses(
        (status = 201, description = "File downloaded and stored", body = SideloadResponse),
        (status = 400, description = "Invalid URL or file"),
        (status = 413, description = "File too large"),
        (status = 415, description = "File type not allowed"),
        (status = 502, description = "Remote server returned an error"),
        (status = 504, description = "Remote server timed out")
    ),
    tag = "media"
)]
pub async fn sideload(
    State(state): State<AppState>,
    Json(payload): Json<SideloadPayload>,
) -> Result<impl IntoResponse, AppError> {
    let request = SideloadRequest::from(payload);
    tracing::info!("📥 Sideloading {}", request.url);

    let id = state.sideloader.sideload_request(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(SideloadResponse {
            id: id.0,
            asset: state.library.get(id),
        }),
    ))
}
