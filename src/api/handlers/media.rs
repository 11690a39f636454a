use crate::AppState;
use crate::api::error::AppError;
use crate::models::{AssetId, AssetRecord};
use axum::{
    Json,
    extract::{Path, State},
};

#[utoipa::path(
    get,
    path = "/media/{id}",
    params(
        ("id" = u64, Path, description = "Asset ID")
    ),
    responses(
        (status = 200, description = "Stored asset", body = AssetRecord),
        (status = 404, description = "Asset not found")
    ),
    tag = "media"
)]
pub async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<AssetRecord>, AppError> {
    state
        .library
        .get(AssetId(id))
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Asset {} not found", id)))
}
