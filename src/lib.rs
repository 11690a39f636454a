pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::SideloadConfig;
use crate::services::fetcher::{FetchError, HttpFetcher};
use crate::services::media_library::LocalMediaLibrary;
use crate::services::sideloader::Sideloader;
use crate::utils::url::UrlPolicy;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::sideload::sideload,
        api::handlers::media::get_media,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::sideload::SideloadPayload,
            api::handlers::sideload::SideloadResponse,
            api::handlers::health::HealthResponse,
            models::AssetRecord,
        )
    ),
    tags(
        (name = "media", description = "Remote media import endpoints"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub sideloader: Arc<Sideloader>,
    pub library: Arc<LocalMediaLibrary>,
    pub config: SideloadConfig,
}

impl AppState {
    /// Wires the HTTP fetcher and the local media library from `config`
    pub fn from_config(config: SideloadConfig) -> Result<Self, FetchError> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        let library = Arc::new(LocalMediaLibrary::from_config(&config));
        let sideloader = Sideloader::new(fetcher, library.clone())
            .with_policy(UrlPolicy::from(&config));

        Ok(Self {
            sideloader: Arc::new(sideloader),
            library,
            config,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/sideload", post(api::handlers::sideload::sideload))
        .route("/media/:id", get(api::handlers::media::get_media))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
