//! HTTP surface of the registry.
//!
//! | Route        | Method | Input                            |
//! |--------------|--------|----------------------------------|
//! | `/`          | POST   | multipart `file`                 |
//! | `/base`      | POST   | `?base64Image=`                  |
//! | `/faces`     | GET    |                                  |
//! | `/faces`     | POST   | `?id=` + multipart `file`        |
//! | `/faces`     | DELETE | `?id=`                           |
//! | `/facesbase` | GET    |                                  |
//! | `/facesbase` | POST   | `?id=&base64Image=`              |
//! | `/facesbase` | DELETE | `?id=`                           |
//!
//! Registry errors caused by the request come back as 400 with the message as
//! plain text. Every route answers cross-origin requests from any origin.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facereg_core::{
    FaceRegistry, ImageUpload, ProviderError, Recognition, RegistryError, RegistryResult,
};
use serde::Deserialize;
use thiserror::Error;
use tower_http::cors::CorsLayer;

/// Multipart field carrying the image.
const FILE_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    registry: Arc<FaceRegistry>,
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Base64Params {
    id: Option<String>,
    #[serde(rename = "base64Image")]
    base64_image: Option<String>,
}

impl Base64Params {
    fn upload(&self) -> RegistryResult<ImageUpload> {
        let encoded = self
            .base64_image
            .as_deref()
            .ok_or(RegistryError::InvalidFile)?;
        ImageUpload::from_base64(encoded)
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("registry task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Registry(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Registry(RegistryError::Provider(
                ProviderError::Timeout(_) | ProviderError::Unavailable,
            )) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Multipart(err) => err.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, %status, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the router over `registry`.
pub fn router(registry: Arc<FaceRegistry>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", post(recognize_upload))
        .route("/base", post(recognize_base64))
        .route(
            "/faces",
            get(list_faces).post(enroll_upload).delete(revoke_face),
        )
        .route(
            "/facesbase",
            get(list_faces).post(enroll_base64).delete(revoke_face),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(AppState { registry })
}

/// Run a registry operation off the async workers; embedding is CPU-bound.
async fn run_blocking<T, F>(state: &AppState, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&FaceRegistry) -> RegistryResult<T> + Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    let value = tokio::task::spawn_blocking(move || op(&registry)).await??;
    Ok(Json(value))
}

/// Pull the `file` field out of a multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<ImageUpload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        return Ok(ImageUpload::new(filename, bytes.to_vec()));
    }
    Err(RegistryError::InvalidFile.into())
}

async fn recognize_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Recognition> {
    let upload = read_upload(multipart).await?;
    run_blocking(&state, move |registry| registry.recognize(&upload)).await
}

async fn recognize_base64(
    State(state): State<AppState>,
    Query(params): Query<Base64Params>,
) -> ApiResult<Recognition> {
    let upload = params.upload()?;
    run_blocking(&state, move |registry| registry.recognize(&upload)).await
}

async fn list_faces(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.list())
}

async fn enroll_upload(
    State(state): State<AppState>,
    Query(params): Query<IdParams>,
    multipart: Multipart,
) -> ApiResult<Vec<String>> {
    let upload = read_upload(multipart).await?;
    run_blocking(&state, move |registry| {
        registry.enroll(params.id.as_deref(), &upload)
    })
    .await
}

async fn enroll_base64(
    State(state): State<AppState>,
    Query(params): Query<Base64Params>,
) -> ApiResult<Vec<String>> {
    let upload = params.upload()?;
    run_blocking(&state, move |registry| {
        registry.enroll(params.id.as_deref(), &upload)
    })
    .await
}

async fn revoke_face(
    State(state): State<AppState>,
    Query(params): Query<IdParams>,
) -> ApiResult<Vec<String>> {
    run_blocking(&state, move |registry| registry.revoke(params.id.as_deref())).await
}
