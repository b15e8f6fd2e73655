use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use client_core::{HostedBackend, ImageUpload};
use serde::Deserialize;
use shared::{
    domain::{Wine, WineId},
    error::{ApiError, ErrorCode},
    protocol::{ReviewRecord, SubmissionReceipt},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, info, warn};

mod api;
mod app_state;
mod config;

use api::{ApiContext, ReviewUpload};
use app_state::AppState;
use config::load_settings;

const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct WineSearchQuery {
    #[serde(default)]
    q: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = load_settings()?;
    let backend = HostedBackend::new(&settings.hosted_config())
        .context("failed to configure hosted backend; check BACKEND_URL and BACKEND_ANON_KEY")?;
    let api = ApiContext::new(Arc::new(backend), settings.submission_options());

    let state = AppState {
        api,
        recent_reviews_limit: settings.recent_reviews_limit,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(
        %addr,
        backend = %settings.backend_url,
        bucket = %settings.image_bucket,
        remove_orphaned_images = settings.remove_orphaned_images,
        "server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/review/wines", get(http_search_wines))
        .route("/review/wines/:wine_id", get(http_wine_by_id))
        .route("/review", post(http_submit_review))
        .route("/logout", post(http_logout))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn index(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ReviewRecord>>, Response> {
    let reviews = api::recent_reviews(&state.api, state.recent_reviews_limit)
        .await
        .map_err(reject)?;
    Ok(Json(reviews))
}

async fn http_search_wines(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<WineSearchQuery>,
) -> Result<Json<Vec<Wine>>, Response> {
    let session = api::authenticate(&state.api, bearer_token(&headers))
        .await
        .map_err(reject)?;
    let wines = api::search_wines(&state.api, &session, &q.q)
        .await
        .map_err(reject)?;
    Ok(Json(wines))
}

async fn http_wine_by_id(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(wine_id): Path<i64>,
) -> Result<Json<Wine>, Response> {
    let session = api::authenticate(&state.api, bearer_token(&headers))
        .await
        .map_err(reject)?;
    let wine = api::wine_by_id(&state.api, &session, WineId(wine_id))
        .await
        .map_err(reject)?;
    Ok(Json(wine))
}

async fn http_submit_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionReceipt>), Response> {
    let session = api::authenticate(&state.api, bearer_token(&headers))
        .await
        .map_err(reject)?;
    let upload = read_review_upload(multipart).await.map_err(reject)?;
    let receipt = api::submit_review(&state.api, &session, upload)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn http_logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Redirect, Response> {
    let session = api::authenticate(&state.api, bearer_token(&headers))
        .await
        .map_err(reject)?;
    api::sign_out(&state.api, session).await.map_err(reject)?;
    Ok(Redirect::to("/"))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Unauthenticated callers go back to the landing page, everything else is a
/// JSON error body.
fn reject(error: ApiError) -> Response {
    let status = match error.code {
        ErrorCode::Unauthorized => return Redirect::to("/").into_response(),
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error)).into_response()
}

async fn read_review_upload(mut multipart: Multipart) -> Result<ReviewUpload, ApiError> {
    let mut upload = ReviewUpload::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                if let Some(mime) = content_type.as_deref() {
                    if !mime.starts_with("image/") {
                        return Err(ApiError::new(
                            ErrorCode::Validation,
                            format!("image has content type '{mime}', expected image/*"),
                        ));
                    }
                }
                let bytes = field.bytes().await.map_err(malformed)?;
                upload.image = Some(ImageUpload {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "wine_id" => {
                let raw = field.text().await.map_err(malformed)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let id = raw.parse::<i64>().map_err(|_| {
                        ApiError::new(ErrorCode::Validation, format!("wine_id '{raw}' is not an id"))
                    })?;
                    upload.wine_id = Some(WineId(id));
                }
            }
            "new_wine" => {
                let raw = field.text().await.map_err(malformed)?;
                upload.new_wine = matches!(raw.trim(), "1" | "true" | "on" | "yes");
            }
            "wine_name" => upload.wine_name = field.text().await.map_err(malformed)?,
            "year" => upload.year = field.text().await.map_err(malformed)?,
            "grape" => upload.grape = field.text().await.map_err(malformed)?,
            "rating" => upload.rating = field.text().await.map_err(malformed)?,
            "review" => upload.review = field.text().await.map_err(malformed)?,
            other => debug!(field = other, "review form: ignoring unknown field"),
        }
    }
    Ok(upload)
}

fn malformed(error: MultipartError) -> ApiError {
    warn!(%error, "review form: unreadable multipart body");
    ApiError::new(
        ErrorCode::Validation,
        format!("malformed form data: {}", error.body_text()),
    )
}

#[cfg(test)]
#[path = "tests/fakes.rs"]
mod fakes;

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
