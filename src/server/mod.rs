//! The HTTP serving surface: stored images (optionally transcoded to a
//! byte budget), per-listing photo counts, server stats and the jobs API.

mod http_layers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::background_jobs::SchedulerHandle;
use crate::store::{ActiveSetStore, ImageStore};
use crate::transcode::{ServeError, VariantService};

pub use http_layers::http_cache;

#[derive(Clone)]
pub struct ServerState {
    start_time: Instant,
    images: Arc<ImageStore>,
    active_set: Arc<ActiveSetStore>,
    variants: Arc<VariantService>,
    scheduler: Option<SchedulerHandle>,
}

impl ServerState {
    pub fn new(
        images: Arc<ImageStore>,
        active_set: Arc<ActiveSetStore>,
        variants: Arc<VariantService>,
        scheduler: Option<SchedulerHandle>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            images,
            active_set,
            variants,
            scheduler,
        }
    }
}

#[derive(Serialize)]
struct ServerStats {
    uptime: String,
    active_listings: usize,
    stored_images: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> Response {
    let active_listings = state.active_set.len().unwrap_or(0);
    let stored_images = state.images.total_files().unwrap_or(0);
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        active_listings,
        stored_images,
    })
    .into_response()
}

#[derive(Deserialize)]
struct ImageQuery {
    #[serde(default)]
    low_quality: bool,
    max_bytes: Option<u64>,
}

async fn serve_image(
    State(state): State<ServerState>,
    Path(file_name): Path<String>,
    Query(query): Query<ImageQuery>,
) -> Response {
    // The file name is a single path segment; anything that could climb out
    // of the image directory is refused outright.
    if file_name.contains(['/', '\\']) || file_name.contains("..") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match state
        .variants
        .serve(&file_name, query.low_quality, query.max_bytes)
        .await
    {
        Ok(served) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, served.content_type)
            .body(Body::from(served.bytes.to_vec()))
            .expect("valid response"),
        Err(ServeError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to serve image {}: {}", file_name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PhotoCountResponse {
    listing_key: String,
    photo_count: usize,
}

async fn photo_count(
    State(state): State<ServerState>,
    Path(listing_key): Path<String>,
) -> Response {
    match state.images.photo_count(&listing_key) {
        Ok(count) => Json(PhotoCountResponse {
            listing_key,
            photo_count: count,
        })
        .into_response(),
        Err(e) => {
            error!("Failed to count photos of {}: {:#}", listing_key, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn list_jobs(State(state): State<ServerState>) -> Response {
    let jobs = state
        .scheduler
        .as_ref()
        .map(|handle| handle.jobs())
        .unwrap_or_default();
    Json(jobs).into_response()
}

async fn trigger_job(State(state): State<ServerState>, Path(job_id): Path<String>) -> Response {
    let Some(handle) = state.scheduler.as_ref() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let known = handle.jobs().iter().any(|j| j.id == job_id);
    if !known {
        return StatusCode::NOT_FOUND.into_response();
    }
    if handle.trigger(&job_id).await {
        StatusCode::ACCEPTED.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

pub fn make_app(state: ServerState, content_cache_age_sec: usize) -> Router {
    let image_routes: Router = Router::new()
        .route("/images/{file_name}", get(serve_image))
        .route_layer(middleware::from_fn_with_state(
            content_cache_age_sec,
            http_cache,
        ))
        .with_state(state.clone());

    let api_routes: Router = Router::new()
        .route("/listings/{listing_key}/photo-count", get(photo_count))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}/run", post(trigger_job))
        .with_state(state.clone());

    #[allow(unused_mut)]
    let mut app: Router = Router::new()
        .route("/", get(home))
        .with_state(state)
        .merge(image_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http());

    #[cfg(feature = "slowdown")]
    {
        app = app.layer(middleware::from_fn(http_layers::slowdown_request));
    }

    app
}

pub async fn run_server(
    state: ServerState,
    port: u16,
    content_cache_age_sec: usize,
) -> Result<()> {
    let app = make_app(state, content_cache_age_sec);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Serving on port {}", port);
    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranscoderSettings;
    use crate::transcode::codec;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        images: Arc<ImageStore>,
        active_set: Arc<ActiveSetStore>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let images = Arc::new(ImageStore::new(dir.path().join("images")).unwrap());
        let active_set = Arc::new(ActiveSetStore::new(dir.path().join("active_listings.json")));
        let variants = Arc::new(VariantService::new(
            Arc::clone(&images),
            TranscoderSettings::default(),
        ));
        let state = ServerState::new(
            Arc::clone(&images),
            Arc::clone(&active_set),
            variants,
            None,
        );
        Fixture {
            app: make_app(state, 3600),
            images,
            active_set,
            _dir: dir,
        }
    }

    fn store_photo(images: &ImageStore, key: &str, index: usize) {
        let img = codec::testing::synthetic_photo(320, 240);
        let bytes = codec::encode_jpeg(&img, 85).unwrap();
        images.write_asset(key, index, "jpg", &bytes).unwrap();
    }

    async fn get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_home_reports_stats() {
        let f = fixture();
        f.active_set
            .replace(&["A".to_string(), "B".to_string()].into_iter().collect())
            .unwrap();
        store_photo(&f.images, "A", 0);

        let response = get(&f.app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["active_listings"], 2);
        assert_eq!(json["stored_images"], 1);
        assert!(json["uptime"].is_string());
    }

    #[tokio::test]
    async fn test_missing_image_is_404_without_cache_header() {
        let f = fixture();
        let response = get(&f.app, "/images/absent-0.jpg").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("Cache-Control").is_none());
    }

    #[tokio::test]
    async fn test_image_passthrough_with_cache_header() {
        let f = fixture();
        store_photo(&f.images, "W100", 0);

        let response = get(&f.app, "/images/W100-0.jpg").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/jpeg"
        );
        assert_eq!(
            response.headers().get("Cache-Control").unwrap(),
            "max-age=3600"
        );
    }

    #[tokio::test]
    async fn test_low_quality_variant_fits_budget() {
        let f = fixture();
        store_photo(&f.images, "W100", 0);

        let response = get(&f.app, "/images/W100-0.jpg?low_quality=true&max_bytes=8192").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.len() <= 8192);
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let f = fixture();
        let response = get(&f.app, "/images/..%2F..%2Fetc%2Fpasswd").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_photo_count_counts_only_this_listing() {
        let f = fixture();
        store_photo(&f.images, "W100", 0);
        store_photo(&f.images, "W100", 1);
        store_photo(&f.images, "W1000", 0);

        let response = get(&f.app, "/api/listings/W100/photo-count").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["listingKey"], "W100");
        assert_eq!(json["photoCount"], 2);
    }

    #[tokio::test]
    async fn test_photo_count_zero_for_unknown_listing() {
        let f = fixture();
        let json = body_json(get(&f.app, "/api/listings/NOPE/photo-count").await).await;
        assert_eq!(json["photoCount"], 0);
    }

    #[tokio::test]
    async fn test_jobs_endpoint_without_scheduler_is_empty() {
        let f = fixture();
        let response = get(&f.app, "/api/jobs").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_trigger_without_scheduler_is_unavailable() {
        let f = fixture();
        let response = f
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/jobs/full_reconcile/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
