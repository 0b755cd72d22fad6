//! End-to-end tests: a scripted upstream feeds the sync jobs, and the
//! resulting mirror state is observed through the HTTP surface.

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::{jpeg_photo, listing_row, sync_settings, upstream_settings, FakeUpstream, TestServer};
use propmirror_server::background_jobs::jobs::FullReconcileJob;
use propmirror_server::background_jobs::{BackgroundJob, JobContext};
use propmirror_server::config::FullReconcileJobSettings;
use propmirror_server::transcode::VariantCache;
use propmirror_server::upstream::ListingSource;

fn job_context(server: &TestServer, source: Arc<FakeUpstream>) -> JobContext {
    JobContext::new(
        CancellationToken::new(),
        source as Arc<dyn ListingSource>,
        Arc::clone(&server.images),
        Arc::clone(&server.active_set),
        Arc::new(VariantCache::new(std::time::Duration::from_secs(60), 16)),
        upstream_settings(),
        sync_settings(),
    )
}

async fn run_full_reconcile(ctx: &JobContext) {
    let job = FullReconcileJob::from_settings(&FullReconcileJobSettings::default());
    job.execute(ctx).await.unwrap();
}

#[tokio::test]
async fn test_full_sync_then_serve() {
    let server = TestServer::spawn().await;
    let source = Arc::new(FakeUpstream::new());

    source.push_page(vec![
        listing_row("W100", "2025-06-01T10:00:00Z"),
        listing_row("X200", "2025-06-01T11:00:00Z"),
    ]);
    source.add_listing(
        "W100",
        &[
            ("https://cdn.example.com/w100-other.jpg", false),
            ("https://cdn.example.com/w100-main.jpg", true),
        ],
    );
    source.add_listing("X200", &[("https://cdn.example.com/x200.jpg", true)]);
    source.set_payload("https://cdn.example.com/w100-main.jpg", jpeg_photo(640, 480));
    source.set_payload("https://cdn.example.com/w100-other.jpg", jpeg_photo(320, 240));
    source.set_payload("https://cdn.example.com/x200.jpg", jpeg_photo(320, 240));

    let ctx = job_context(&server, Arc::clone(&source));
    run_full_reconcile(&ctx).await;

    let client = reqwest::Client::new();

    // Photo counts reflect the downloaded sets.
    let counts: serde_json::Value = client
        .get(format!("{}/api/listings/W100/photo-count", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(counts["listingKey"], "W100");
    assert_eq!(counts["photoCount"], 2);

    // The preferred photo landed at index 0 and serves as a JPEG.
    let response = client
        .get(format!("{}/images/W100-0.jpg", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/jpeg"
    );
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "max-age=3600"
    );
    let full_size = response.bytes().await.unwrap().len();

    // A budgeted variant of the same photo fits the requested cap.
    let budget = 10 * 1024;
    let variant = client
        .get(format!(
            "{}/images/W100-0.jpg?low_quality=true&max_bytes={}",
            server.base_url, budget
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(variant.status(), 200);
    let variant_size = variant.bytes().await.unwrap().len();
    assert!(variant_size <= budget);
    assert!(variant_size < full_size);

    // Unknown listings count zero; unknown files 404.
    let counts: serde_json::Value = client
        .get(format!("{}/api/listings/NOPE/photo-count", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(counts["photoCount"], 0);
    let missing = client
        .get(format!("{}/images/NOPE-0.jpg", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_second_reconcile_prunes_delisted_listing() {
    let server = TestServer::spawn().await;
    let source = Arc::new(FakeUpstream::new());

    source.push_page(vec![
        listing_row("KEEP", "2025-06-01T10:00:00Z"),
        listing_row("GONE", "2025-06-01T11:00:00Z"),
    ]);
    source.add_listing("KEEP", &[("https://cdn.example.com/keep.jpg", true)]);
    source.add_listing("GONE", &[("https://cdn.example.com/gone.jpg", true)]);
    source.set_payload("https://cdn.example.com/keep.jpg", jpeg_photo(320, 240));
    source.set_payload("https://cdn.example.com/gone.jpg", jpeg_photo(320, 240));

    let ctx = job_context(&server, Arc::clone(&source));
    run_full_reconcile(&ctx).await;
    assert!(server.images.has_any("GONE").unwrap());

    // Upstream delists GONE; the next authoritative scan prunes it.
    source.push_page(vec![listing_row("KEEP", "2025-06-01T10:00:00Z")]);
    run_full_reconcile(&ctx).await;

    let active = server.active_set.load().unwrap();
    assert!(active.contains("KEEP"));
    assert!(!active.contains("GONE"));
    assert!(server.images.has_any("KEEP").unwrap());
    assert!(!server.images.has_any("GONE").unwrap());

    let client = reqwest::Client::new();
    let counts: serde_json::Value = client
        .get(format!("{}/api/listings/GONE/photo-count", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(counts["photoCount"], 0);
    let removed = client
        .get(format!("{}/images/GONE-0.jpg", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status(), 404);
}
