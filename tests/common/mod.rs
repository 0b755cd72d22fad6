//! Shared test infrastructure: a scripted upstream source and a real HTTP
//! server bound to an ephemeral port.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use propmirror_server::config::{SyncSettings, TranscoderSettings, UpstreamSettings};
use propmirror_server::server::{make_app, ServerState};
use propmirror_server::store::{ActiveSetStore, ImageStore};
use propmirror_server::transcode::VariantService;
use propmirror_server::upstream::{ListingRow, ListingSource, MediaDescriptor, UpstreamError};

/// Upstream fake: listing queries pop pre-scripted pages, media lookups and
/// payload fetches come from maps.
#[derive(Default)]
pub struct FakeUpstream {
    pages: Mutex<VecDeque<Vec<ListingRow>>>,
    media: Mutex<HashMap<String, Vec<MediaDescriptor>>>,
    payloads: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, rows: Vec<ListingRow>) {
        self.pages.lock().unwrap().push_back(rows);
    }

    pub fn add_listing(&self, key: &str, photos: &[(&str, bool)]) {
        let descriptors = photos
            .iter()
            .map(|(url, preferred)| MediaDescriptor {
                url: Some(url.to_string()),
                preferred: Some(*preferred),
            })
            .collect();
        self.media.lock().unwrap().insert(key.to_string(), descriptors);
    }

    pub fn set_payload(&self, url: &str, bytes: Vec<u8>) {
        self.payloads.lock().unwrap().insert(url.to_string(), bytes);
    }
}

#[async_trait]
impl ListingSource for FakeUpstream {
    async fn query_listings(
        &self,
        _filter: &str,
        _orderby: &str,
        _top: usize,
    ) -> Result<Vec<ListingRow>, UpstreamError> {
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn media_for_listing(&self, key: &str) -> Result<Vec<MediaDescriptor>, UpstreamError> {
        Ok(self
            .media
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, UpstreamError> {
        self.payloads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| UpstreamError::Rejected {
                status: 404,
                message: format!("no payload for {}", url),
            })
    }
}

pub fn listing_row(key: &str, modified: &str) -> ListingRow {
    ListingRow {
        listing_key: key.to_string(),
        modification_timestamp: modified.parse().unwrap(),
        media_change_timestamp: None,
    }
}

pub fn upstream_settings() -> UpstreamSettings {
    UpstreamSettings {
        base_url: "https://query.example.com/odata".to_string(),
        bearer_token: String::new(),
        page_size: 500,
        request_timeout_secs: 30,
        category_filters: Vec::new(),
        regions: Vec::new(),
        region_chunk_size: 15,
        status_filter: "StandardStatus eq 'Active'".to_string(),
        full_scan_start: "2024-01-01T00:00:00Z".parse().unwrap(),
    }
}

pub fn sync_settings() -> SyncSettings {
    let mut settings = SyncSettings::default();
    settings.retry.base_delay_secs = 0;
    settings.retry.max_delay_secs = 0;
    settings.item_delay_ms = 0;
    settings
}

/// A JPEG photo payload for the fake CDN.
pub fn jpeg_photo(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * 7 + y * 13) % 256) as u8])
    });
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 85)
        .encode_image(&img)
        .unwrap();
    out
}

/// The mirror's local state plus a running HTTP server.
pub struct TestServer {
    pub base_url: String,
    pub images: Arc<ImageStore>,
    pub active_set: Arc<ActiveSetStore>,
    _data_dir: TempDir,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let data_dir = TempDir::new().unwrap();
        let images = Arc::new(ImageStore::new(data_dir.path().join("images")).unwrap());
        let active_set = Arc::new(ActiveSetStore::new(
            data_dir.path().join("active_listings.json"),
        ));
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
        let app = make_app(state, 3600);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            images,
            active_set,
            _data_dir: data_dir,
        }
    }
}
