//! On-demand size-budgeted image variants, backed by a TTL+LRU cache.

mod cache;
pub(crate) mod codec;
mod transcoder;

pub use cache::{SweepReport, VariantCache, VariantKey};
pub use transcoder::{transcode_to_budget, TranscodeSettings};

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::TranscoderSettings;
use crate::store::ImageStore;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// A served image: its bytes plus the content type to report.
pub struct ServedImage {
    pub bytes: Arc<Vec<u8>>,
    pub content_type: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("image not found")]
    NotFound,
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves stored originals and their size-budgeted variants.
///
/// Originals pass through untouched. Variant requests hit the cache first;
/// on a miss the encode runs on a blocking thread outside the cache lock,
/// so distinct variants encode concurrently. A variant that fails to decode
/// falls back to the original bytes.
pub struct VariantService {
    images: Arc<ImageStore>,
    cache: Arc<VariantCache>,
    settings: TranscoderSettings,
}

impl VariantService {
    pub fn new(images: Arc<ImageStore>, settings: TranscoderSettings) -> Self {
        let cache = Arc::new(VariantCache::new(
            Duration::from_secs(settings.cache_ttl_secs),
            settings.cache_max_entries,
        ));
        Self {
            images,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> Arc<VariantCache> {
        Arc::clone(&self.cache)
    }

    pub async fn serve(
        &self,
        file_name: &str,
        low_quality: bool,
        max_bytes: Option<u64>,
    ) -> Result<ServedImage, ServeError> {
        let path = self.images.asset_path(file_name);
        let original = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ServeError::NotFound),
            Err(e) => return Err(ServeError::Io(e)),
        };

        if !low_quality {
            return Ok(Self::passthrough(original));
        }

        let budget = max_bytes
            .unwrap_or(self.settings.default_budget_bytes)
            .max(1);
        let key = VariantKey {
            path,
            budget,
        };
        if let Some(bytes) = self.cache.get(&key) {
            return Ok(ServedImage {
                bytes,
                content_type: "image/jpeg",
            });
        }

        let search = self.settings.search.clone();
        let source = original.clone();
        let encoded =
            tokio::task::spawn_blocking(move || transcode_to_budget(&source, budget, &search))
                .await;

        match encoded {
            Ok(Ok(variant)) => {
                let bytes = Arc::new(variant);
                self.cache.insert(key, Arc::clone(&bytes));
                Ok(ServedImage {
                    bytes,
                    content_type: "image/jpeg",
                })
            }
            Ok(Err(e)) => {
                // Undecodable source: degrade to the stored bytes as-is.
                warn!("Transcode of {} failed, serving original: {}", file_name, e);
                Ok(Self::passthrough(original))
            }
            Err(e) => {
                warn!("Transcode task for {} panicked: {}", file_name, e);
                Ok(Self::passthrough(original))
            }
        }
    }

    fn passthrough(original: Vec<u8>) -> ServedImage {
        let content_type = infer::get(&original)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream");
        ServedImage {
            bytes: Arc::new(original),
            content_type,
        }
    }
}
