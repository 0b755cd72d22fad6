use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{SyncSettings, UpstreamSettings};
use crate::store::{ActiveSetStore, ImageStore};
use crate::transcode::VariantCache;
use crate::upstream::ListingSource;

/// Context provided to jobs during execution.
///
/// Carries the shared resources a sync or maintenance run needs, plus a
/// cancellation token for graceful shutdown handling.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// The upstream catalog.
    pub source: Arc<dyn ListingSource>,

    /// The local image directory.
    pub images: Arc<ImageStore>,

    /// The persisted active-listing snapshot.
    pub active_set: Arc<ActiveSetStore>,

    /// The transcoded-variant cache (for the sweep job).
    pub variant_cache: Arc<VariantCache>,

    /// Upstream scan shape (partitions, page size, scan start).
    pub upstream: UpstreamSettings,

    /// Retry, window and pacing settings shared by the sync paths.
    pub sync: SyncSettings,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        source: Arc<dyn ListingSource>,
        images: Arc<ImageStore>,
        active_set: Arc<ActiveSetStore>,
        variant_cache: Arc<VariantCache>,
        upstream: UpstreamSettings,
        sync: SyncSettings,
    ) -> Self {
        Self {
            cancellation_token,
            source,
            images,
            active_set,
            variant_cache,
            upstream,
            sync,
        }
    }

    /// Check if cancellation has been requested.
    ///
    /// Jobs should check this between items during long-running operations
    /// and return early with `JobError::Cancelled` if true.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
