//! The synchronizer: full reconciliation, delta windows, and the image
//! downloader they both hand changed listings to.

mod delta;
mod downloader;
mod reconciler;

pub use delta::{DeltaReport, DeltaSync, DeltaWindow};
pub use downloader::{DownloadReport, ImageDownloader};
pub use reconciler::{ReconcileReport, Reconciler};
