//! Mirror of an upstream real-estate catalog: keeps a local set of active
//! listings and their photos in sync with a paginated upstream source, and
//! serves the stored photos over HTTP with optional size-budgeted
//! transcoding.

pub mod background_jobs;
pub mod config;
pub mod retry;
pub mod server;
pub mod store;
pub mod sync;
pub mod transcode;
pub mod upstream;
