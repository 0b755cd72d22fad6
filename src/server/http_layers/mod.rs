mod http_cache;
#[cfg(feature = "slowdown")]
mod random_slowdown;

pub use http_cache::http_cache;
#[cfg(feature = "slowdown")]
pub use random_slowdown::slowdown_request;
