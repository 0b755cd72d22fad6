use crate::retry::RetryAction;

/// Errors from the upstream catalog, split along the lines the sync loop
/// cares about: transient failures are retried with backoff, malformed
/// payloads are skipped and logged, rejections abort immediately.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("transient upstream error: {0}")]
    Transient(String),

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("upstream rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl UpstreamError {
    pub fn retry_action(&self) -> RetryAction {
        match self {
            UpstreamError::Transient(_) => RetryAction::Retry,
            UpstreamError::Malformed(_) | UpstreamError::Rejected { .. } => RetryAction::Abort,
        }
    }
}
