//! HTTP client used to reach embedding endpoints.

use std::time::Duration;

use reqwest::redirect::Policy;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request timeout. Large batches on self-hosted endpoints can take minutes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for `/embeddings` POSTs.
///
/// Redirects are not followed: a redirected POST would be replayed as a GET and
/// could carry the bearer token to another host. The user-agent is
/// `sift-llm/{version}`.
#[must_use]
pub fn embedding_client(request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .user_agent(concat!("sift-llm/", env!("CARGO_PKG_VERSION")))
        .redirect(Policy::none())
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}
