use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failures while serving one proxied request. Each is terminal for that
/// request: nothing is retried and nothing is cached.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to create upstream request: {0}")]
    RequestBuild(#[from] axum::http::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] crate::origin::FetchError),
    #[error("failed to read upstream response body: {0}")]
    ReadBody(#[source] axum::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RequestBuild(_) | ProxyError::ReadBody(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Body text sent to the caller. Upstream detail stays in the logs.
    fn public_message(&self) -> &'static str {
        match self {
            ProxyError::RequestBuild(_) => "failed to create upstream request",
            ProxyError::Upstream(_) => "bad gateway",
            ProxyError::ReadBody(_) => "failed to read upstream response body",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}
