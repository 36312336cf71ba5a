use crate::config::ConfigError;
use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::fmt;
use url::Url;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type HttpClient = Client<HttpConnector, Body>;

/// Transport-level failure talking to the origin (connect, protocol, reset
/// before headers).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FetchError(BoxError);

impl FetchError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(err.into())
    }
}

/// Executes an outbound request against the origin.
///
/// The returned response carries an unread body stream; reading it is the
/// caller's job so body failures can be told apart from fetch failures.
pub trait OriginFetcher: Send + Sync {
    fn fetch(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, FetchError>>;
}

/// Origin fetcher backed by the hyper-util pooled client.
#[derive(Clone)]
pub struct HyperFetcher {
    client: HttpClient,
}

impl HyperFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

impl Default for HyperFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginFetcher for HyperFetcher {
    fn fetch(&self, req: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, FetchError>> {
        let fut = self.client.request(req);
        Box::pin(async move {
            let resp = fut.await.map_err(FetchError::new)?;
            Ok(resp.map(Body::new))
        })
    }
}

/// Base URL of the origin, normalized without a trailing slash so it can be
/// joined directly with a request's path and query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    base: String,
}

impl Origin {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|source| ConfigError::InvalidOrigin {
            origin: raw.to_string(),
            reason: source.to_string(),
        })?;

        if url.scheme() != "http" {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidOrigin {
                origin: raw.to_string(),
                reason: "missing host".into(),
            });
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(ConfigError::InvalidOrigin {
                origin: raw.to_string(),
                reason: "query and fragment are not allowed".into(),
            });
        }

        let mut base = url.to_string();
        if base.ends_with('/') {
            base.pop();
        }
        Ok(Self { base })
    }

    /// Absolute URL on the origin for an inbound path and query.
    pub fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base, path_and_query)
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let a = Origin::parse("http://localhost:9001").unwrap();
        let b = Origin::parse("http://localhost:9001/").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "http://localhost:9001");
        assert_eq!(a.target("/widgets?id=1"), "http://localhost:9001/widgets?id=1");
    }

    #[test]
    fn base_path_is_kept() {
        let o = Origin::parse("http://api.internal/v1/").unwrap();
        assert_eq!(o.target("/projects"), "http://api.internal/v1/projects");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Origin::parse("not a url"),
            Err(ConfigError::InvalidOrigin { .. })
        ));
        assert!(matches!(
            Origin::parse("http://h/?q=1"),
            Err(ConfigError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        match Origin::parse("https://example.com") {
            Err(ConfigError::UnsupportedScheme(s)) => assert_eq!(s, "https"),
            other => panic!("expected UnsupportedScheme, got {:?}", other),
        }
        assert!(matches!(
            Origin::parse("ftp://example.com"),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[tokio::test]
    async fn hyper_fetcher_reports_connect_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let req = Request::builder()
            .uri(format!("http://{}/", addr))
            .body(Body::empty())
            .unwrap();
        assert!(HyperFetcher::new().fetch(req).await.is_err());
    }
}
