use crate::error::ProxyError;
use crate::origin::{Origin, OriginFetcher};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode};
use axum::routing::any;
use axum::Router;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use ttl_cache::{CacheEntry, CacheStore};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Headers that describe one connection rather than the resource. Never
/// forwarded in either direction and never cached.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Shared state passed to all handlers.
pub struct AppState {
    pub store: Arc<CacheStore>,
    pub fetcher: Arc<dyn OriginFetcher>,
    pub origin: Origin,
    pub ttl: Duration,
    /// Serve expired-but-unswept entries as misses instead of hits.
    pub strict_expiry: bool,
}

/// Cache key: verb, normalized origin and the request's path and query.
pub fn cache_key(method: &Method, origin: &Origin, path_and_query: &str) -> String {
    format!("{}:{}{}", method, origin, path_and_query)
}

/// Proxy router. A route of "/" captures every path; any other route is
/// matched exactly.
pub fn router(state: Arc<AppState>, route: &str) -> Router {
    let router = if route == "/" {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
    } else {
        Router::new().route(route, any(proxy_handler))
    };

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Main proxy handler. Checks the store, forwards to the origin on miss and
/// caches whatever the origin returned.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Result<Response<Body>, ProxyError> {
    let start = std::time::Instant::now();
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let key = cache_key(&parts.method, &state.origin, path_and_query);

    if let Some(cached) = state.store.get(&key) {
        if !state.strict_expiry || cached.is_live(Instant::now()) {
            tracing::debug!(
                key = %key,
                latency_us = start.elapsed().as_micros() as u64,
                "cache HIT"
            );
            return Ok(build_response(
                cached.status,
                cached.headers.clone(),
                cached.body.clone(),
                "HIT",
            ));
        }
        tracing::debug!(key = %key, "cached entry expired, refetching");
    }

    let target = state.origin.target(path_and_query);
    // Origin::parse only admits absolute http URLs and the path comes from an
    // already-parsed inbound URI, so this fails only if those checks change.
    let upstream_req = build_upstream_request(&parts, &target, body).map_err(|e| {
        tracing::error!(error = %e, key = %key, "failed to build upstream request");
        ProxyError::RequestBuild(e)
    })?;

    let upstream_resp = state.fetcher.fetch(upstream_req).await.map_err(|e| {
        tracing::error!(error = %e, upstream = %target, "upstream request failed");
        ProxyError::Upstream(e)
    })?;

    let (resp_parts, resp_body) = upstream_resp.into_parts();
    let body_bytes = match resp_body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::error!(error = %e, upstream = %target, "failed to read upstream response body");
            return Err(ProxyError::ReadBody(e));
        }
    };

    let status = resp_parts.status;
    let headers = response_headers(&parts.method, status, resp_parts.headers);

    let entry = CacheEntry::new(
        status,
        headers.clone(),
        body_bytes.clone(),
        Instant::now(),
        state.ttl,
    );
    state.store.set(key.clone(), entry);

    tracing::debug!(
        key = %key,
        status = status.as_u16(),
        bytes = body_bytes.len(),
        latency_us = start.elapsed().as_micros() as u64,
        "cache MISS → upstream"
    );

    Ok(build_response(status, headers, body_bytes, "MISS"))
}

/// Outbound request to the origin: same method, same body stream, end-to-end
/// request headers. `host` is left for the client to derive from the target.
fn build_upstream_request(
    parts: &Parts,
    target: &str,
    body: Body,
) -> Result<Request<Body>, axum::http::Error> {
    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);

    let mut req = Request::builder()
        .method(parts.method.clone())
        .uri(target)
        .body(body)?;
    *req.headers_mut() = headers;
    Ok(req)
}

/// Headers stored with the entry and sent back to the caller.
///
/// `content-length` is recomputed from the buffered body, except for
/// responses that never carry one (HEAD, 204, 304) where the origin's value
/// describes the resource and is kept.
fn response_headers(method: &Method, status: StatusCode, mut headers: HeaderMap) -> HeaderMap {
    strip_hop_by_hop(&mut headers);
    let bodiless = method == Method::HEAD
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;
    if !bodiless {
        headers.remove(CONTENT_LENGTH);
    }
    headers
}

/// Remove the fixed hop-by-hop set plus any header named in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn build_response(
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    cache_status: &'static str,
) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(cache_status));
    response
}
