//! Small origin server for trying the caching proxy by hand. Every request it
//! serves is counted, so repeated proxy hits show up as a flat counter.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Demo origin for the caching proxy.
#[derive(Parser)]
#[command(name = "demo-origin")]
struct Args {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:9001")]
    addr: String,

    /// Upper bound of the simulated response latency in milliseconds
    #[arg(long, default_value_t = 20)]
    max_delay_ms: u64,
}

struct OriginState {
    served: AtomicU64,
    max_delay_ms: u64,
}

impl OriginState {
    /// Count a request and wait a little, like a real backend would.
    async fn serve(&self) -> u64 {
        let n = self.served.fetch_add(1, Ordering::Relaxed) + 1;
        let delay = rand::thread_rng().gen_range(0..=self.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        tracing::info!(served = n, delay_ms = delay, "origin request");
        n
    }
}

async fn widgets(State(state): State<Arc<OriginState>>) -> Json<Value> {
    state.serve().await;
    Json(json!({ "a": 1 }))
}

async fn projects(State(state): State<Arc<OriginState>>) -> Json<Value> {
    let n = state.serve().await;
    Json(json!({
        "projects": [
            { "id": 1, "name": "alpha" },
            { "id": 2, "name": "beta" },
        ],
        "served": n,
    }))
}

async fn project(
    State(state): State<Arc<OriginState>>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, StatusCode> {
    let n = state.serve().await;
    if id == 0 {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({ "id": id, "name": format!("project {}", id), "served": n })))
}

async fn stats(State(state): State<Arc<OriginState>>) -> Json<Value> {
    Json(json!({ "served": state.served.load(Ordering::Relaxed) }))
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();
    let state = Arc::new(OriginState {
        served: AtomicU64::new(0),
        max_delay_ms: args.max_delay_ms,
    });

    let app = Router::new()
        .route("/widgets", get(widgets))
        .route("/projects", get(projects))
        .route("/projects/{id}", get(project))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .with_state(state);

    tracing::info!(addr = %args.addr, "demo origin starting");

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    axum::serve(listener, app).await
}
