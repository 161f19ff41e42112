#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../reviewlens-parser/tests/data")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("read fixture")
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{addr}")
}

/// A product endpoint answering `failures` times with `failure_status` before serving `body`.
pub struct ProductServer {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl ProductServer {
    pub async fn start(body: String, failures: usize, failure_status: StatusCode) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/products",
            get(move || {
                let counter = counter.clone();
                let body = body.clone();
                async move {
                    let hit = counter.fetch_add(1, Ordering::SeqCst);
                    if hit < failures {
                        (failure_status, "unavailable".to_string())
                    } else {
                        (StatusCode::OK, body)
                    }
                }
            }),
        );
        let base = serve(router).await;
        Self {
            url: format!("{base}/products"),
            hits,
        }
    }

    pub async fn healthy() -> Self {
        Self::start(fixture("products_sample.json"), 0, StatusCode::OK).await
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
