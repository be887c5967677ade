//! Callback receiver: `POST /callback` hands the body to a sink and answers `OK`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Router;
use tracing::debug;

use super::producer::content_type;
use crate::codec::{Codec, Delivery};

pub const CALLBACK_PATH: &str = "/callback";

/// Receives every callback body.
pub type Sink = Arc<dyn Fn(Delivery) + Send + Sync>;

/// Build an axum `Router` exposing `POST /callback`.
pub fn router(sink: Sink) -> Router {
    Router::new()
        .route(CALLBACK_PATH, post(callback_handler))
        .with_state(sink)
}

/// Serve the receiver at the given address (e.g. `"0.0.0.0:8080"`).
pub async fn serve(sink: Sink, addr: &str) -> Result<(), std::io::Error> {
    let app = router(sink);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn callback_handler(
    State(sink): State<Sink>,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    let codec = match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(ct) if ct == content_type(Codec::Bitcode) => Codec::Bitcode,
        _ => Codec::Json,
    };
    debug!(bytes = body.len(), "callback received");
    sink(Delivery::new(body.to_vec(), CALLBACK_PATH, codec));
    "OK"
}
