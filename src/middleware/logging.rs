//! Request logging middleware.
//!
//! One line per request with method, path, status and latency. Every request runs
//! inside an `http_request` span carrying a fresh request id, so ledger events logged
//! by the handler can be tied back to the call that caused them.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Health checks are too frequent to be interesting
    if path == "/health" {
        return next.run(request).await;
    }

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("http_request", %request_id, %method, %path);

    async move {
        let start = Instant::now();
        let response = next.run(request).await;
        let latency_ms = start.elapsed().as_millis();
        let status = response.status().as_u16();

        if status >= 500 {
            warn!(status, latency_ms, "Request failed (5xx)");
        } else if status == 409 {
            warn!(status, latency_ms, "Request rejected (conflict)");
        } else {
            info!(status, latency_ms, "Request completed");
        }

        response
    }
    .instrument(span)
    .await
}
