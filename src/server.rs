//! HTTP service exposing the extractor.
//!
//! A thin shim: the handler only decodes the body and encodes the envelope.
//! Business failures (unreachable model, malformed answer, bad document)
//! come back as HTTP 200 with `is_success: false`; only a request that is
//! not a valid JSON `DocumentRequest` gets a 4xx.

use crate::config::ServerConfig;
use crate::extract::BillExtractor;
use crate::output::{DocumentRequest, ResponseEnvelope};
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Build the application router.
pub fn router(extractor: Arc<BillExtractor>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health_check))
        .route("/extract-bill-data", post(extract_bill_data))
        .with_state(extractor)
}

/// Bind `config.addr()` and serve until Ctrl-C.
pub async fn serve(config: &ServerConfig, extractor: Arc<BillExtractor>) -> std::io::Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);
    info!("  POST /extract-bill-data");

    axum::serve(listener, router(extractor))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Liveness greeting.
pub async fn home() -> Json<Value> {
    Json(json!({
        "message": "Medical bill extraction API is live",
        "status": "Running",
    }))
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// `POST /extract-bill-data`
pub async fn extract_bill_data(
    State(extractor): State<Arc<BillExtractor>>,
    payload: Result<Json<DocumentRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            return (
                rejection.status(),
                Json(ResponseEnvelope::failure(rejection.body_text())),
            )
                .into_response();
        }
    };

    let envelope = extractor.extract_envelope(&request.document).await;
    (StatusCode::OK, Json(envelope)).into_response()
}
