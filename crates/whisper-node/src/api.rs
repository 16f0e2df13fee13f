//! HTTP API endpoints

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, Router},
    Json,
};
use tracing::{debug, error};

use whisper_core::api::{BatchRequest, BatchResponse, ErrorBody, ReceiptBody, MAX_BATCH_ADDRESSES};
use whisper_core::{Ledger, LedgerError};
use whisper_proto::limits::MAX_WIRE_PAYLOAD_LEN;
use whisper_proto::Address;

#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<Ledger>,
}

/// Create API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/operations", post(submit_operation))
        .route("/v1/records/batch", post(get_batch))
        .route("/v1/records/:address_hex", get(get_record))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_WIRE_PAYLOAD_LEN))
        .with_state(state)
}

/// HTTP status for a ledger rejection.
pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::AlreadyExists { .. }
        | LedgerError::OutOfOrder { .. }
        | LedgerError::Conflict { .. }
        | LedgerError::Replayed { .. } => StatusCode::CONFLICT,
        LedgerError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::InvalidOperation { .. } | LedgerError::Codec(_) => StatusCode::BAD_REQUEST,
        LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ledger_error(err: &LedgerError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        error!("Ledger storage error: {}", err);
    }
    (status, Json(ErrorBody::from(err))).into_response()
}

fn bad_request(code: &str, message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody::new(code, message))).into_response()
}

/// POST /v1/operations - Submit a signed operation
async fn submit_operation(State(state): State<ApiState>, body: Bytes) -> Response {
    match state.ledger.submit_bytes(&body).await {
        Ok(receipt) => Json(ReceiptBody::from(&receipt)).into_response(),
        Err(e) => ledger_error(&e),
    }
}

/// GET /v1/records/{address_hex} - Raw record bytes
async fn get_record(State(state): State<ApiState>, Path(address_hex): Path<String>) -> Response {
    let address = match Address::from_hex(&address_hex) {
        Ok(a) => a,
        Err(e) => return bad_request("invalid_address", e.to_string()),
    };

    match state.ledger.fetch(&address).await {
        Ok(Some(record)) => ([(CONTENT_TYPE, "application/octet-stream")], record).into_response(),
        Ok(None) => ledger_error(&LedgerError::NotFound { address }),
        Err(e) => ledger_error(&e),
    }
}

/// POST /v1/records/batch - Several records at once, hex-encoded
async fn get_batch(State(state): State<ApiState>, Json(request): Json<BatchRequest>) -> Response {
    if request.addresses.len() > MAX_BATCH_ADDRESSES {
        return bad_request(
            "batch_too_large",
            format!("at most {} addresses per request", MAX_BATCH_ADDRESSES),
        );
    }

    let mut addresses = Vec::with_capacity(request.addresses.len());
    for address_hex in &request.addresses {
        match Address::from_hex(address_hex) {
            Ok(a) => addresses.push(a),
            Err(e) => return bad_request("invalid_address", format!("{}: {}", address_hex, e)),
        }
    }

    debug!("Batch read of {} records", addresses.len());
    match state.ledger.fetch_many(&addresses).await {
        Ok(records) => Json(BatchResponse {
            records: records.into_iter().map(|r| r.map(hex::encode)).collect(),
        })
        .into_response(),
        Err(e) => ledger_error(&e),
    }
}

/// GET /health - Health check endpoint
async fn health_handler() -> &'static str {
    "ok"
}
