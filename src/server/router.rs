use crate::server::routes::{read_record, request_swap, trigger_update};
use crate::swap::SwapCoordinator;

use axum::{
    Router,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode, Version, header::USER_AGENT},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use base64::Engine as _;
use rand::RngCore;
use std::time::Instant;
use tracing::{error, info, warn};

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

fn generate_request_id() -> String {
    // 96 bits => 16 chars base64url (no padding).
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn format_http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/?",
    }
}

/// Shared handler state. The storage handle is reached through the coordinator so the
/// HTTP layer never holds a second owner of the live connection.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: SwapCoordinator,
}

impl AppState {
    pub fn new(coordinator: SwapCoordinator) -> Self {
        Self { coordinator }
    }
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(generate_request_id, str::to_string);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status().as_u16();
    let latency = start.elapsed();
    let path = uri.path();
    let protocol = format_http_version(version);

    if resp.status().is_server_error() {
        error!(
            status, %request_id, method = %method, protocol, path, ?latency, %user_agent,
            "request failed"
        );
    } else if resp.status().is_client_error() {
        warn!(
            status, %request_id, method = %method, protocol, path, ?latency, %user_agent,
            "request rejected"
        );
    } else {
        info!(
            status, %request_id, method = %method, protocol, path, ?latency, %user_agent,
            "request served"
        );
    }

    resp
}

pub fn swapdb_router(state: AppState) -> Router {
    Router::new()
        .route("/read/{key}", get(read_record))
        .route("/swap", post(request_swap))
        .route("/update", get(trigger_update))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
