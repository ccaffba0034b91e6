use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::SharedState;
use crate::rate_limiter::RateLimiter;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// State of the admission layer
#[derive(Clone)]
pub struct AdmissionState {
    pub limiter: Arc<RateLimiter>,
    /// Key clients on forwarding headers rather than the peer address
    pub trust_forward_header: bool,
}

/// Admission control; rejected requests never reach the inner layers
pub async fn rate_limit_middleware(
    State(admission): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = get_client_ip(&request, admission.trust_forward_header);
    let decision = admission.limiter.admit(&client_ip);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(
            target: "anonkv::middleware",
            client_ip = %client_ip,
            method = %request.method(),
            path = %request.uri().path(),
            limit = decision.limit,
            "Rate limit exceeded"
        );
        ApiError::RateLimitExceeded.into_response()
    };

    decision.apply_headers(response.headers_mut());
    response
}

/// Request logging and metrics accounting for admitted requests
pub async fn logging_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = get_client_ip(&request, state.config.trust_forward_header);
    let request_id = Uuid::new_v4().to_string();

    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = start.elapsed();

    state.metrics.record_request(&method, elapsed);

    info!(
        target: "anonkv::middleware",
        request_id = %request_id,
        status = response.status().as_u16(),
        method = %method,
        path = %path,
        client_ip = %client_ip,
        elapsed = ?elapsed,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Convert a panic caught during dispatch into a 500 response
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!(
        target: "anonkv::middleware",
        panic = %detail,
        "Handler panicked"
    );

    ApiError::Internal(detail).into_response()
}

/// Client identity for admission and logs.
///
/// Forwarding headers are client-controlled, so they are only consulted when
/// `trust_forward_header` is set; otherwise the peer address is used.
fn get_client_ip(request: &Request, trust_forward_header: bool) -> String {
    if trust_forward_header {
        if let Some(forwarded) = request.headers().get("x-forwarded-for") {
            if let Ok(forwarded_str) = forwarded.to_str() {
                if let Some(first_ip) = forwarded_str.split(',').next() {
                    return first_ip.trim().to_string();
                }
            }
        }

        if let Some(real_ip) = request.headers().get("x-real-ip") {
            if let Ok(ip_str) = real_ip.to_str() {
                return ip_str.to_string();
            }
        }
    }

    // Fallback to connection info
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        addr.ip().to_string()
    } else {
        "unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_get_client_ip_with_forwarded_header() {
        let mut request = Request::new(axum::body::Body::empty());
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1")
        );

        let ip = get_client_ip(&request, true);
        assert_eq!(ip, "192.168.1.1");
    }

    #[test]
    fn test_get_client_ip_with_real_ip_header() {
        let mut request = Request::new(axum::body::Body::empty());
        request.headers_mut().insert(
            "x-real-ip",
            HeaderValue::from_static("203.0.113.1")
        );

        let ip = get_client_ip(&request, true);
        assert_eq!(ip, "203.0.113.1");
    }

    #[test]
    fn test_forward_headers_ignored_unless_trusted() {
        let mut request = Request::new(axum::body::Body::empty());
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1")
        );
        request.headers_mut().insert(
            "x-real-ip",
            HeaderValue::from_static("203.0.113.1")
        );
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 4000))));

        assert_eq!(get_client_ip(&request, false), "10.1.2.3");
        assert_eq!(get_client_ip(&request, true), "192.168.1.1");
    }

    #[test]
    fn test_get_client_ip_from_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 4000))));

        assert_eq!(get_client_ip(&request, false), "10.1.2.3");
    }

    #[test]
    fn test_get_client_ip_fallback() {
        let request = Request::new(axum::body::Body::empty());
        let ip = get_client_ip(&request, true);
        assert_eq!(ip, "unknown");
    }

    #[test]
    fn test_handle_panic_returns_server_fault() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = handle_panic(Box::new(String::from("owned boom")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
