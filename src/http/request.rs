//! Request identification and connection data extraction.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4), keeping one supplied by the caller
//! - Resolve the client address from forwarded-IP headers or the TCP peer
//! - Resolve the destination host
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A request ID the gateway generated is not client data and never reaches
//!   rule evaluation
//! - Forwarded addresses are taken as-is, never re-verified

use axum::extract::Request as AxumRequest;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Uri};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the request ID.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Issues a fresh UUID v4 for every request without an `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Marks requests that arrived without an `x-request-id`.
#[derive(Debug, Clone, Copy)]
pub struct GeneratedRequestId;

/// Record whether the client supplied a request ID.
///
/// Must run outside the request-id layer, which fills the header in.
pub async fn mark_generated_request_id(mut request: AxumRequest, next: Next) -> Response {
    if !request.headers().contains_key(&X_REQUEST_ID) {
        request.extensions_mut().insert(GeneratedRequestId);
    }
    next.run(request).await
}

/// Read the request ID set by the request-id layer.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Client address and port as seen by the rule engine.
///
/// The first comma-separated value of the first present candidate header
/// wins, with port 0. Without one, the TCP peer is used.
pub fn client_address(headers: &HeaderMap, candidates: &[HeaderName], peer: SocketAddr) -> (String, u16) {
    for name in candidates {
        let forwarded = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return (addr.to_string(), 0);
        }
    }
    (peer.ip().to_string(), peer.port())
}

/// Destination host: `Host` header, then the URI authority, then empty.
pub fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> &'a str {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("")
}
