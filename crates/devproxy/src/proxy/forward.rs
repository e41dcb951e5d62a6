//! Raw forwarding to the upstream origin.
//!
//! Bodies and headers pass through verbatim apart from hop-by-hop headers and
//! the `Host` override. The upstream response body is streamed back without
//! buffering.

use std::time::Instant;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::error::ProxyError;

/// Headers that should NOT be forwarded in either direction (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name)
}

/// A fully prepared outbound request. Building one performs no I/O.
#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Copy client headers for the upstream request.
///
/// Hop-by-hop headers and `content-length` are dropped (reqwest sets the
/// length from the buffered body). `Host` is replaced by `host_override`
/// when given, otherwise the client's value is kept.
pub fn upstream_headers(original: &HeaderMap, host_override: Option<HeaderValue>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(original.len());
    for (name, value) in original.iter() {
        if is_hop_by_hop(name.as_str()) || name == CONTENT_LENGTH {
            continue;
        }
        if name == HOST && host_override.is_some() {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if let Some(host) = host_override {
        headers.insert(HOST, host);
    }
    headers
}

/// Send the request and relay the upstream response.
///
/// Records `status` and `latency_ms` on the current span.
pub async fn send(
    client: &reqwest::Client,
    upstream: UpstreamRequest,
) -> Result<Response, ProxyError> {
    let start = Instant::now();
    let UpstreamRequest {
        method,
        url,
        headers,
        body,
    } = upstream;

    let result = client
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let latency = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("latency_ms", latency);

    let upstream_resp = match result {
        Ok(resp) => resp,
        Err(e) => {
            let err = ProxyError::from_reqwest(&url, e);
            tracing::Span::current().record("status", err.status().as_u16());
            tracing::error!(error = %err, latency_ms = latency, "Upstream request failed");
            return Err(err);
        }
    };

    let status = upstream_resp.status();
    tracing::Span::current().record("status", status.as_u16());
    tracing::info!(
        status = status.as_u16(),
        latency_ms = latency,
        "Forward complete"
    );

    Ok(relay_response(upstream_resp))
}

/// Build an axum Response from the upstream response, streaming the body verbatim.
fn relay_response(upstream_resp: reqwest::Response) -> Response {
    let mut response_builder = Response::builder().status(upstream_resp.status());

    for (name, value) in upstream_resp.headers().iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        response_builder = response_builder.header(name, value);
    }

    let body = Body::from_stream(upstream_resp.bytes_stream());

    response_builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build response");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    })
}
