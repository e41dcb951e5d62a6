//! Span builder helpers for devproxy instrumentation.

/// Create a tracing span for one proxied request.
///
/// Usage: `let span = proxy_request_span!(request_id, rule, method, upstream_url);`
///
/// Fields recorded once the upstream answers (or fails):
/// - `status`: status code relayed to the client
/// - `latency_ms`: milliseconds from request send to upstream response headers
#[macro_export]
macro_rules! proxy_request_span {
    ($request_id:expr, $rule:expr, $method:expr, $upstream_url:expr) => {
        tracing::info_span!(
            "proxy_request",
            request_id = %$request_id,
            rule = %$rule,
            method = %$method,
            upstream_url = %$upstream_url,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}
