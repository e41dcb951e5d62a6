//! DevProxyRouter: classify a request by path prefix, rewrite it, forward it
//! and relay the upstream response.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::header::CONTENT_LENGTH;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{ConfigError, ProxyError};
use crate::proxy::forward::{self, UpstreamRequest};
use crate::rule::ProxyRule;

/// Result of offering a request to the router.
#[derive(Debug)]
pub enum RoutedOutcome {
    /// No rule matched. The request is handed back untouched.
    NotProxied(Request),
    /// The upstream answered; its response is relayed as-is.
    Proxied(Response),
    /// Forwarding failed. Becomes a gateway-failure response.
    UpstreamError(ProxyError),
}

impl RoutedOutcome {
    /// Status the caller will see, if the router produced a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RoutedOutcome::NotProxied(_) => None,
            RoutedOutcome::Proxied(response) => Some(response.status()),
            RoutedOutcome::UpstreamError(err) => Some(err.status()),
        }
    }
}

struct Route {
    rule: ProxyRule,
    client: reqwest::Client,
}

/// Immutable rule set plus one HTTP client per rule. Cheap to clone (Arc).
#[derive(Clone)]
pub struct DevProxyRouter {
    routes: Arc<[Route]>,
    max_body_bytes: usize,
}

impl DevProxyRouter {
    /// Build the router, creating each rule's client with its timeout and TLS policy.
    pub fn new(rules: Vec<ProxyRule>, max_body_bytes: usize) -> Result<Self, ConfigError> {
        let routes = rules
            .into_iter()
            .map(|rule| {
                let client = reqwest::Client::builder()
                    .timeout(rule.timeout)
                    // Redirects are relayed to the caller, never followed.
                    .redirect(reqwest::redirect::Policy::none())
                    .danger_accept_invalid_certs(!rule.secure)
                    .build()
                    .map_err(|source| ConfigError::Client {
                        prefix: rule.match_prefix.clone(),
                        source,
                    })?;
                Ok(Route { rule, client })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            routes: routes.into(),
            max_body_bytes,
        })
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &ProxyRule> {
        self.routes.iter().map(|route| &route.rule)
    }

    /// First route, in declaration order, whose prefix starts `path`.
    fn match_route(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.rule.matches(path))
    }

    /// Build the outbound request for a matched rule without doing any I/O.
    ///
    /// The rewrite runs exactly once, over the path and query.
    pub fn prepare(
        rule: &ProxyRule,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamRequest, ProxyError> {
        let original = uri
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or_else(|| uri.path());

        // Joined onto the target path the way `/` + `ary` becomes `/ary`.
        let mut rewritten = rule.rewrite.apply(original);
        if !rewritten.starts_with('/') {
            rewritten.insert(0, '/');
        }
        if rewritten.parse::<PathAndQuery>().is_err() {
            return Err(ProxyError::InvalidRewrite {
                original: original.to_string(),
                rewritten,
            });
        }

        let host_override = rule.change_origin.then(|| rule.host_header.clone());

        Ok(UpstreamRequest {
            method,
            url: rule.upstream_url(&rewritten),
            headers: forward::upstream_headers(headers, host_override),
            body,
        })
    }

    /// Route one request.
    ///
    /// Unmatched requests come back as [`RoutedOutcome::NotProxied`] before
    /// any other rule logic runs. Failures never escape as panics or errors;
    /// they are reported as [`RoutedOutcome::UpstreamError`].
    pub async fn route(&self, request: Request) -> RoutedOutcome {
        let Some(route) = self.match_route(request.uri().path()) else {
            return RoutedOutcome::NotProxied(request);
        };

        let (parts, body) = request.into_parts();

        let declared_len = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.is_some_and(|len| len > self.max_body_bytes) {
            return RoutedOutcome::UpstreamError(ProxyError::BodyTooLarge {
                limit: self.max_body_bytes,
            });
        }

        let body = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(b) => b,
            Err(e) if exceeds_length_limit(&e) => {
                return RoutedOutcome::UpstreamError(ProxyError::BodyTooLarge {
                    limit: self.max_body_bytes,
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read request body");
                return RoutedOutcome::UpstreamError(ProxyError::BodyRead(e.to_string()));
            }
        };

        let prepared = Self::prepare(
            &route.rule,
            parts.method,
            &parts.uri,
            &parts.headers,
            body,
        );
        let upstream = match prepared {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    rule = %route.rule.match_prefix,
                    "Rewrite produced an invalid upstream path"
                );
                return RoutedOutcome::UpstreamError(e);
            }
        };

        let request_id = Uuid::new_v4();
        let span = devproxy_tracing::proxy_request_span!(
            request_id,
            route.rule.match_prefix,
            upstream.method,
            upstream.url
        );

        match forward::send(&route.client, upstream).instrument(span).await {
            Ok(response) => RoutedOutcome::Proxied(response),
            Err(e) => RoutedOutcome::UpstreamError(e),
        }
    }
}

/// Whether a body read failed because it outgrew the buffering limit.
fn exceeds_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

impl IntoResponse for RoutedOutcome {
    /// `NotProxied` has no response of its own; callers handle it before
    /// converting. Converting it anyway yields 404.
    fn into_response(self) -> Response {
        match self {
            RoutedOutcome::NotProxied(_) => StatusCode::NOT_FOUND.into_response(),
            RoutedOutcome::Proxied(response) => response,
            RoutedOutcome::UpstreamError(err) => err.into_response(),
        }
    }
}
