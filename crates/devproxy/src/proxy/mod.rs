//! Upstream side of the proxy: request construction and response relay.

pub mod forward;
