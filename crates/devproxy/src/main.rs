//! devproxy: local development server that forwards path-prefixed requests
//! to remote API origins and serves everything else from a static directory.

mod config;
mod error;
mod proxy;
mod router;
mod rule;
mod server;
mod stats;

use std::time::Duration;

use config::DevServerConfig;
use router::DevProxyRouter;
use server::AppState;
use stats::ProxyStats;

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();
    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1).cloned())
    };

    let config_path = flag("--config")
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("DEVPROXY_CONFIG").ok())
        .unwrap_or_else(|| "devproxy.toml".to_string());

    // Load configuration
    let mut config = DevServerConfig::load(&config_path)?;

    // CLI overrides take precedence over TOML and env vars
    if let Some(listen) = flag("--listen") {
        config.server.listen_address = listen;
    }
    if let Some(dir) = flag("--static-dir") {
        config.server.static_dir = Some(dir);
    }

    // Build the tokio runtime first — tonic gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // Initialize tracing (OTLP export is optional — falls back to fmt-only)
        let tracing_guard = devproxy_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            static_dir = ?config.server.static_dir,
            rules = config.proxy.len(),
            otlp_export = tracing_guard.exporting(),
            "Starting devproxy"
        );

        run(config).await
    })
}

async fn run(config: DevServerConfig) -> anyhow::Result<()> {
    // Rules are compiled once; a broken rule stops start-up
    let rules = rule::compile_rules(
        &config.proxy,
        Duration::from_secs(config.server.timeout_secs),
    )?;

    let router = DevProxyRouter::new(rules, config.server.max_body_bytes)?;

    if router.rules().next().is_none() {
        tracing::warn!("No proxy rules configured, serving local files only");
    }
    for rule in router.rules() {
        tracing::info!(
            prefix = %rule.match_prefix,
            target = %rule.target,
            change_origin = rule.change_origin,
            rewrite = ?rule.rewrite,
            timeout_secs = rule.timeout.as_secs(),
            "Proxy rule loaded"
        );
        if !rule.secure {
            tracing::warn!(
                prefix = %rule.match_prefix,
                target = %rule.target,
                "TLS certificate verification disabled for this rule; use for local development only"
            );
        }
    }

    let state = AppState {
        config,
        router,
        stats: ProxyStats::new(),
    };

    server::run(state).await
}
