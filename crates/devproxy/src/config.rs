//! Configuration types and loading logic.

use devproxy_tracing::TracingConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

/// Top-level dev server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DevServerConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Proxy rules in declaration order. The first matching prefix wins.
    #[serde(default)]
    pub proxy: Vec<ProxyRuleConfig>,

    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Directory served for requests no proxy rule claims.
    #[serde(default)]
    pub static_dir: Option<String>,

    /// Upstream timeout for rules that don't set their own.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Largest request body buffered for forwarding.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// One `[[proxy]]` entry as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyRuleConfig {
    /// Literal path prefix, e.g. `/api`.
    pub prefix: String,

    /// Absolute upstream origin, e.g. `https://api.example.com`.
    pub target: String,

    /// Send the target's authority as `Host` instead of the client's.
    #[serde(default)]
    pub change_origin: bool,

    /// Verify the upstream TLS certificate. Only turn off for local development.
    #[serde(default = "default_true")]
    pub secure: bool,

    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Overrides `server.timeout_secs` for this rule.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Path rewrite applied before forwarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RewriteConfig {
    /// Forward the path unchanged.
    #[default]
    None,
    /// Remove the rule prefix from the front of the path.
    StripPrefix,
    /// Replace the first match of `pattern` with `replacement`.
    Replace {
        pattern: String,
        #[serde(default)]
        replacement: String,
    },
}

fn default_listen_address() -> String {
    "127.0.0.1:5173".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            static_dir: None,
            timeout_secs: default_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl DevServerConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (DEVPROXY_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let config: DevServerConfig = Self::figment(config_path).extract()?;
        Ok(config)
    }

    fn figment(config_path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("DEVPROXY_").ignore(&["CONFIG"]).split("__"))
    }
}
