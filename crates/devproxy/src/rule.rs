//! Proxy rules: compiled once from configuration, immutable afterwards.

use std::collections::HashSet;
use std::time::Duration;

use axum::http::HeaderValue;
use regex::Regex;
use reqwest::Url;

use crate::config::{ProxyRuleConfig, RewriteConfig};
use crate::error::ConfigError;

/// A validated routing rule.
#[derive(Debug, Clone)]
pub struct ProxyRule {
    /// Literal prefix a request path must start with.
    pub match_prefix: String,
    /// Absolute upstream origin, optionally with a base path.
    pub target: Url,
    /// `Host` sent upstream when `change_origin` is set.
    pub host_header: HeaderValue,
    pub change_origin: bool,
    /// TLS certificate verification toward the target.
    pub secure: bool,
    pub rewrite: Rewrite,
    pub timeout: Duration,
}

/// Pure path transformation applied once before forwarding.
#[derive(Debug, Clone)]
pub enum Rewrite {
    None,
    StripPrefix(String),
    Replace { pattern: Regex, replacement: String },
}

impl Rewrite {
    /// Rewrite a request path (query string included).
    pub fn apply(&self, path: &str) -> String {
        match self {
            Rewrite::None => path.to_string(),
            Rewrite::StripPrefix(prefix) => path
                .strip_prefix(prefix.as_str())
                .unwrap_or(path)
                .to_string(),
            Rewrite::Replace {
                pattern,
                replacement,
            } => pattern.replace(path, replacement.as_str()).into_owned(),
        }
    }
}

impl ProxyRule {
    /// Validate a config entry. `default_timeout` applies when the entry has none.
    pub fn from_config(
        config: &ProxyRuleConfig,
        default_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let prefix = config.prefix.clone();
        if prefix.is_empty() {
            return Err(ConfigError::InvalidPrefix {
                prefix,
                reason: "prefix is empty",
            });
        }
        if !prefix.starts_with('/') {
            return Err(ConfigError::InvalidPrefix {
                prefix,
                reason: "prefix must start with '/'",
            });
        }

        let target = parse_target(&prefix, &config.target)?;
        let host_header =
            HeaderValue::from_str(&authority(&target)).map_err(|e| ConfigError::InvalidTarget {
                prefix: prefix.clone(),
                target: config.target.clone(),
                reason: format!("authority is not a valid Host header: {e}"),
            })?;

        let rewrite = match &config.rewrite {
            RewriteConfig::None => Rewrite::None,
            RewriteConfig::StripPrefix => Rewrite::StripPrefix(prefix.clone()),
            RewriteConfig::Replace {
                pattern,
                replacement,
            } => Rewrite::Replace {
                pattern: Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    prefix: prefix.clone(),
                    source,
                })?,
                replacement: replacement.clone(),
            },
        };

        Ok(Self {
            match_prefix: prefix,
            target,
            host_header,
            change_origin: config.change_origin,
            secure: config.secure,
            rewrite,
            timeout: config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
        })
    }

    /// Literal prefix test against the request path.
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.match_prefix)
    }

    /// Join the target (and its base path, if any) with a rewritten path.
    pub fn upstream_url(&self, rewritten: &str) -> String {
        format!("{}{rewritten}", self.target.as_str().trim_end_matches('/'))
    }
}

/// `host[:port]` of a target; the port only when it isn't the scheme default.
fn authority(target: &Url) -> String {
    let host = target.host_str().unwrap_or_default();
    match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn parse_target(prefix: &str, target: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTarget {
        prefix: prefix.to_string(),
        target: target.to_string(),
        reason,
    };

    let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("target must not carry a query or fragment".to_string()));
    }
    Ok(url)
}

/// Compile all configured rules, keeping declaration order.
pub fn compile_rules(
    configs: &[ProxyRuleConfig],
    default_timeout: Duration,
) -> Result<Vec<ProxyRule>, ConfigError> {
    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(configs.len());
    for config in configs {
        if !seen.insert(config.prefix.as_str()) {
            return Err(ConfigError::DuplicatePrefix {
                prefix: config.prefix.clone(),
            });
        }
        rules.push(ProxyRule::from_config(config, default_timeout)?);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_config(prefix: &str, target: &str, rewrite: RewriteConfig) -> ProxyRuleConfig {
        ProxyRuleConfig {
            prefix: prefix.to_string(),
            target: target.to_string(),
            change_origin: true,
            secure: true,
            rewrite,
            timeout_secs: None,
        }
    }

    fn compile(config: ProxyRuleConfig) -> Result<ProxyRule, ConfigError> {
        ProxyRule::from_config(&config, Duration::from_secs(30))
    }

    #[test]
    fn test_strip_prefix_removes_prefix_once() {
        let rule = compile(rule_config(
            "/api",
            "https://api.minecraftservices.com",
            RewriteConfig::StripPrefix,
        ))
        .unwrap();

        assert_eq!(rule.rewrite.apply("/api/player/profile"), "/player/profile");
        assert_eq!(rule.rewrite.apply("/api/api/nested"), "/api/nested");
        assert_eq!(rule.rewrite.apply("/api?x=1"), "?x=1");
        assert_eq!(rule.rewrite.apply("/api"), "");
    }

    #[test]
    fn test_replace_rewrite_uses_first_match() {
        let rule = compile(rule_config(
            "/api",
            "https://example.com",
            RewriteConfig::Replace {
                pattern: "^/api".to_string(),
                replacement: String::new(),
            },
        ))
        .unwrap();

        assert_eq!(rule.rewrite.apply("/api/v1/api"), "/v1/api");
        assert_eq!(rule.rewrite.apply("/other"), "/other");
    }

    #[test]
    fn test_no_rewrite_keeps_path() {
        let rule = compile(rule_config("/api", "https://example.com", RewriteConfig::None)).unwrap();
        assert_eq!(rule.rewrite.apply("/api/x?y=z"), "/api/x?y=z");
    }

    #[test]
    fn test_upstream_url_joins_base_path() {
        let rule = compile(rule_config(
            "/api",
            "https://api.minecraftservices.com",
            RewriteConfig::StripPrefix,
        ))
        .unwrap();
        assert_eq!(
            rule.upstream_url("/player/profile"),
            "https://api.minecraftservices.com/player/profile"
        );

        let rule = compile(rule_config(
            "/api",
            "http://localhost:9000/v2/",
            RewriteConfig::StripPrefix,
        ))
        .unwrap();
        assert_eq!(rule.upstream_url("/users"), "http://localhost:9000/v2/users");
    }

    #[test]
    fn test_host_header_built_at_compile_time() {
        let rule = compile(rule_config("/a", "https://api.minecraftservices.com", RewriteConfig::None)).unwrap();
        assert_eq!(rule.host_header, "api.minecraftservices.com");

        let rule = compile(rule_config("/a", "http://127.0.0.1:8081", RewriteConfig::None)).unwrap();
        assert_eq!(rule.host_header, "127.0.0.1:8081");

        let rule = compile(rule_config("/a", "https://example.com:443", RewriteConfig::None)).unwrap();
        assert_eq!(rule.host_header, "example.com");

        let rule = compile(rule_config("/a", "http://[::1]:9000/v2", RewriteConfig::None)).unwrap();
        assert_eq!(rule.host_header, "[::1]:9000");
    }

    #[test]
    fn test_prefix_match_is_literal() {
        let rule = compile(rule_config("/api", "https://example.com", RewriteConfig::None)).unwrap();
        assert!(rule.matches("/api"));
        assert!(rule.matches("/api/player"));
        assert!(!rule.matches("/assets/logo.png"));
        assert!(!rule.matches("/v1/api"));
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let err = compile(rule_config("api", "https://example.com", RewriteConfig::None)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrefix { .. }));

        let err = compile(rule_config("", "https://example.com", RewriteConfig::None)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrefix { .. }));

        let err = compile(rule_config("/api", "not a url", RewriteConfig::None)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTarget { .. }));

        let err = compile(rule_config("/api", "ftp://example.com", RewriteConfig::None)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTarget { .. }));

        let err = compile(rule_config("/api", "https://example.com/?a=b", RewriteConfig::None)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTarget { .. }));

        let err = compile(rule_config(
            "/api",
            "https://example.com",
            RewriteConfig::Replace {
                pattern: "(".to_string(),
                replacement: String::new(),
            },
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_compile_rejects_duplicate_prefix() {
        let configs = vec![
            rule_config("/api", "https://a.example.com", RewriteConfig::None),
            rule_config("/api", "https://b.example.com", RewriteConfig::None),
        ];
        let err = compile_rules(&configs, Duration::from_secs(30)).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePrefix { .. }));
    }

    #[test]
    fn test_rule_timeout_overrides_default() {
        let mut config = rule_config("/api", "https://example.com", RewriteConfig::None);
        config.timeout_secs = Some(5);
        let rules = compile_rules(&[config], Duration::from_secs(30)).unwrap();
        assert_eq!(rules[0].timeout, Duration::from_secs(5));
    }
}
