//! Route configuration types for the payment gate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use t402::proto::Extensions;
use t402::server::ResourceConfig;

/// A payment option accepted by a protected route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOption {
    /// Payment scheme identifier (e.g., `"exact"`).
    pub scheme: String,
    /// Recipient address.
    pub pay_to: String,
    /// Price — a money string (e.g., `"1.50"`) or a structured
    /// `{asset, amount}` object.
    pub price: Value,
    /// CAIP-2 network identifier (e.g., `"eip155:8453"`).
    pub network: String,
    /// Maximum payment authorization age in seconds (default 300).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    /// Extension declarations for this option.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

impl From<&PaymentOption> for ResourceConfig {
    fn from(option: &PaymentOption) -> Self {
        Self {
            scheme: option.scheme.clone(),
            network: option.network.clone(),
            pay_to: option.pay_to.clone(),
            price: option.price.clone(),
            max_timeout_seconds: option.max_timeout_seconds,
            extensions: option.extensions.clone(),
        }
    }
}

/// Configuration for one payment-protected route.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Accepted payment options, in server preference order.
    pub accepts: Vec<PaymentOption>,
    /// Override resource URL (defaults to the request URL).
    pub resource: Option<String>,
    /// Human-readable description of the resource.
    pub description: Option<String>,
    /// MIME type of the resource.
    pub mime_type: Option<String>,
}

impl RouteConfig {
    /// Creates a route config with a single payment option.
    #[must_use]
    pub fn single(option: PaymentOption) -> Self {
        Self {
            accepts: vec![option],
            resource: None,
            description: None,
            mime_type: None,
        }
    }

    /// Creates a route config with multiple payment options.
    #[must_use]
    pub const fn multi(options: Vec<PaymentOption>) -> Self {
        Self {
            accepts: options,
            resource: None,
            description: None,
            mime_type: None,
        }
    }

    /// Sets the resource URL override.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Sets the resource description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// A route pattern validation failure discovered at startup.
#[derive(Debug, Clone)]
pub struct RouteValidationError {
    /// The route pattern (e.g., `"GET /weather"`).
    pub route_pattern: String,
    /// Scheme identifier.
    pub scheme: String,
    /// CAIP-2 network identifier.
    pub network: String,
}

impl std::fmt::Display for RouteValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "route '{}': no facilitator supports scheme '{}' on network '{}'",
            self.route_pattern, self.scheme, self.network
        )
    }
}

impl std::error::Error for RouteValidationError {}

/// A compiled route entry mapping a method + path pattern to its config.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRoute {
    /// The original pattern string.
    pub pattern: String,
    /// HTTP method (uppercase) or `"*"` for any method.
    pub method: String,
    /// Path pattern: exact, trailing `/*`, or `*`.
    pub path_pattern: String,
    /// Payment configuration for this route.
    pub config: RouteConfig,
}

impl CompiledRoute {
    /// Compiles a pattern like `"GET /weather"`, `"/api/*"`, or `"*"`.
    pub fn compile(pattern: &str, config: RouteConfig) -> Self {
        let (method, path) = parse_route_pattern(pattern);
        Self {
            pattern: pattern.to_owned(),
            method,
            path_pattern: path,
            config,
        }
    }

    /// Checks whether this route matches the given method and path.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if self.method != "*" && !self.method.eq_ignore_ascii_case(method) {
            return false;
        }
        match_path_pattern(&self.path_pattern, path)
    }

    /// Specificity for most-specific-wins selection: exact paths beat
    /// trailing wildcards (longer prefixes beat shorter), which beat the
    /// universal pattern; a concrete method beats `"*"`.
    pub fn specificity(&self) -> (u8, usize, u8) {
        let path_rank = if self.path_pattern == "*" {
            (0, 0)
        } else if self.path_pattern.ends_with("/*") {
            (1, self.path_pattern.len() - 2)
        } else {
            (2, self.path_pattern.len())
        };
        let method_rank = u8::from(self.method != "*");
        (path_rank.0, path_rank.1, method_rank)
    }
}

/// Glob-style path matching: exact, trailing `/*` prefix, or universal `*`.
fn match_path_pattern(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let path = path.split('?').next().unwrap_or(path);
    let path = path.trim_end_matches('/');
    let pattern = pattern.trim_end_matches('/');
    if let Some(prefix) = pattern.strip_suffix("/*") {
        path == prefix || path.starts_with(&format!("{prefix}/"))
    } else {
        path.eq_ignore_ascii_case(pattern)
    }
}

/// Splits a route pattern into method and path.
///
/// `"GET /weather"` → (`GET`, `/weather`); `"/weather"` → (`*`,
/// `/weather`); `"*"` → (`*`, `*`).
fn parse_route_pattern(pattern: &str) -> (String, String) {
    let trimmed = pattern.trim();
    if let Some((method, path)) = trimmed.split_once(char::is_whitespace) {
        (method.to_uppercase(), path.trim().to_owned())
    } else {
        ("*".to_owned(), trimmed.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option() -> PaymentOption {
        PaymentOption {
            scheme: "exact".to_owned(),
            pay_to: "0xR".to_owned(),
            price: serde_json::json!("1000"),
            network: "eip155:84532".to_owned(),
            max_timeout_seconds: None,
            extensions: None,
        }
    }

    #[test]
    fn pattern_parsing() {
        let route = CompiledRoute::compile("GET /weather", RouteConfig::single(option()));
        assert!(route.matches("GET", "/weather"));
        assert!(route.matches("get", "/weather/"));
        assert!(!route.matches("POST", "/weather"));
        assert!(!route.matches("GET", "/weather/today"));

        let route = CompiledRoute::compile("/api/*", RouteConfig::single(option()));
        assert!(route.matches("GET", "/api/foo"));
        assert!(route.matches("POST", "/api/foo/bar"));
        assert!(route.matches("GET", "/api"));
        assert!(!route.matches("GET", "/apiv2"));

        let route = CompiledRoute::compile("*", RouteConfig::single(option()));
        assert!(route.matches("DELETE", "/anything"));
    }

    #[test]
    fn specificity_prefers_exact_over_wildcard() {
        let exact = CompiledRoute::compile("GET /api/data", RouteConfig::single(option()));
        let prefix = CompiledRoute::compile("/api/*", RouteConfig::single(option()));
        let universal = CompiledRoute::compile("*", RouteConfig::single(option()));
        assert!(exact.specificity() > prefix.specificity());
        assert!(prefix.specificity() > universal.specificity());

        let long_prefix = CompiledRoute::compile("/api/data/*", RouteConfig::single(option()));
        assert!(long_prefix.specificity() > prefix.specificity());
    }
}
