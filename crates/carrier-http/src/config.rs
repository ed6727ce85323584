//! HTTP client configuration
//!
//! `ClientConfig` is the flat, declarative option map a client is built
//! from. Every key is optional so that "not configured" stays distinct from
//! "configured to the default value"; validation happens when the client is
//! built, not when the option is set.

use crate::error::{HttpError, HttpResult};
use crate::options::ProxyOption;
use reqwest::cookie::CookieStore;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Declarative client options
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientConfig {
    /// Connection establishment timeout, in milliseconds
    pub connect_timeout: Option<i64>,

    /// Cookie acceptance shorthand: none, all, original-server
    pub cookie_policy: Option<String>,

    /// Explicit cookie store; wins over `cookie_policy`
    #[serde(skip)]
    pub cookie_handler: Option<Arc<dyn CookieStore>>,

    /// Redirect mode: never, always, normal
    pub follow_redirects: Option<String>,

    /// Connection priority, 1..=256
    pub priority: Option<i64>,

    /// Explicit proxy selection
    #[serde(skip)]
    pub proxy: Option<ProxyOption>,

    /// Preferred protocol: http-1.1, http-2
    pub version: Option<String>,
}

impl ClientConfig {
    /// Create an empty option map
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a JSON object such as `{"follow-redirects": "always"}`
    pub fn from_value(value: serde_json::Value) -> HttpResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| HttpError::Config(format!("Invalid client options: {}", e)))
    }

    /// Load options from a YAML document
    pub fn from_yaml(document: &str) -> HttpResult<Self> {
        serde_yaml::from_str(document)
            .map_err(|e| HttpError::Config(format!("Invalid client options: {}", e)))
    }

    /// Set the connect timeout in milliseconds
    pub fn connect_timeout(mut self, millis: i64) -> Self {
        self.connect_timeout = Some(millis);
        self
    }

    /// Set the cookie policy shorthand
    pub fn cookie_policy(mut self, policy: impl Into<String>) -> Self {
        self.cookie_policy = Some(policy.into());
        self
    }

    /// Install an explicit cookie store
    pub fn cookie_handler(mut self, handler: Arc<dyn CookieStore>) -> Self {
        self.cookie_handler = Some(handler);
        self
    }

    /// Set the redirect mode
    pub fn follow_redirects(mut self, mode: impl Into<String>) -> Self {
        self.follow_redirects = Some(mode.into());
        self
    }

    /// Set the connection priority
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the proxy selection
    pub fn proxy(mut self, proxy: impl Into<ProxyOption>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Set the preferred protocol version
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("cookie_policy", &self.cookie_policy)
            .field("cookie_handler", &self.cookie_handler.as_ref().map(|_| ".."))
            .field("follow_redirects", &self.follow_redirects)
            .field("priority", &self.priority)
            .field("proxy", &self.proxy)
            .field("version", &self.version)
            .finish()
    }
}
