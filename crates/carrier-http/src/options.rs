//! Translation of declarative option values into transport settings
//!
//! Each recognized client option has a typed counterpart here. Parsing is
//! strict for redirects, priority, timeouts and protocol version, and lenient
//! for the cookie policy: an unknown policy name leaves the default
//! (`original-server`) in effect instead of failing.

use crate::error::{HttpError, HttpResult};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Redirect hops followed before the transport gives up.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Accepted range for connection priority.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i64> = 1..=256;

// ============================================================================
// Redirects
// ============================================================================

/// Which 3xx responses the transport re-requests on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectPolicy {
    /// Never follow; the 3xx response is the result
    #[default]
    Never,
    /// Follow every redirect, including http <-> https hops
    Always,
    /// Follow only redirects that keep the scheme
    Normal,
}

impl RedirectPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectPolicy::Never => "never",
            RedirectPolicy::Always => "always",
            RedirectPolicy::Normal => "normal",
        }
    }

    /// Translate an optional option value; absent means `Never`.
    pub fn from_option(value: Option<&str>) -> HttpResult<Self> {
        value.map_or(Ok(RedirectPolicy::Never), str::parse)
    }

    /// Build the transport's redirect policy.
    pub fn to_native(self) -> reqwest::redirect::Policy {
        match self {
            RedirectPolicy::Never => reqwest::redirect::Policy::none(),
            RedirectPolicy::Always => reqwest::redirect::Policy::limited(DEFAULT_MAX_REDIRECTS),
            RedirectPolicy::Normal => reqwest::redirect::Policy::custom(|attempt| {
                if attempt.previous().len() > DEFAULT_MAX_REDIRECTS {
                    return attempt.error(format!(
                        "too many redirects (more than {})",
                        DEFAULT_MAX_REDIRECTS
                    ));
                }
                let same_scheme = attempt
                    .previous()
                    .last()
                    .map_or(true, |from| from.scheme() == attempt.url().scheme());
                if same_scheme {
                    attempt.follow()
                } else {
                    attempt.stop()
                }
            }),
        }
    }
}

impl FromStr for RedirectPolicy {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(RedirectPolicy::Never),
            "always" => Ok(RedirectPolicy::Always),
            "normal" => Ok(RedirectPolicy::Normal),
            other => Err(HttpError::Config(format!(
                "follow-redirects must be one of never, always, normal; got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for RedirectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Cookies
// ============================================================================

/// Which cookies a client-owned cookie store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CookiePolicy {
    /// Accept nothing
    None,
    /// Accept every cookie
    All,
    /// Accept only cookies whose domain matches the responding host
    #[default]
    OriginalServer,
}

impl CookiePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CookiePolicy::None => "none",
            CookiePolicy::All => "all",
            CookiePolicy::OriginalServer => "original-server",
        }
    }

    /// Lenient parse: unknown names fall back to the default policy.
    pub fn from_option(value: &str) -> Self {
        match value {
            "none" => CookiePolicy::None,
            "all" => CookiePolicy::All,
            "original-server" => CookiePolicy::OriginalServer,
            other => {
                tracing::debug!(
                    cookie_policy = other,
                    "Unrecognized cookie policy, keeping original-server"
                );
                CookiePolicy::default()
            }
        }
    }
}

impl fmt::Display for CookiePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Protocol version
// ============================================================================

/// Preferred HTTP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVersion {
    /// Pin the connection to HTTP/1.1
    Http11,
    /// Prefer HTTP/2, negotiated by the transport
    #[default]
    Http2,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http11 => "http-1.1",
            HttpVersion::Http2 => "http-2",
        }
    }
}

impl FromStr for HttpVersion {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http-1.1" => Ok(HttpVersion::Http11),
            "http-2" => Ok(HttpVersion::Http2),
            other => Err(HttpError::Config(format!(
                "version must be http-1.1 or http-2; got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Proxy
// ============================================================================

/// Explicit proxy configuration. Leaving the option out is a third state:
/// the transport's own defaults apply.
#[derive(Debug, Clone)]
pub enum ProxyOption {
    /// Never proxy, ignoring environment settings
    NoProxy,
    /// Route through this selector
    Selector(reqwest::Proxy),
}

impl ProxyOption {
    /// Apply to a transport builder.
    pub(crate) fn apply(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        match self {
            ProxyOption::NoProxy => builder.no_proxy(),
            ProxyOption::Selector(proxy) => builder.proxy(proxy.clone()),
        }
    }
}

impl From<reqwest::Proxy> for ProxyOption {
    fn from(proxy: reqwest::Proxy) -> Self {
        ProxyOption::Selector(proxy)
    }
}

// ============================================================================
// Scalars
// ============================================================================

/// Validate a connection priority.
pub fn translate_priority(value: i64) -> HttpResult<u16> {
    if PRIORITY_RANGE.contains(&value) {
        Ok(value as u16)
    } else {
        Err(HttpError::Config(format!(
            "priority must be between 1 and 256; got {}",
            value
        )))
    }
}

/// Validate a connect timeout given in milliseconds.
pub fn translate_connect_timeout(millis: i64) -> HttpResult<Duration> {
    u64::try_from(millis)
        .map(Duration::from_millis)
        .map_err(|_| {
            HttpError::Config(format!(
                "connect-timeout must be a non-negative number of milliseconds; got {}",
                millis
            ))
        })
}
