//! Cookie stores installed on a client

use crate::options::CookiePolicy;
use http::HeaderValue;
use reqwest::cookie::{CookieStore, Jar};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Cookie jar that filters incoming `Set-Cookie` headers through a policy.
///
/// Storage is delegated to [`Jar`], which serializes writers behind a
/// read/write lock, so one store can back concurrent requests.
#[derive(Debug, Default)]
pub struct PolicyCookieStore {
    policy: CookiePolicy,
    jar: Jar,
}

impl PolicyCookieStore {
    pub fn new(policy: CookiePolicy) -> Self {
        Self {
            policy,
            jar: Jar::default(),
        }
    }

    pub fn policy(&self) -> CookiePolicy {
        self.policy
    }

    fn accepts(&self, header: &HeaderValue, url: &Url) -> bool {
        match self.policy {
            CookiePolicy::None => false,
            CookiePolicy::All => true,
            CookiePolicy::OriginalServer => {
                let Some(host) = url.host_str() else {
                    return false;
                };
                match cookie_domain(header) {
                    Some(domain) => domain_matches(host, &domain),
                    None => true,
                }
            }
        }
    }
}

impl CookieStore for PolicyCookieStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let accepted: Vec<&HeaderValue> = cookie_headers
            .filter(|header| self.accepts(header, url))
            .collect();
        if accepted.is_empty() {
            return;
        }
        self.jar.set_cookies(&mut accepted.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}

/// Adapter that lets a caller-supplied trait object stand in where the
/// transport expects a concrete store. The wrapped `Arc` is never cloned into
/// a new store, so the client keeps reporting the caller's handle.
pub(crate) struct SharedCookieHandler(pub(crate) Arc<dyn CookieStore>);

impl CookieStore for SharedCookieHandler {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.0.set_cookies(cookie_headers, url)
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.0.cookies(url)
    }
}

impl fmt::Debug for SharedCookieHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedCookieHandler(..)")
    }
}

fn cookie_domain(header: &HeaderValue) -> Option<String> {
    let raw = header.to_str().ok()?;
    let parsed = cookie::Cookie::parse(raw).ok()?;
    parsed
        .domain()
        .map(|domain| domain.trim_start_matches('.').to_ascii_lowercase())
        .filter(|domain| !domain.is_empty())
}

/// Host/domain matching: equal, or the host ends in `.` + domain.
fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
