//! HTTP client handle and the request pipeline

use crate::coerce::{self, BodyStream};
use crate::config::ClientConfig;
use crate::cookies::{PolicyCookieStore, SharedCookieHandler};
use crate::decode::{self, ContentEncoding};
use crate::error::{HttpError, HttpResult};
use crate::options::{
    translate_connect_timeout, translate_priority, CookiePolicy, HttpVersion, ProxyOption,
    RedirectPolicy,
};
use crate::request::{self, HttpMethod, RequestBody, RequestSpec};
use crate::response::{apply_status_policy, HttpResponse};
use crate::transport;
use carrier_common::HttpStatus;
use reqwest::cookie::CookieStore;
use std::sync::Arc;
use std::time::Duration;

/// Client options after translation. `None` means the option was not given
/// and the transport default applies.
#[derive(Clone, Debug, Default)]
pub struct ClientSettings {
    pub redirect: RedirectPolicy,
    pub cookie_policy: Option<CookiePolicy>,
    pub connect_timeout: Option<Duration>,
    pub proxy: Option<ProxyOption>,
    pub version: Option<HttpVersion>,
    pub priority: Option<u16>,
}

impl ClientSettings {
    /// Translate every option, failing on the first invalid one.
    pub fn from_config(config: &ClientConfig) -> HttpResult<Self> {
        Ok(Self {
            redirect: RedirectPolicy::from_option(config.follow_redirects.as_deref())?,
            // An explicit handler makes the policy shorthand meaningless.
            cookie_policy: match (&config.cookie_handler, &config.cookie_policy) {
                (Some(_), _) | (None, None) => None,
                (None, Some(policy)) => Some(CookiePolicy::from_option(policy)),
            },
            connect_timeout: config
                .connect_timeout
                .map(translate_connect_timeout)
                .transpose()?,
            proxy: config.proxy.clone(),
            version: config
                .version
                .as_deref()
                .map(str::parse::<HttpVersion>)
                .transpose()?,
            priority: config.priority.map(translate_priority).transpose()?,
        })
    }
}

/// Configured connection pool shared by every request sent through it
///
/// Cloning is cheap; clones share connections and the cookie store.
///
/// # Example
///
/// ```ignore
/// use carrier_http::{ClientConfig, Coercion, HttpClient, RequestSpec};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HttpClient::build(
///         ClientConfig::new()
///             .follow_redirects("normal")
///             .cookie_policy("all"),
///     )?;
///
///     let response = client
///         .execute(RequestSpec::get("https://api.example.com/users/1").coerce_as(Coercion::Json))
///         .await?;
///     println!("{} in {}ms", response.status, response.request_time_ms);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

struct HttpClientInner {
    client: reqwest::Client,
    settings: ClientSettings,
    cookie_handler: Option<Arc<dyn CookieStore>>,
}

impl HttpClient {
    /// Build a client from declarative options
    pub fn build(config: ClientConfig) -> HttpResult<Self> {
        let settings = ClientSettings::from_config(&config)?;

        // The response decoder owns content-encoding, so the transport must
        // hand bodies over exactly as they came off the wire.
        let mut builder = reqwest::Client::builder()
            .redirect(settings.redirect.to_native())
            .gzip(false)
            .brotli(false);

        let cookie_handler: Option<Arc<dyn CookieStore>> =
            match (config.cookie_handler, settings.cookie_policy) {
                (Some(handler), _) => Some(handler),
                (None, Some(policy)) => Some(Arc::new(PolicyCookieStore::new(policy))),
                (None, None) => None,
            };
        if let Some(handler) = &cookie_handler {
            builder = builder.cookie_provider(Arc::new(SharedCookieHandler(Arc::clone(handler))));
        }

        if let Some(timeout) = settings.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(proxy) = &settings.proxy {
            builder = proxy.apply(builder);
        }
        if settings.version == Some(HttpVersion::Http11) {
            builder = builder.http1_only();
        }

        let client = builder
            .build()
            .map_err(|e| HttpError::Config(format!("Failed to build HTTP client: {}", e)))?;

        tracing::debug!(
            follow_redirects = %settings.redirect,
            cookie_policy = ?settings.cookie_policy,
            cookie_handler = cookie_handler.is_some(),
            connect_timeout_ms = ?settings.connect_timeout.map(|t| t.as_millis()),
            proxy = ?settings.proxy,
            version = ?settings.version,
            priority = ?settings.priority,
            "HTTP client built"
        );

        Ok(Self {
            inner: Arc::new(HttpClientInner {
                client,
                settings,
                cookie_handler,
            }),
        })
    }

    /// Translated settings, with unset options left as `None`
    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    pub fn redirect_policy(&self) -> RedirectPolicy {
        self.inner.settings.redirect
    }

    /// Policy of the client-owned cookie store; `None` when no store was
    /// configured or an explicit handler took precedence.
    pub fn cookie_policy(&self) -> Option<CookiePolicy> {
        self.inner.settings.cookie_policy
    }

    /// The installed cookie store, exactly as supplied when one was given
    pub fn cookie_handler(&self) -> Option<&Arc<dyn CookieStore>> {
        self.inner.cookie_handler.as_ref()
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.inner.settings.connect_timeout
    }

    pub fn proxy(&self) -> Option<&ProxyOption> {
        self.inner.settings.proxy.as_ref()
    }

    /// Effective protocol preference (HTTP/2 unless configured otherwise)
    pub fn version(&self) -> HttpVersion {
        self.inner.settings.version.unwrap_or_default()
    }

    /// Protocol preference as configured
    pub fn configured_version(&self) -> Option<HttpVersion> {
        self.inner.settings.version
    }

    pub fn priority(&self) -> Option<u16> {
        self.inner.settings.priority
    }

    /// Run a request through this client: assemble, send, decode, coerce,
    /// then apply the status policy. Inline client options on `spec` are
    /// ignored here; the handle's configuration applies.
    pub async fn execute(&self, mut spec: RequestSpec) -> HttpResult<HttpResponse> {
        let body = std::mem::take(&mut spec.body);
        let assembled = request::assemble(&self.inner.client, &spec, body)?;

        tracing::debug!(method = %spec.method, url = %assembled.echo.url, "Sending HTTP request");
        let raw = transport::invoke(&self.inner.client, assembled.request).await?;
        let request_time_ms = transport::elapsed_millis(raw.elapsed);
        tracing::debug!(
            status = raw.status,
            version = ?raw.version,
            request_time_ms,
            url = %raw.url,
            "HTTP response received"
        );

        let stream = if spec.method.is_bodyless_response() {
            BodyStream::empty()
        } else if spec.decompress_body {
            decode::decode_body(ContentEncoding::from_headers(&raw.headers), raw.body)
        } else {
            raw.body
        };
        let status = HttpStatus(raw.status);
        let body = coerce::coerce(stream, spec.coercion, &raw.headers, status, spec.coerce).await?;

        let response = HttpResponse {
            status: raw.status,
            headers: raw.headers,
            body,
            uri: raw.url,
            version: raw.version,
            request_time_ms,
            request: assembled.echo,
        };
        apply_status_policy(response, spec.throw_exceptions)
    }

    /// Send a GET request
    pub async fn get(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute(RequestSpec::get(url)).await
    }

    /// Send a HEAD request
    pub async fn head(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute(RequestSpec::head(url)).await
    }

    /// Send a DELETE request
    pub async fn delete(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute(RequestSpec::delete(url)).await
    }

    /// Send an OPTIONS request
    pub async fn options(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute(RequestSpec::options(url)).await
    }

    /// Send a POST request
    pub async fn post(&self, url: &str, body: impl Into<RequestBody>) -> HttpResult<HttpResponse> {
        self.execute(RequestSpec::post(url).body(body)).await
    }

    /// Send a PUT request
    pub async fn put(&self, url: &str, body: impl Into<RequestBody>) -> HttpResult<HttpResponse> {
        self.execute(RequestSpec::put(url).body(body)).await
    }

    /// Send a PATCH request
    pub async fn patch(&self, url: &str, body: impl Into<RequestBody>) -> HttpResult<HttpResponse> {
        self.execute(RequestSpec::patch(url).body(body)).await
    }

    /// Start a request description bound to this client
    pub fn request(&self, method: HttpMethod, url: &str) -> RequestSpec {
        RequestSpec::new(method, url).http_client(self.clone())
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("settings", &self.inner.settings)
            .field("cookie_handler", &self.inner.cookie_handler.is_some())
            .finish()
    }
}

/// Build a client from declarative options
pub fn build_client(config: ClientConfig) -> HttpResult<HttpClient> {
    HttpClient::build(config)
}

/// Send a request on `spec.http_client`, or on a one-shot client built from
/// the inline options when none is given.
pub async fn request(mut spec: RequestSpec) -> HttpResult<HttpResponse> {
    let client = match spec.http_client.take() {
        Some(client) => client,
        None => HttpClient::build(std::mem::take(&mut spec.client_config))?,
    };
    client.execute(spec).await
}

/// Send a GET request on a one-shot client
pub async fn get(url: &str) -> HttpResult<HttpResponse> {
    request(RequestSpec::get(url)).await
}

/// Send a HEAD request on a one-shot client
pub async fn head(url: &str) -> HttpResult<HttpResponse> {
    request(RequestSpec::head(url)).await
}

/// Send a DELETE request on a one-shot client
pub async fn delete(url: &str) -> HttpResult<HttpResponse> {
    request(RequestSpec::delete(url)).await
}

/// Send an OPTIONS request on a one-shot client
pub async fn options(url: &str) -> HttpResult<HttpResponse> {
    request(RequestSpec::options(url)).await
}

/// Send a POST request on a one-shot client
pub async fn post(url: &str, body: impl Into<RequestBody>) -> HttpResult<HttpResponse> {
    request(RequestSpec::post(url).body(body)).await
}

/// Send a PUT request on a one-shot client
pub async fn put(url: &str, body: impl Into<RequestBody>) -> HttpResult<HttpResponse> {
    request(RequestSpec::put(url).body(body)).await
}

/// Send a PATCH request on a one-shot client
pub async fn patch(url: &str, body: impl Into<RequestBody>) -> HttpResult<HttpResponse> {
    request(RequestSpec::patch(url).body(body)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::Jar;

    #[test]
    fn test_default_client() {
        let client = HttpClient::build(ClientConfig::default()).unwrap();
        assert_eq!(client.redirect_policy(), RedirectPolicy::Never);
        assert!(client.cookie_handler().is_none());
        assert!(client.cookie_policy().is_none());
        assert!(client.connect_timeout().is_none());
        assert!(client.proxy().is_none());
        assert!(client.configured_version().is_none());
        assert_eq!(client.version(), HttpVersion::Http2);
        assert!(client.priority().is_none());
    }

    #[test]
    fn test_redirect_options() {
        for (value, expected) in [
            ("never", RedirectPolicy::Never),
            ("always", RedirectPolicy::Always),
            ("normal", RedirectPolicy::Normal),
        ] {
            let client = HttpClient::build(ClientConfig::new().follow_redirects(value)).unwrap();
            assert_eq!(client.redirect_policy(), expected);
        }

        let err = HttpClient::build(ClientConfig::new().follow_redirects("maybe")).unwrap_err();
        assert!(matches!(err, HttpError::Config(_)));
    }

    #[test]
    fn test_priority_range() {
        for priority in [1, 128, 256] {
            let client = HttpClient::build(ClientConfig::new().priority(priority)).unwrap();
            assert_eq!(client.priority(), Some(priority as u16));
        }
        for priority in [0, 257, -1] {
            assert!(matches!(
                HttpClient::build(ClientConfig::new().priority(priority)),
                Err(HttpError::Config(_))
            ));
        }
    }

    #[test]
    fn test_cookie_handler_wins_over_policy() {
        let handler: Arc<dyn CookieStore> = Arc::new(Jar::default());
        let client = HttpClient::build(
            ClientConfig::new()
                .cookie_handler(Arc::clone(&handler))
                .cookie_policy("all"),
        )
        .unwrap();

        let installed = client.cookie_handler().unwrap();
        assert!(std::ptr::eq(
            Arc::as_ptr(installed) as *const (),
            Arc::as_ptr(&handler) as *const ()
        ));
        assert!(client.cookie_policy().is_none());
    }

    #[test]
    fn test_unknown_cookie_policy_falls_back() {
        let client = HttpClient::build(ClientConfig::new().cookie_policy("sometimes")).unwrap();
        assert_eq!(client.cookie_policy(), Some(CookiePolicy::OriginalServer));
        assert!(client.cookie_handler().is_some());
    }

    #[test]
    fn test_connect_timeout_and_version() {
        let client = HttpClient::build(
            ClientConfig::new()
                .connect_timeout(2500)
                .version("http-1.1"),
        )
        .unwrap();
        assert_eq!(client.connect_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(client.version(), HttpVersion::Http11);

        assert!(matches!(
            HttpClient::build(ClientConfig::new().connect_timeout(-5)),
            Err(HttpError::Config(_))
        ));
        assert!(matches!(
            HttpClient::build(ClientConfig::new().version("http-0.9")),
            Err(HttpError::Config(_))
        ));
    }

    #[test]
    fn test_proxy_presence() {
        let client = HttpClient::build(ClientConfig::new().proxy(ProxyOption::NoProxy)).unwrap();
        assert!(matches!(client.proxy(), Some(ProxyOption::NoProxy)));

        let selector = reqwest::Proxy::all("http://proxy.internal:3128").unwrap();
        let client = HttpClient::build(ClientConfig::new().proxy(selector)).unwrap();
        assert!(matches!(client.proxy(), Some(ProxyOption::Selector(_))));
    }

    #[test]
    fn test_bound_request_reuses_client() {
        let client = HttpClient::build(ClientConfig::default()).unwrap();
        let spec = client.request(HttpMethod::Post, "http://api.test/items");
        assert_eq!(spec.method, HttpMethod::Post);
        assert!(spec.http_client.is_some());
    }

    #[tokio::test]
    async fn test_config_errors_precede_network() {
        let err = RequestSpec::get("http://unroutable.invalid/")
            .client_config(ClientConfig::new().priority(999))
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Config(_)));
    }
}
