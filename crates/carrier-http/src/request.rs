//! HTTP request description and assembly
//!
//! A `RequestSpec` is the declarative description of one call: target,
//! headers, body, per-request options and, optionally, the client to run it
//! on. `assemble` turns it into the transport's request type.

use crate::client::HttpClient;
use crate::coerce::{BodyStream, CoercePolicy, Coercion};
use crate::config::ClientConfig;
use crate::error::{HttpError, HttpResult};
use crate::options::HttpVersion;
use crate::response::{HttpResponse, RequestEcho};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::time::Duration;
use url::Url;

pub use carrier_common::HttpMethod;

/// Encodings the response decoder can undo.
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate";

/// Convert HttpMethod to reqwest Method
fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
        HttpMethod::Trace => reqwest::Method::TRACE,
    }
}

/// Request body types
#[derive(Debug, Default)]
pub enum RequestBody {
    /// No body
    #[default]
    None,
    /// Raw text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// JSON body
    Json(serde_json::Value),
    /// Form data (application/x-www-form-urlencoded)
    Form(Vec<(String, String)>),
    /// Streamed body, sent chunked
    Stream(BodyStream),
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

/// Declarative description of one request
pub struct RequestSpec {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute request URL
    pub url: String,
    /// Headers in insertion order; names may repeat
    pub headers: Vec<(String, String)>,
    /// Query parameters appended to the URL in order
    pub query_params: Vec<(String, String)>,
    /// Request body
    pub body: RequestBody,
    /// `content-type` shorthand (`json` or a media type)
    pub content_type: Option<String>,
    /// `accept` shorthand (`json` or a media type)
    pub accept: Option<String>,
    /// Basic credentials as `user:password`
    pub basic_auth: Option<String>,
    /// Bearer token
    pub oauth_token: Option<String>,
    /// Total timeout for this request
    pub timeout: Option<Duration>,
    /// Protocol override: http-1.1, http-2
    pub version: Option<String>,
    /// Body representation of the response (`as`)
    pub coercion: Coercion,
    /// Which statuses get JSON decoding
    pub coerce: CoercePolicy,
    /// Fail on statuses >= 400 (default true)
    pub throw_exceptions: bool,
    /// Undo `content-encoding` (default true)
    pub decompress_body: bool,
    /// Client to run on; a one-shot client is built when absent
    pub http_client: Option<HttpClient>,
    /// Inline options for the one-shot client
    pub client_config: ClientConfig,
}

impl RequestSpec {
    /// Create a new request description
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query_params: Vec::new(),
            body: RequestBody::None,
            content_type: None,
            accept: None,
            basic_auth: None,
            oauth_token: None,
            timeout: None,
            version: None,
            coercion: Coercion::Default,
            coerce: CoercePolicy::default(),
            throw_exceptions: true,
            decompress_body: true,
            http_client: None,
            client_config: ClientConfig::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Head, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn options(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Options, url)
    }

    /// Add a header; repeated names are sent as repeated header lines
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Set JSON body from Value
    pub fn json_value(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Set form body
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }

    /// Set a streamed body
    pub fn stream(mut self, body: BodyStream) -> Self {
        self.body = RequestBody::Stream(body);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Set basic authentication from a `user:password` string
    pub fn basic_auth(mut self, credentials: impl Into<String>) -> Self {
        self.basic_auth = Some(credentials.into());
        self
    }

    /// Set bearer token authentication
    pub fn oauth_token(mut self, token: impl Into<String>) -> Self {
        self.oauth_token = Some(token.into());
        self
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the protocol version for this request
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Choose the response body representation
    pub fn coerce_as(mut self, coercion: Coercion) -> Self {
        self.coercion = coercion;
        self
    }

    pub fn coerce(mut self, policy: CoercePolicy) -> Self {
        self.coerce = policy;
        self
    }

    pub fn throw_exceptions(mut self, throw: bool) -> Self {
        self.throw_exceptions = throw;
        self
    }

    pub fn decompress_body(mut self, decompress: bool) -> Self {
        self.decompress_body = decompress;
        self
    }

    /// Run on an existing client, sharing its cookies and connections
    pub fn http_client(mut self, client: HttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Options for the one-shot client used when no client is supplied
    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = config;
        self
    }

    /// Send the request
    pub async fn send(self) -> HttpResult<HttpResponse> {
        crate::client::request(self).await
    }
}

impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers.len())
            .field("query_params", &self.query_params)
            .field("coercion", &self.coercion)
            .field("throw_exceptions", &self.throw_exceptions)
            .field("http_client", &self.http_client.is_some())
            .finish_non_exhaustive()
    }
}

/// A transport request plus what it will look like on the wire
#[derive(Debug)]
pub(crate) struct AssembledRequest {
    pub request: reqwest::Request,
    pub echo: RequestEcho,
}

/// Build the transport request for `spec`. `body` is passed separately so the
/// caller keeps ownership of the rest of the description.
pub(crate) fn assemble(
    client: &reqwest::Client,
    spec: &RequestSpec,
    body: RequestBody,
) -> HttpResult<AssembledRequest> {
    let mut url = Url::parse(&spec.url)
        .map_err(|e| HttpError::Request(format!("Invalid URI {:?}: {}", spec.url, e)))?;
    if !spec.query_params.is_empty() {
        url.query_pairs_mut().extend_pairs(&spec.query_params);
    }

    let mut headers = HeaderMap::new();
    for (name, value) in &spec.headers {
        headers.append(parse_header_name(name)?, parse_header_value(name, value)?);
    }
    if let Some(content_type) = &spec.content_type {
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, media_type(content_type)?);
        }
    }
    if let Some(accept) = &spec.accept {
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, media_type(accept)?);
        }
    }
    if !headers.contains_key(ACCEPT_ENCODING) {
        headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
        );
    }
    if let Some(credentials) = &spec.basic_auth {
        headers.insert(AUTHORIZATION, basic_authorization(credentials)?);
    }
    if let Some(token) = &spec.oauth_token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| HttpError::Request("OAuth token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, value);
    }

    let mut builder = client
        .request(to_reqwest_method(spec.method), url)
        .headers(headers);

    builder = match body {
        RequestBody::None => builder,
        RequestBody::Text(text) => builder.body(text),
        RequestBody::Bytes(bytes) => builder.body(bytes),
        RequestBody::Json(value) => builder.json(&value),
        RequestBody::Form(fields) => builder.form(&fields),
        RequestBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
    };

    if let Some(timeout) = spec.timeout {
        builder = builder.timeout(timeout);
    }
    // HTTP/2 stays a preference the transport negotiates; only HTTP/1.1 is pinned.
    if let Some(version) = &spec.version {
        if version.parse::<HttpVersion>()? == HttpVersion::Http11 {
            builder = builder.version(http::Version::HTTP_11);
        }
    }

    let request = builder
        .build()
        .map_err(|e| HttpError::Request(format!("Failed to build request: {}", e)))?;
    let echo = RequestEcho {
        method: spec.method,
        url: request.url().to_string(),
        headers: request.headers().clone(),
    };

    Ok(AssembledRequest { request, echo })
}

fn parse_header_name(name: &str) -> HttpResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| HttpError::Request(format!("Invalid header name {:?}", name)))
}

fn parse_header_value(name: &str, value: &str) -> HttpResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| HttpError::Request(format!("Invalid value for header {:?}", name)))
}

/// Expand the `json` keyword; anything else is taken as a media type.
fn media_type(value: &str) -> HttpResult<HeaderValue> {
    match value.trim_start_matches(':') {
        "json" => Ok(HeaderValue::from_static("application/json")),
        other => parse_header_value("content-type/accept", other),
    }
}

/// `user:password` to an `Authorization: Basic` value.
fn basic_authorization(credentials: &str) -> HttpResult<HeaderValue> {
    let Some((user, _)) = credentials.split_once(':') else {
        return Err(HttpError::Request(
            "basic-auth credentials must look like user:password".into(),
        ));
    };
    if user.is_empty() || credentials.chars().any(char::is_control) {
        return Err(HttpError::Request(
            "basic-auth credentials need a user and no control characters".into(),
        ));
    }
    let mut value = HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(credentials)))
        .map_err(|_| HttpError::Request("basic-auth credentials could not be encoded".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn build(spec: RequestSpec) -> HttpResult<AssembledRequest> {
        let client = reqwest::Client::new();
        let mut spec = spec;
        let body = std::mem::take(&mut spec.body);
        assemble(&client, &spec, body)
    }

    #[test]
    fn test_request_spec_defaults() {
        let spec = RequestSpec::get("http://api.test/");
        assert_eq!(spec.method, HttpMethod::Get);
        assert_eq!(spec.coercion, Coercion::Default);
        assert!(spec.throw_exceptions);
        assert!(spec.decompress_body);
        assert!(spec.http_client.is_none());
    }

    #[test]
    fn test_default_accept_encoding() {
        let assembled = build(RequestSpec::get("http://api.test/")).unwrap();
        assert_eq!(
            assembled.echo.headers.get(ACCEPT_ENCODING).unwrap(),
            DEFAULT_ACCEPT_ENCODING
        );
    }

    #[test]
    fn test_caller_accept_encoding_wins() {
        let assembled =
            build(RequestSpec::get("http://api.test/").header("Accept-Encoding", "identity"))
                .unwrap();
        let values: Vec<_> = assembled.echo.headers.get_all(ACCEPT_ENCODING).iter().collect();
        assert_eq!(values, vec!["identity"]);
    }

    #[test]
    fn test_repeated_headers_and_query() {
        let assembled = build(
            RequestSpec::get("http://api.test/search?fixed=1")
                .header("X-Tag", "a")
                .header("x-tag", "b")
                .query("q", "rust http")
                .query("page", "2"),
        )
        .unwrap();

        assert_eq!(
            assembled.echo.url,
            "http://api.test/search?fixed=1&q=rust+http&page=2"
        );
        let tags: Vec<_> = assembled.echo.headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
        assert_eq!(*assembled.request.method(), reqwest::Method::GET);
    }

    #[test]
    fn test_basic_auth_header() {
        let assembled =
            build(RequestSpec::get("http://api.test/").basic_auth("aladdin:opensesame")).unwrap();
        assert_eq!(
            assembled.echo.headers.get(AUTHORIZATION).unwrap(),
            "Basic YWxhZGRpbjpvcGVuc2VzYW1l"
        );
    }

    #[test]
    fn test_invalid_basic_auth() {
        let err = build(RequestSpec::get("http://api.test/").basic_auth("no-colon")).unwrap_err();
        assert!(matches!(err, HttpError::Request(_)));

        let err =
            build(RequestSpec::get("http://api.test/").basic_auth("user:pa\nss")).unwrap_err();
        assert!(matches!(err, HttpError::Request(_)));
    }

    #[test]
    fn test_oauth_token() {
        let assembled = build(RequestSpec::get("http://api.test/").oauth_token("t0k3n")).unwrap();
        assert_eq!(
            assembled.echo.headers.get(AUTHORIZATION).unwrap(),
            "Bearer t0k3n"
        );
    }

    #[test]
    fn test_invalid_uri_and_header() {
        assert!(matches!(
            build(RequestSpec::get("not a uri")),
            Err(HttpError::Request(_))
        ));
        assert!(matches!(
            build(RequestSpec::get("http://api.test/").header("bad header", "x")),
            Err(HttpError::Request(_))
        ));
        assert!(matches!(
            build(RequestSpec::get("http://api.test/").header("x-ok", "line\r\nbreak")),
            Err(HttpError::Request(_))
        ));
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let assembled = build(
            RequestSpec::post("http://api.test/users")
                .json_value(serde_json::json!({"name": "Alice"})),
        )
        .unwrap();
        assert_eq!(
            assembled.echo.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let sent = assembled.request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(sent, br#"{"name":"Alice"}"#);
    }

    #[test]
    fn test_form_body() {
        let assembled = build(
            RequestSpec::post("http://api.test/login")
                .form(vec![("user".into(), "a b".into()), ("remember".into(), "1".into())]),
        )
        .unwrap();
        assert_eq!(
            assembled.echo.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        let sent = assembled.request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(sent, b"user=a+b&remember=1");
    }

    #[test]
    fn test_shorthands_do_not_override_headers() {
        let assembled = build(
            RequestSpec::post("http://api.test/")
                .header("content-type", "text/csv")
                .content_type("json")
                .accept(":json"),
        )
        .unwrap();
        assert_eq!(assembled.echo.headers.get(CONTENT_TYPE).unwrap(), "text/csv");
        assert_eq!(assembled.echo.headers.get(ACCEPT).unwrap(), "application/json");
    }

    #[test]
    fn test_version_override() {
        let assembled = assert_ok!(build(RequestSpec::get("http://api.test/").version("http-1.1")));
        assert_eq!(assembled.request.version(), http::Version::HTTP_11);

        let err = assert_err!(build(RequestSpec::get("http://api.test/").version("spdy")));
        assert!(matches!(err, HttpError::Config(_)));
    }

    #[test]
    fn test_timeout_override() {
        let assembled =
            build(RequestSpec::get("http://api.test/").timeout(Duration::from_millis(750)))
                .unwrap();
        assert_eq!(
            assembled.request.timeout(),
            Some(&Duration::from_millis(750))
        );
    }
}
