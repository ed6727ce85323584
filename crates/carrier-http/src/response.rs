//! HTTP response types and the status policy

use crate::coerce::Body;
use crate::error::{HttpError, HttpResult};
use carrier_common::{HttpMethod, HttpStatus};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Version};
use std::time::Duration;

/// The request as it actually went out
#[derive(Debug, Clone)]
pub struct RequestEcho {
    /// HTTP method
    pub method: HttpMethod,

    /// Full URL, query string included
    pub url: String,

    /// Headers sent, defaults and auth included
    pub headers: HeaderMap,
}

/// Final response handed back to the caller
#[derive(Debug)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,

    /// Response headers; names are lower-case, values may repeat
    pub headers: HeaderMap,

    /// Body in the representation requested with `as`
    pub body: Body,

    /// Final URL (differs from the request URL after followed redirects)
    pub uri: String,

    /// Negotiated protocol version
    pub version: Version,

    /// Time until response headers arrived, in milliseconds
    pub request_time_ms: u64,

    /// Echo of the effective outgoing request
    pub request: RequestEcho,
}

impl HttpResponse {
    pub fn status(&self) -> HttpStatus {
        HttpStatus(self.status)
    }

    /// Check if status is success (2xx)
    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Check if status is redirect (3xx)
    pub fn is_redirect(&self) -> bool {
        self.status().is_redirect()
    }

    /// Check if status is client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Check if status is server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// First value of a header, if it is valid visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a repeated header
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Get content type
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Check if content type is JSON
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }

    /// Get request time as Duration
    pub fn request_time(&self) -> Duration {
        Duration::from_millis(self.request_time_ms)
    }
}

/// Fail on exceptional statuses unless the caller opted out.
///
/// 3xx responses that were not followed pass through like any other
/// unexceptional status.
pub fn apply_status_policy(
    response: HttpResponse,
    throw_exceptions: bool,
) -> HttpResult<HttpResponse> {
    if throw_exceptions && response.status().is_exceptional() {
        return Err(HttpError::Status(Box::new(response)));
    }
    Ok(response)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use http::HeaderValue;

    pub(crate) fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: Body::Text(String::new()),
            uri: "http://api.test/resource".to_string(),
            version: Version::HTTP_11,
            request_time_ms: 3,
            request: RequestEcho {
                method: HttpMethod::Get,
                url: "http://api.test/resource".to_string(),
                headers: HeaderMap::new(),
            },
        }
    }

    #[test]
    fn test_response_status_checks() {
        assert!(response(200).is_success());
        assert!(response(302).is_redirect());
        assert!(response(404).is_client_error());
        assert!(response(503).is_server_error());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut resp = response(200);
        resp.headers
            .insert("content-type", HeaderValue::from_static("application/json"));
        resp.headers.append("set-cookie", HeaderValue::from_static("a=1"));
        resp.headers.append("set-cookie", HeaderValue::from_static("b=2"));

        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("application/json"));
        assert!(resp.is_json());
        assert_eq!(resp.header_all("Set-Cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_exceptional_status_fails_by_default() {
        let err = apply_status_policy(response(500), true).unwrap_err();
        assert_eq!(err.response().map(|r| r.status), Some(500));
        assert_eq!(err.to_string(), "Exceptional status 500 from http://api.test/resource");
    }

    #[test]
    fn test_opt_out_returns_response() {
        assert_eq!(apply_status_policy(response(500), false).unwrap().status, 500);
        assert_eq!(apply_status_policy(response(404), false).unwrap().status, 404);
    }

    #[test]
    fn test_unexceptional_statuses_pass() {
        assert_eq!(apply_status_policy(response(200), true).unwrap().status, 200);
        assert_eq!(apply_status_policy(response(302), true).unwrap().status, 302);
    }
}
