//! HTTP error types and handling

use crate::response::HttpResponse;
use thiserror::Error;

/// Errors raised while configuring a client, assembling a request, talking to
/// the transport, or post-processing a response.
#[derive(Error, Debug)]
pub enum HttpError {
    /// Invalid or out-of-range client/request option
    #[error("Invalid option: {0}")]
    Config(String),

    /// Malformed request input (headers, credentials, body)
    #[error("Invalid request: {0}")]
    Request(String),

    /// The round-trip completed but the status is 400 or above
    #[error("Exceptional status {} from {}", .0.status, .0.uri)]
    Status(Box<HttpResponse>),

    /// Response body could not be decoded into the requested form
    #[error("Decode error: {0}")]
    Decode(String),

    /// Failure reported by the transport (connect, TLS, timeout, redirects)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type for HTTP operations
pub type HttpResult<T> = Result<T, HttpError>;

/// Error category for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorCategory {
    /// Rejected client or request option
    Config,
    /// Invalid request construction
    Request,
    /// Exceptional response status
    Status,
    /// Body decoding
    Decode,
    /// Connection-related errors (DNS, TCP, TLS)
    Connection,
    /// Timeout errors
    Timeout,
    /// Redirect errors
    Redirect,
    /// Unknown/other errors
    Unknown,
}

impl HttpError {
    /// Categorize the error for reporting
    pub fn category(&self) -> HttpErrorCategory {
        match self {
            HttpError::Config(_) => HttpErrorCategory::Config,
            HttpError::Request(_) | HttpError::UrlParse(_) => HttpErrorCategory::Request,
            HttpError::Status(_) => HttpErrorCategory::Status,
            HttpError::Decode(_) => HttpErrorCategory::Decode,
            HttpError::Transport(e) => {
                if e.is_connect() {
                    HttpErrorCategory::Connection
                } else if e.is_timeout() {
                    HttpErrorCategory::Timeout
                } else if e.is_redirect() {
                    HttpErrorCategory::Redirect
                } else if e.is_builder() || e.is_request() {
                    HttpErrorCategory::Request
                } else {
                    HttpErrorCategory::Unknown
                }
            }
        }
    }

    /// The response behind an exceptional-status failure.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            HttpError::Status(response) => Some(response),
            _ => None,
        }
    }

    /// Take ownership of the response behind an exceptional-status failure.
    pub fn into_response(self) -> Option<HttpResponse> {
        match self {
            HttpError::Status(response) => Some(*response),
            _ => None,
        }
    }

    /// Sanitize error message (remove sensitive info like credentials, internal IPs)
    pub fn sanitized_message(&self) -> String {
        let msg = self.to_string();
        sanitize_error_message(&msg)
    }
}

/// Sanitize error messages by removing sensitive information
fn sanitize_error_message(msg: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static URL_CREDS_RE: OnceLock<Regex> = OnceLock::new();
    static INTERNAL_IP_RE: OnceLock<Regex> = OnceLock::new();
    static AUTH_HEADER_RE: OnceLock<Regex> = OnceLock::new();

    let url_creds_re = URL_CREDS_RE
        .get_or_init(|| Regex::new(r"(https?)://[^@/\s:]+:[^@/\s]+@").expect("valid regex"));
    let internal_ip_re = INTERNAL_IP_RE.get_or_init(|| {
        Regex::new(r"\b(10\.|172\.(1[6-9]|2[0-9]|3[01])\.|192\.168\.)\d+\.\d+\b")
            .expect("valid regex")
    });
    let auth_header_re = AUTH_HEADER_RE.get_or_init(|| {
        Regex::new(r"(?i)(authorization:\s*(?:basic|bearer)|bearer|basic|token)\s*[:=]?\s*\S+")
            .expect("valid regex")
    });

    let sanitized = url_creds_re.replace_all(msg, "$1://[REDACTED]@");
    let sanitized = internal_ip_re.replace_all(&sanitized, "[INTERNAL_IP]");
    let sanitized = auth_header_re.replace_all(&sanitized, "$1 [REDACTED]");

    sanitized.to_string()
}
