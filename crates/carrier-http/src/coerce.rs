//! Response body coercion
//!
//! Turns the (already decoded) body stream into the representation the
//! caller asked for with `as`.

use crate::error::{HttpError, HttpResult};
use bytes::{Bytes, BytesMut};
use carrier_common::HttpStatus;
use futures::stream::{Stream, StreamExt};
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

// ============================================================================
// Body stream
// ============================================================================

/// An open, unread response (or request) body.
///
/// Dropping the stream releases the underlying connection.
pub struct BodyStream {
    inner: Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>,
}

impl BodyStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// A stream that yields nothing.
    pub fn empty() -> Self {
        Self::new(futures::stream::empty())
    }

    /// Drain the stream into one contiguous buffer.
    pub async fn bytes(mut self) -> io::Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for BodyStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BodyStream { .. }")
    }
}

// ============================================================================
// Selectors
// ============================================================================

/// Requested body representation (`as`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coercion {
    /// Text in the declared charset, UTF-8 otherwise
    #[default]
    Default,
    /// Same as `Default`
    String,
    /// All bytes, read eagerly
    ByteArray,
    /// The open stream; the caller reads and closes it
    Stream,
    /// JSON decoded into a generic value
    Json,
    /// Chosen from the response content type
    Auto,
}

impl FromStr for Coercion {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches(':') {
            "string" => Ok(Coercion::String),
            "byte-array" => Ok(Coercion::ByteArray),
            "stream" => Ok(Coercion::Stream),
            "json" => Ok(Coercion::Json),
            "auto" => Ok(Coercion::Auto),
            other => Err(HttpError::Request(format!(
                "as must be one of string, byte-array, stream, json, auto; got {:?}",
                other
            ))),
        }
    }
}

/// Which statuses get structured decoding when `as` asks for JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoercePolicy {
    /// Only statuses below 400
    #[default]
    Unexceptional,
    /// Every status
    Always,
    /// Only statuses of 400 and above
    Exceptional,
}

impl CoercePolicy {
    fn applies_to(self, status: HttpStatus) -> bool {
        match self {
            CoercePolicy::Always => true,
            CoercePolicy::Unexceptional => !status.is_exceptional(),
            CoercePolicy::Exceptional => status.is_exceptional(),
        }
    }
}

// ============================================================================
// Coerced body
// ============================================================================

/// Response body in the representation chosen by `as`
#[derive(Debug)]
pub enum Body {
    Text(String),
    Bytes(Bytes),
    Stream(BodyStream),
    Json(serde_json::Value),
}

impl Body {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Take the open stream out of a `Stream` body.
    pub fn into_stream(self) -> Option<BodyStream> {
        match self {
            Body::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

/// Coerce a decoded body into the requested representation.
pub async fn coerce(
    body: BodyStream,
    coercion: Coercion,
    headers: &HeaderMap,
    status: HttpStatus,
    policy: CoercePolicy,
) -> HttpResult<Body> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let coercion = match coercion {
        Coercion::Auto => auto_coercion(content_type),
        other => other,
    };
    // Auto may resolve to JSON too, so the status policy applies after it.
    let coercion = match coercion {
        Coercion::Json if !policy.applies_to(status) => Coercion::String,
        other => other,
    };

    match coercion {
        Coercion::Stream => Ok(Body::Stream(body)),
        Coercion::ByteArray => Ok(Body::Bytes(read_fully(body).await?)),
        Coercion::Json => {
            let bytes = read_fully(body).await?;
            if bytes.is_empty() {
                return Ok(Body::Json(serde_json::Value::Null));
            }
            serde_json::from_slice(&bytes)
                .map(Body::Json)
                .map_err(|e| HttpError::Decode(format!("Failed to parse JSON body: {}", e)))
        }
        Coercion::Default | Coercion::String | Coercion::Auto => {
            let bytes = read_fully(body).await?;
            Ok(Body::Text(decode_text(&bytes, content_type)))
        }
    }
}

fn auto_coercion(content_type: Option<&str>) -> Coercion {
    let Some(mime) = content_type.map(essence) else {
        return Coercion::ByteArray;
    };
    if mime == "application/json" || mime.ends_with("+json") {
        Coercion::Json
    } else if mime.starts_with("text/")
        || mime.ends_with("xml")
        || mime.ends_with("javascript")
        || mime == "application/x-www-form-urlencoded"
    {
        Coercion::String
    } else {
        Coercion::ByteArray
    }
}

/// Media type without parameters, lower-cased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

fn decode_text(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset)
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

async fn read_fully(body: BodyStream) -> HttpResult<Bytes> {
    body.bytes().await.map_err(body_read_error)
}

/// Transport failures surface unchanged; anything else went wrong while
/// inflating.
fn body_read_error(err: io::Error) -> HttpError {
    if err
        .get_ref()
        .is_some_and(|inner| inner.is::<reqwest::Error>())
    {
        if let Some(inner) = err.into_inner() {
            if let Ok(transport) = inner.downcast::<reqwest::Error>() {
                return HttpError::Transport(*transport);
            }
        }
        return HttpError::Decode("response body could not be read".to_string());
    }
    HttpError::Decode(format!("Failed to decode response body: {}", err))
}
