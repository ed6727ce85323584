//! carrier-http: declarative HTTP client
//!
//! Wraps reqwest behind option-driven configuration and typed response
//! bodies.
//!
//! # Architecture
//!
//! - `ClientConfig` → `HttpClient`: flat options are translated (see
//!   [`options`]) and assembled into one immutable, shareable client.
//! - `RequestSpec` → `HttpResponse`: a request is assembled, sent, its body
//!   decompressed and coerced to the `as` representation, and the status
//!   policy applied.

pub mod client;
pub mod coerce;
pub mod config;
pub mod cookies;
pub mod decode;
pub mod error;
pub mod options;
pub mod request;
pub mod response;
mod transport;

pub use client::{
    build_client, delete, get, head, options, patch, post, put, request,
    ClientSettings, HttpClient,
};
pub use coerce::{Body, BodyStream, CoercePolicy, Coercion};
pub use config::ClientConfig;
pub use cookies::PolicyCookieStore;
pub use decode::ContentEncoding;
pub use error::{HttpError, HttpErrorCategory, HttpResult};
pub use options::{CookiePolicy, HttpVersion, ProxyOption, RedirectPolicy};
pub use request::{HttpMethod, RequestBody, RequestSpec};
pub use response::{HttpResponse, RequestEcho};

pub use carrier_common::HttpStatus;
pub use reqwest::cookie::{CookieStore, Jar};
pub use reqwest::Proxy;
