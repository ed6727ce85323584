//! Common types for carrier
//!
//! Method and status vocabulary shared by the client crate and anything that
//! wants to talk about requests without pulling in the transport stack.

pub mod http;

pub use http::{HttpMethod, HttpStatus};
