//! # curlrox-rs
//!
//! A small HTTP request wrapper in the spirit of a configured curl handle.
//!
//! A [`RequestContext`] holds request options (URI, user agent, timeouts,
//! redirects, TLS verification, headers, POST payload), performs GET or POST
//! requests, and keeps the last response body and metadata around for
//! inspection. Every context owns a cookie jar file, so cookies set by one
//! response are sent on the next request made through the same context.
//!
//! ## Features
//!
//! - Form-encoded POST payloads built from key/value pairs
//! - Per-context cookie jar in Netscape cookie-file format
//! - curl-style response metadata (`http_code`, `total_time`, `redirect_count`, ...)
//! - JSON decoding and HTML callbacks over the stored body
//! - Locked dumps of the response body to disk
//!
//! TLS verification is **off** by default. Call
//! [`RequestContext::enable_tls_verification`] with a CA bundle before
//! talking to anything you do not control.
//!
//! ## Example
//!
//! ```no_run
//! use curlrox_rs::RequestContext;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut ctx = RequestContext::new()?;
//!     ctx.set_uri("https://httpbin.org/post")
//!         .set_post_payload([("name", "curlrox"), ("language", "Rust")]);
//!     ctx.execute_post().await?;
//!
//!     println!("status: {}", ctx.last_status_code()?);
//!     let json: serde_json::Value = ctx.response_json()?;
//!     println!("form: {}", json["form"]);
//!     Ok(())
//! }
//! ```
//!
//! Contexts are not shared between tasks. To fetch several URLs at once,
//! create one context per task.

mod context;

pub mod cookies;
pub mod headers;
pub mod info;
pub mod payload;
pub mod transport;

pub use crate::context::{
    ContextConfig,
    DEFAULT_USER_AGENT,
    RequestContext,
    RequestContextBuilder,
    RequestError,
    RequestResult,
};

pub use crate::cookies::{Cookie, FileCookieJar};
pub use crate::info::ResponseInfo;
pub use crate::payload::PostPayload;
pub use crate::transport::{
    ReqwestTransport,
    RequestDescriptor,
    TlsMode,
    Transport,
    TransportError,
    TransportResponse,
};

pub use scraper::{Html, Selector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
