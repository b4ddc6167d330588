//! HTTP transport abstraction.
//!
//! [`RequestContext`](crate::RequestContext) assembles a [`RequestDescriptor`]
//! from its configuration and hands it to a [`Transport`]. The default
//! implementation is [`ReqwestTransport`]; tests can plug in their own.

mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use thiserror::Error;

use crate::info::ResponseInfo;

/// Peer certificate handling for HTTPS requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Accept any certificate and hostname.
    #[default]
    Disabled,
    /// Verify peer and hostname against the CA bundle at the given path.
    Verify { ca_cert: PathBuf },
}

impl TlsMode {
    pub fn is_verifying(&self) -> bool {
        matches!(self, TlsMode::Verify { .. })
    }
}

/// Everything the transport needs to perform one request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub uri: String,
    /// Return the body to the caller instead of writing it to stdout.
    pub return_transfer: bool,
    pub follow_redirects: bool,
    /// Set `Referer` to the previous URL on each redirect.
    pub auto_referer: bool,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Total timeout, also used as the connect timeout. Zero disables both.
    pub timeout: Duration,
    /// Cookie jar file, read before and written after the request.
    pub cookie_jar: PathBuf,
    pub headers: HeaderMap,
    pub tls: TlsMode,
    pub body: Option<Bytes>,
}

/// Raw body plus metadata of a completed transfer.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub body: Bytes,
    pub info: ResponseInfo,
}

/// Failure reported by the transport. Carries the transport's own message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Capability that performs a single HTTP request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError>;
}
