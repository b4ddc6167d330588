//! Reqwest-based implementation of the [`Transport`] trait.
//!
//! A fresh `reqwest::Client` is built for every request so each descriptor's
//! timeout, redirect, TLS and cookie-jar settings apply exactly. Cookies are
//! shared between requests through the jar file only.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client, ClientBuilder};
use tokio::io::AsyncWriteExt;

use super::{RequestDescriptor, TlsMode, Transport, TransportError, TransportResponse};
use crate::cookies::FileCookieJar;
use crate::info::ResponseInfo;

/// Default transport backed by `reqwest` with native TLS.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    async fn build_client(
        &self,
        request: &RequestDescriptor,
        tracker: Arc<RedirectTracker>,
    ) -> Result<Client, TransportError> {
        let jar = Arc::new(FileCookieJar::new(&request.cookie_jar));

        let mut builder = Client::builder()
            .user_agent(request.user_agent.as_str())
            .cookie_provider(jar)
            .referer(request.auto_referer)
            .redirect(redirect_policy(request, tracker));
        // Zero leaves both limits unset, like curl.
        if !request.timeout.is_zero() {
            builder = builder
                .timeout(request.timeout)
                .connect_timeout(request.timeout);
        }

        builder = configure_tls(builder, &request.tls).await?;
        builder.build().map_err(describe)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        let tracker = Arc::new(RedirectTracker::default());
        let client = self.build_client(request, tracker.clone()).await?;

        let mut builder = client
            .request(request.method.clone(), request.uri.as_str())
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(describe)?;

        let mut info = ResponseInfo::new(
            response.url().as_str(),
            response.status().as_u16(),
            effective_method(&request.method, &tracker).as_str(),
        );
        info.redirect_count = tracker.count.load(Ordering::Relaxed);
        info.download_content_length = response.content_length();
        info.response_headers = collect_headers(response.headers());
        info.content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(addr) = response.remote_addr() {
            info.primary_ip = Some(addr.ip().to_string());
            info.primary_port = Some(addr.port());
        }

        let body = response.bytes().await.map_err(describe)?;
        info.total_time = started.elapsed().as_secs_f64();
        info.size_download = body.len() as u64;

        let body = if request.return_transfer {
            body
        } else {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(&body)
                .await
                .map_err(|err| TransportError::new(format!("failed writing body to stdout: {err}")))?;
            stdout
                .flush()
                .await
                .map_err(|err| TransportError::new(format!("failed writing body to stdout: {err}")))?;
            Bytes::new()
        };

        Ok(TransportResponse { body, info })
    }
}

/// Redirect bookkeeping shared with the redirect policy closure.
#[derive(Debug, Default)]
struct RedirectTracker {
    count: AtomicU32,
    switched_to_get: AtomicBool,
}

fn redirect_policy(request: &RequestDescriptor, tracker: Arc<RedirectTracker>) -> Policy {
    if !request.follow_redirects {
        return Policy::none();
    }

    let max = request.max_redirects;
    Policy::custom(move |attempt| {
        // `previous` holds every URL requested so far, the original included.
        if attempt.previous().len() > max {
            return attempt.error(format!("Maximum ({max}) redirects followed"));
        }
        tracker.count.fetch_add(1, Ordering::Relaxed);
        if matches!(attempt.status().as_u16(), 301..=303) {
            tracker.switched_to_get.store(true, Ordering::Relaxed);
        }
        attempt.follow()
    })
}

fn effective_method(original: &Method, tracker: &RedirectTracker) -> Method {
    let rewritten = tracker.switched_to_get.load(Ordering::Relaxed)
        && *original != Method::GET
        && *original != Method::HEAD;
    if rewritten { Method::GET } else { original.clone() }
}

async fn configure_tls(builder: ClientBuilder, tls: &TlsMode) -> Result<ClientBuilder, TransportError> {
    match tls {
        TlsMode::Disabled => Ok(builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)),
        TlsMode::Verify { ca_cert } => {
            let pem = tokio::fs::read(ca_cert).await.map_err(|err| {
                TransportError::new(format!(
                    "error setting certificate file: {}: {err}",
                    ca_cert.display()
                ))
            })?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(describe)?;
            if certs.is_empty() {
                return Err(TransportError::new(format!(
                    "error setting certificate file: {}: no certificates found",
                    ca_cert.display()
                )));
            }

            let mut builder = builder
                .tls_built_in_root_certs(false)
                .danger_accept_invalid_certs(false)
                .danger_accept_invalid_hostnames(false);
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
            Ok(builder)
        }
    }
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

/// Flatten a reqwest error and its sources into one message.
fn describe(err: reqwest::Error) -> TransportError {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    TransportError::new(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn descriptor(uri: &str) -> RequestDescriptor {
        RequestDescriptor {
            method: Method::GET,
            uri: uri.to_string(),
            return_transfer: true,
            follow_redirects: true,
            auto_referer: true,
            max_redirects: 20,
            user_agent: "test-agent".into(),
            timeout: Duration::from_secs(5),
            cookie_jar: PathBuf::from("/nonexistent/jar.txt"),
            headers: HeaderMap::new(),
            tls: TlsMode::Disabled,
            body: None,
        }
    }

    #[test]
    fn post_becomes_get_after_see_other() {
        let tracker = RedirectTracker::default();
        assert_eq!(effective_method(&Method::POST, &tracker), Method::POST);
        tracker.switched_to_get.store(true, Ordering::Relaxed);
        assert_eq!(effective_method(&Method::POST, &tracker), Method::GET);
        assert_eq!(effective_method(&Method::HEAD, &tracker), Method::HEAD);
    }

    #[test]
    fn groups_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", "a=1".parse().unwrap());
        headers.append("set-cookie", "b=2".parse().unwrap());
        headers.insert("content-type", "text/html".parse().unwrap());
        let map = collect_headers(&headers);
        assert_eq!(map["set-cookie"], vec!["a=1", "b=2"]);
        assert_eq!(map["content-type"], vec!["text/html"]);
    }

    #[tokio::test]
    async fn empty_uri_fails_in_transport() {
        let err = ReqwestTransport::new()
            .perform(&descriptor(""))
            .await
            .unwrap_err();
        assert!(!err.message().is_empty());
    }

    #[tokio::test]
    async fn missing_ca_bundle_fails_at_request_time() {
        let mut request = descriptor("https://127.0.0.1:9/");
        request.tls = TlsMode::Verify {
            ca_cert: PathBuf::from("/nonexistent/ca.pem"),
        };
        let err = ReqwestTransport::new().perform(&request).await.unwrap_err();
        assert!(err.message().contains("certificate file"));
    }
}
