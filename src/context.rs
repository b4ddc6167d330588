//! Request context.
//!
//! A [`RequestContext`] owns its configuration, a cookie jar file and the
//! outcome of the last request. Configure it, call
//! [`execute_get`](RequestContext::execute_get) or
//! [`execute_post`](RequestContext::execute_post), then inspect the body and
//! metadata. The cookie file is created with the context and removed when it
//! is dropped.

use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use scraper::Html;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tempfile::TempPath;
use thiserror::Error;

use crate::cookies::{Cookie, FileCookieJar};
use crate::headers;
use crate::info::ResponseInfo;
use crate::payload::PostPayload;
use crate::transport::{
	ReqwestTransport, RequestDescriptor, TlsMode, Transport, TransportError,
};

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str =
	"Mozilla/5.0 (Windows NT 6.1; WOW64; rv:42.0) Gecko/20100101 Firefox/42.0";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Result alias used across the crate.
pub type RequestResult<T> = Result<T, RequestError>;

/// Errors surfaced by [`RequestContext`].
#[derive(Debug, Error)]
pub enum RequestError {
	#[error("invalid configuration: {0}")]
	Config(String),
	#[error("transport error: {0}")]
	Transport(#[from] TransportError),
	#[error("{0}")]
	State(&'static str),
	#[error("json parse error: {0}")]
	Json(#[from] serde_json::Error),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

impl RequestError {
	/// JSON decoding of the stored body failed.
	pub fn is_parse(&self) -> bool {
		matches!(self, RequestError::Json(_))
	}
}

/// Context configuration. Every field has a default, so partial JSON
/// documents deserialize fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
	pub uri: String,
	pub user_agent: String,
	/// Connect and total timeout; `0` disables both.
	pub timeout_secs: u64,
	pub follow_redirects: bool,
	pub auto_referer: bool,
	pub max_redirects: usize,
	/// Verify peer and hostname against `ca_cert`.
	///
	/// Off by default for parity with the historical behaviour. This is an
	/// insecure default; turn it on for anything that matters.
	pub tls_verify: bool,
	pub ca_cert: Option<PathBuf>,
	/// Curl-style `"Name: value"` lines.
	pub headers: Vec<String>,
	pub return_body_as_string: bool,
	/// Directory for the cookie jar file. `None` uses the system temp dir.
	pub temp_dir: Option<PathBuf>,
	pub cookie_file_prefix: String,
}

impl Default for ContextConfig {
	fn default() -> Self {
		Self {
			uri: String::new(),
			user_agent: DEFAULT_USER_AGENT.to_string(),
			timeout_secs: 30,
			follow_redirects: true,
			auto_referer: true,
			max_redirects: 20,
			tls_verify: false,
			ca_cert: None,
			headers: Vec::new(),
			return_body_as_string: true,
			temp_dir: None,
			cookie_file_prefix: "Curl".to_string(),
		}
	}
}

impl ContextConfig {
	pub fn from_json_str(json: &str) -> RequestResult<Self> {
		Ok(serde_json::from_str(json)?)
	}

	pub fn from_json_file(path: impl AsRef<Path>) -> RequestResult<Self> {
		let contents = std::fs::read_to_string(path)?;
		Self::from_json_str(&contents)
	}
}

/// Fluent builder for [`RequestContext`].
pub struct RequestContextBuilder {
	config: ContextConfig,
	transport: Option<Arc<dyn Transport>>,
}

impl RequestContextBuilder {
	pub fn new() -> Self {
		Self {
			config: ContextConfig::default(),
			transport: None,
		}
	}

	pub fn with_config(mut self, config: ContextConfig) -> Self {
		self.config = config;
		self
	}

	pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
		self.config.uri = uri.into();
		self
	}

	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.config.user_agent = user_agent.into();
		self
	}

	pub fn with_timeout_secs(mut self, secs: u64) -> Self {
		self.config.timeout_secs = secs;
		self
	}

	pub fn with_max_redirects(mut self, max: usize) -> Self {
		self.config.max_redirects = max;
		self
	}

	pub fn disable_redirects(mut self) -> Self {
		self.config.follow_redirects = false;
		self
	}

	pub fn disable_auto_referer(mut self) -> Self {
		self.config.auto_referer = false;
		self
	}

	/// Verified when [`build`](Self::build) runs.
	pub fn with_tls_verification(mut self, ca_cert: impl Into<PathBuf>) -> Self {
		self.config.tls_verify = true;
		self.config.ca_cert = Some(ca_cert.into());
		self
	}

	pub fn with_header_lines<I, S>(mut self, lines: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.headers = lines.into_iter().map(Into::into).collect();
		self
	}

	pub fn without_return_transfer(mut self) -> Self {
		self.config.return_body_as_string = false;
		self
	}

	pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.temp_dir = Some(dir.into());
		self
	}

	pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn build(self) -> RequestResult<RequestContext> {
		RequestContext::with_config(self.config, self.transport)
	}
}

impl Default for RequestContextBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Body and metadata of the last successful request, always set together.
struct LastResponse {
	body: Bytes,
	info: ResponseInfo,
}

/// Configuration plus outcome of GET/POST requests sharing one cookie jar.
///
/// A context is not meant to be shared between tasks; requests take
/// `&mut self`. To fetch concurrently, give every task its own context.
pub struct RequestContext {
	uri: String,
	user_agent: String,
	timeout: Duration,
	follow_redirects: bool,
	auto_referer: bool,
	max_redirects: usize,
	tls: TlsMode,
	headers: HeaderMap,
	return_body_as_string: bool,
	post_payload: Option<PostPayload>,
	cookie_file: TempPath,
	transport: Arc<dyn Transport>,
	last: Option<LastResponse>,
}

impl RequestContext {
	/// Context with default configuration and the reqwest transport.
	pub fn new() -> RequestResult<Self> {
		RequestContext::with_config(ContextConfig::default(), None)
	}

	pub fn builder() -> RequestContextBuilder {
		RequestContextBuilder::new()
	}

	fn with_config(
		config: ContextConfig,
		transport: Option<Arc<dyn Transport>>,
	) -> RequestResult<Self> {
		let tls = match (config.tls_verify, config.ca_cert) {
			(true, Some(ca_cert)) => {
				ensure_exists(&ca_cert)?;
				TlsMode::Verify { ca_cert }
			}
			(true, None) => {
				return Err(RequestError::Config(
					"tls verification requires a CA certificate path".into(),
				));
			}
			(false, _) => TlsMode::Disabled,
		};
		let headers = headers::from_lines(&config.headers)?;

		let temp_dir = config.temp_dir.unwrap_or_else(std::env::temp_dir);
		let cookie_file = tempfile::Builder::new()
			.prefix(&config.cookie_file_prefix)
			.tempfile_in(&temp_dir)?
			.into_temp_path();
		log::trace!("created cookie jar {}", cookie_file.display());

		Ok(Self {
			uri: config.uri,
			user_agent: config.user_agent,
			timeout: Duration::from_secs(config.timeout_secs),
			follow_redirects: config.follow_redirects,
			auto_referer: config.auto_referer,
			max_redirects: config.max_redirects,
			tls,
			headers,
			return_body_as_string: config.return_body_as_string,
			post_payload: None,
			cookie_file,
			transport: transport.unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
			last: None,
		})
	}

	pub fn uri(&self) -> &str {
		&self.uri
	}

	pub fn set_uri(&mut self, uri: impl Into<String>) -> &mut Self {
		self.uri = uri.into();
		self
	}

	pub fn user_agent(&self) -> &str {
		&self.user_agent
	}

	pub fn set_user_agent(&mut self, user_agent: impl Into<String>) -> &mut Self {
		self.user_agent = user_agent.into();
		self
	}

	/// Applies to both the connect phase and the whole transfer. Zero means
	/// no timeout.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
		self.timeout = timeout;
		self
	}

	pub fn follow_redirects(&self) -> bool {
		self.follow_redirects
	}

	pub fn set_follow_redirects(&mut self, follow: bool) -> &mut Self {
		self.follow_redirects = follow;
		self
	}

	pub fn auto_referer(&self) -> bool {
		self.auto_referer
	}

	pub fn set_auto_referer(&mut self, enabled: bool) -> &mut Self {
		self.auto_referer = enabled;
		self
	}

	pub fn max_redirects(&self) -> usize {
		self.max_redirects
	}

	pub fn set_max_redirects(&mut self, max: usize) -> &mut Self {
		self.max_redirects = max;
		self
	}

	pub fn return_body_as_string(&self) -> bool {
		self.return_body_as_string
	}

	pub fn set_return_body_as_string(&mut self, enabled: bool) -> &mut Self {
		self.return_body_as_string = enabled;
		self
	}

	pub fn tls(&self) -> &TlsMode {
		&self.tls
	}

	pub fn tls_verify(&self) -> bool {
		self.tls.is_verifying()
	}

	/// Turn on peer and hostname verification against `ca_cert`.
	///
	/// Fails without touching the current TLS mode when the file is missing.
	pub fn enable_tls_verification(&mut self, ca_cert: impl AsRef<Path>) -> RequestResult<&mut Self> {
		let ca_cert = ca_cert.as_ref();
		ensure_exists(ca_cert)?;
		self.tls = TlsMode::Verify {
			ca_cert: ca_cert.to_path_buf(),
		};
		Ok(self)
	}

	pub fn disable_tls_verification(&mut self) -> &mut Self {
		self.tls = TlsMode::Disabled;
		self
	}

	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Headers as `"Name: value"` lines.
	pub fn header_lines(&self) -> Vec<String> {
		headers::to_lines(&self.headers)
	}

	/// Replace the request headers with name/value pairs.
	pub fn set_headers<I, K, V>(&mut self, pairs: I) -> RequestResult<&mut Self>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		self.headers = headers::from_pairs(pairs)?;
		Ok(self)
	}

	/// Replace the request headers with `"Name: value"` lines.
	pub fn set_header_lines<I, S>(&mut self, lines: I) -> RequestResult<&mut Self>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.headers = headers::from_lines(lines)?;
		Ok(self)
	}

	/// Form-encode `pairs` and use them as the POST body.
	pub fn set_post_payload<I, K, V>(&mut self, pairs: I) -> &mut Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.post_payload = Some(PostPayload::from_pairs(pairs));
		self
	}

	/// Use an already encoded POST body.
	pub fn set_raw_post_payload(&mut self, body: impl Into<String>) -> &mut Self {
		self.post_payload = Some(PostPayload::raw(body));
		self
	}

	pub fn clear_post_payload(&mut self) -> &mut Self {
		self.post_payload = None;
		self
	}

	/// Encoded POST body.
	pub fn post_payload(&self) -> Option<&str> {
		self.post_payload.as_ref().map(PostPayload::encoded)
	}

	/// Pairs the POST body was encoded from, if it was set from a mapping.
	pub fn post_payload_fields(&self) -> Option<&[(String, String)]> {
		self.post_payload.as_ref().and_then(PostPayload::fields)
	}

	/// Cookie jar file backing this context.
	pub fn cookie_file(&self) -> &Path {
		&self.cookie_file
	}

	/// Cookies currently stored in the jar.
	pub fn stored_cookies(&self) -> RequestResult<Vec<Cookie>> {
		Ok(FileCookieJar::new(self.cookie_file()).load()?)
	}

	/// Perform a GET request against [`uri`](Self::uri).
	///
	/// HTTP error statuses are not errors; only transport failures are.
	pub async fn execute_get(&mut self) -> RequestResult<&mut Self> {
		self.execute(Method::GET).await
	}

	/// Perform a POST request carrying the encoded payload.
	pub async fn execute_post(&mut self) -> RequestResult<&mut Self> {
		self.execute(Method::POST).await
	}

	async fn execute(&mut self, method: Method) -> RequestResult<&mut Self> {
		let request = self.prepare_request(method);
		log::debug!("-> {} {}", request.method, request.uri);
		let no_payload = self.post_payload.as_ref().is_none_or(PostPayload::is_empty);
		if request.method == Method::POST && no_payload {
			log::debug!("no post payload set, sending an empty form body");
		}

		let response = self.transport.perform(&request).await?;
		log::debug!(
			"<- {} {} -> {} ({:?}, {} redirects)",
			request.method,
			response.info.url,
			response.info.http_code,
			response.info.total_duration(),
			response.info.redirect_count
		);

		self.last = Some(LastResponse {
			body: response.body,
			info: response.info,
		});
		Ok(self)
	}

	/// Translate the current configuration into a transport request.
	pub fn prepare_request(&self, method: Method) -> RequestDescriptor {
		let is_post = method == Method::POST;
		let mut headers = self.headers.clone();
		let body = if is_post {
			if !headers.contains_key(CONTENT_TYPE) {
				headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
			}
			let encoded = self.post_payload().unwrap_or_default();
			Some(Bytes::copy_from_slice(encoded.as_bytes()))
		} else {
			None
		};

		RequestDescriptor {
			method,
			uri: self.uri.clone(),
			return_transfer: self.return_body_as_string,
			follow_redirects: self.follow_redirects,
			auto_referer: self.auto_referer,
			max_redirects: self.max_redirects,
			user_agent: self.user_agent.clone(),
			timeout: self.timeout,
			cookie_jar: self.cookie_file.to_path_buf(),
			headers,
			tls: self.tls.clone(),
			body,
		}
	}

	pub fn has_executed(&self) -> bool {
		self.last.is_some()
	}

	/// Metadata of the last request.
	pub fn metadata(&self) -> Option<&ResponseInfo> {
		self.last.as_ref().map(|last| &last.info)
	}

	/// One metadata field by name, `None` when absent.
	pub fn metadata_field(&self, key: &str) -> Option<serde_json::Value> {
		self.metadata().and_then(|info| info.get(key))
	}

	/// Raw body of the last request.
	pub fn response_body(&self) -> Option<&[u8]> {
		self.last.as_ref().map(|last| last.body.as_ref())
	}

	pub fn response_bytes(&self) -> Option<Bytes> {
		self.last.as_ref().map(|last| last.body.clone())
	}

	/// Body as text, replacing invalid UTF-8 sequences.
	pub fn response_text(&self) -> Option<Cow<'_, str>> {
		self.response_body().map(String::from_utf8_lossy)
	}

	/// Decode the body as JSON.
	pub fn response_json<T: DeserializeOwned>(&self) -> RequestResult<T> {
		let body = self.executed_body()?;
		Ok(serde_json::from_slice(body)?)
	}

	/// `true` only when the last status code is exactly 200.
	pub fn is_success_status(&self) -> bool {
		self.metadata().is_some_and(|info| info.http_code == 200)
	}

	pub fn last_status_code(&self) -> RequestResult<u16> {
		self.metadata()
			.map(|info| info.http_code)
			.ok_or(RequestError::State(NOT_EXECUTED))
	}

	/// Parse the body as HTML and hand it to `callback` with the raw body
	/// and this context. Invalid UTF-8 sequences are replaced before
	/// parsing; the raw body is passed through untouched.
	pub fn with_parsed_document<F, R>(&self, callback: F) -> RequestResult<R>
	where
		F: FnOnce(&[u8], &Html, &Self) -> R,
	{
		let body = self.executed_body()?;
		let document = Html::parse_document(&String::from_utf8_lossy(body));
		Ok(callback(body, &document, self))
	}

	/// Write the body to `path` under an exclusive lock, replacing any
	/// previous content.
	pub fn write_response_to_file(&self, path: impl AsRef<Path>) -> RequestResult<&Self> {
		let path = path.as_ref();
		let body = self.executed_body()?;

		let mut file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(false)
			.open(path)?;
		file.lock()?;
		file.set_len(0)?;
		file.write_all(body)?;
		file.flush()?;
		file.unlock()?;

		log::info!("wrote response to {}", path.display());
		Ok(self)
	}

	/// Drop the context, reporting failure to delete the cookie file.
	pub fn close(self) -> RequestResult<()> {
		Ok(self.cookie_file.close()?)
	}

	fn executed_body(&self) -> RequestResult<&[u8]> {
		self.response_body().ok_or(RequestError::State(NOT_EXECUTED))
	}
}

const NOT_EXECUTED: &str = "no request executed yet";

fn ensure_exists(path: &Path) -> RequestResult<()> {
	if path.exists() {
		Ok(())
	} else {
		Err(RequestError::Config(format!("cert {} not found", path.display())))
	}
}
