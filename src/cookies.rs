//! File-backed cookie jar.
//!
//! Cookies live in a single file using the Netscape cookie-file layout that
//! curl reads and writes:
//!
//! ```text
//! # Netscape HTTP Cookie File
//! .example.com	TRUE	/	FALSE	0	session	abc
//! #HttpOnly_example.com	FALSE	/app	TRUE	1767225600	token	xyz
//! ```
//!
//! The jar keeps no in-memory state; every response merges its `Set-Cookie`
//! headers into the file and every request reads the file back. A cookie
//! stored by one request is therefore visible to the next request that uses
//! the same file, even across separate HTTP clients.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDateTime, Utc};
use http::HeaderValue;
use url::Url;

const FILE_HEADER: &str = "# Netscape HTTP Cookie File\n# This file is generated by curlrox-rs. Edit at your own risk.\n\n";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Domain without a leading dot.
    pub domain: String,
    /// `false` for host-only cookies (no `Domain` attribute).
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Unix timestamp; `0` marks a session cookie.
    pub expires: i64,
    pub name: String,
    pub value: String,
}

impl Cookie {
    fn is_expired(&self, now: i64) -> bool {
        self.expires != 0 && self.expires <= now
    }

    fn same_slot(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    /// Whether the cookie should be sent with a request to `url`.
    pub fn matches(&self, url: &Url, now: i64) -> bool {
        if self.is_expired(now) {
            return false;
        }
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain_ok = if self.include_subdomains {
            host == self.domain || host.ends_with(&format!(".{}", self.domain))
        } else {
            host == self.domain
        };
        domain_ok && path_matches(url.path(), &self.path)
    }

    fn to_line(&self) -> String {
        let domain = if self.include_subdomains {
            format!(".{}", self.domain)
        } else {
            self.domain.clone()
        };
        format!(
            "{}{}\t{}\t{}\t{}\t{}\t{}\t{}",
            if self.http_only { HTTP_ONLY_PREFIX } else { "" },
            domain,
            flag(self.include_subdomains),
            self.path,
            flag(self.secure),
            self.expires,
            self.name,
            self.value,
        )
    }

    fn from_line(line: &str) -> Option<Self> {
        let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None if line.starts_with('#') => return None,
            None => (line, false),
        };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 {
            return None;
        }

        let domain = fields[0].trim_start_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return None;
        }

        Some(Self {
            domain,
            include_subdomains: fields[1].eq_ignore_ascii_case("TRUE"),
            path: fields[2].to_string(),
            secure: fields[3].eq_ignore_ascii_case("TRUE"),
            http_only,
            expires: fields[4].parse().ok()?,
            name: fields[5].to_string(),
            value: fields.get(6).map(|v| v.to_string()).unwrap_or_default(),
        })
    }
}

/// Cookie jar persisted to one file.
#[derive(Debug)]
pub struct FileCookieJar {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileCookieJar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All cookies currently in the file, expired ones included.
    pub fn load(&self) -> io::Result<Vec<Cookie>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        Ok(contents
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .filter_map(Cookie::from_line)
            .collect())
    }

    fn save(&self, cookies: &[Cookie]) -> io::Result<()> {
        let mut out = String::from(FILE_HEADER);
        for cookie in cookies {
            out.push_str(&cookie.to_line());
            out.push('\n');
        }
        fs::write(&self.path, out)
    }

    /// Merge `Set-Cookie` header values received from `url` into the file.
    pub fn store_response_cookies<'a, I>(&self, set_cookie: I, url: &Url) -> io::Result<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let now = Utc::now().timestamp();
        let incoming: Vec<Cookie> = set_cookie
            .into_iter()
            .filter_map(|header| parse_set_cookie(header, url, now))
            .collect();
        if incoming.is_empty() {
            return Ok(0);
        }

        let _lock = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut cookies = self.load()?;
        for cookie in &incoming {
            cookies.retain(|existing| !existing.same_slot(cookie));
            if !cookie.is_expired(now) {
                cookies.push(cookie.clone());
            }
        }
        cookies.retain(|cookie| !cookie.is_expired(now));
        self.save(&cookies)?;

        log::trace!(
            "cookie jar {} updated from {} ({} set-cookie, {} stored)",
            self.path.display(),
            url,
            incoming.len(),
            cookies.len()
        );
        Ok(incoming.len())
    }

    /// `Cookie` header value for a request to `url`, if any cookie matches.
    pub fn request_cookie_header(&self, url: &Url) -> io::Result<Option<String>> {
        let now = Utc::now().timestamp();
        let _lock = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut matching: Vec<Cookie> = self
            .load()?
            .into_iter()
            .filter(|cookie| cookie.matches(url, now))
            .collect();

        // Longer paths first.
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        let header = matching
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        Ok((!header.is_empty()).then_some(header))
    }
}

impl reqwest::cookie::CookieStore for FileCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers = cookie_headers.filter_map(|value| value.to_str().ok());
        if let Err(err) = self.store_response_cookies(headers, url) {
            log::warn!("failed to persist cookies to {}: {}", self.path.display(), err);
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        match self.request_cookie_header(url) {
            Ok(header) => header.and_then(|h| HeaderValue::from_str(&h).ok()),
            Err(err) => {
                log::warn!("failed to read cookies from {}: {}", self.path.display(), err);
                None
            }
        }
    }
}

/// Parse one `Set-Cookie` value received from `url`.
///
/// Returns `None` for cookies that must be ignored (no name, control
/// characters in the name or value, or a `Domain` attribute the host is not
/// allowed to set). A cookie whose expiry lies in
/// the past is still returned so callers can delete the stored copy.
pub fn parse_set_cookie(header: &str, url: &Url, now: i64) -> Option<Cookie> {
    let host = url.host_str()?.to_ascii_lowercase();
    let mut parts = header.split(';');

    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    let value = value.trim().trim_matches('"');
    // Control characters (tab included) would break the jar file columns.
    if name.is_empty() || name.contains(char::is_control) || value.contains(char::is_control) {
        return None;
    }

    let mut cookie = Cookie {
        domain: host.clone(),
        include_subdomains: false,
        path: default_path(url),
        secure: false,
        http_only: false,
        expires: 0,
        name: name.to_string(),
        value: value.to_string(),
    };

    let mut max_age: Option<i64> = None;
    let mut expires: Option<i64> = None;

    for part in parts {
        let part = part.trim();
        let (key, val) = match part.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (part, ""),
        };

        match key.to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => {
                let domain = val.trim_start_matches('.').to_ascii_lowercase();
                if host != domain && !host.ends_with(&format!(".{domain}")) {
                    return None;
                }
                cookie.domain = domain;
                cookie.include_subdomains = true;
            }
            "path" if val.starts_with('/') => cookie.path = val.to_string(),
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "max-age" => max_age = val.parse().ok(),
            "expires" => expires = parse_cookie_date(val),
            _ => {}
        }
    }

    // Max-Age wins over Expires; expired cookies get a timestamp in the past.
    cookie.expires = match (max_age, expires) {
        (Some(secs), _) if secs <= 0 => 1,
        (Some(secs), _) => now.saturating_add(secs),
        (None, Some(ts)) if ts <= now => 1,
        (None, Some(ts)) => ts,
        (None, None) => 0,
    };

    Some(cookie)
}

fn parse_cookie_date(value: &str) -> Option<i64> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.timestamp());
    }
    ["%a, %d-%b-%Y %H:%M:%S GMT", "%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc().timestamp())
}

fn default_path(url: &Url) -> String {
    match url.path().rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
        _ => "/".to_string(),
    }
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

fn flag(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}
