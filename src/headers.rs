//! Outgoing request headers.
//!
//! Headers can be supplied as name/value pairs or as curl-style
//! `"Name: value"` lines. Both forms are validated up front and stored as a
//! [`HeaderMap`].

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::context::{RequestError, RequestResult};

/// Build a header map from name/value pairs. Repeated names are kept.
pub fn from_pairs<I, K, V>(pairs: I) -> RequestResult<HeaderMap>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let (name, value) = (name.as_ref(), value.as_ref());
        headers.append(header_name(name)?, header_value(name, value)?);
    }
    Ok(headers)
}

/// Build a header map from `"Name: value"` lines.
pub fn from_lines<I, S>(lines: I) -> RequestResult<HeaderMap>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.as_ref();
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RequestError::Config(format!("malformed header line {line:?}")))?;
        let name = name.trim();
        headers.append(header_name(name)?, header_value(name, value.trim())?);
    }
    Ok(headers)
}

/// Render headers back to `"Name: value"` lines.
pub fn to_lines(headers: &HeaderMap) -> Vec<String> {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect()
}

fn header_name(name: &str) -> RequestResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| RequestError::Config(format!("invalid header name {name:?}")))
}

fn header_value(name: &str, value: &str) -> RequestResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| RequestError::Config(format!("invalid value for header {name:?}")))
}
