//! Metadata recorded for the last executed request.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Transfer information, keyed like curl's `getinfo` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseInfo {
    /// Effective URL after redirects.
    pub url: String,
    pub http_code: u16,
    pub content_type: Option<String>,
    pub redirect_count: u32,
    /// Seconds from dispatch until the body was fully read.
    pub total_time: f64,
    pub size_download: u64,
    /// Declared `Content-Length`, if any.
    pub download_content_length: Option<u64>,
    pub primary_ip: Option<String>,
    pub primary_port: Option<u16>,
    pub effective_method: String,
    pub response_headers: BTreeMap<String, Vec<String>>,
}

impl ResponseInfo {
    pub fn new(url: impl Into<String>, http_code: u16, effective_method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http_code,
            content_type: None,
            redirect_count: 0,
            total_time: 0.0,
            size_download: 0,
            download_content_length: None,
            primary_ip: None,
            primary_port: None,
            effective_method: effective_method.into(),
            response_headers: BTreeMap::new(),
        }
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_time)
    }

    /// Whole record as a JSON object.
    pub fn to_map(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Single field by its curl-info name; `None` when there is no such key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key)
    }

    /// Values of a response header (name is case-insensitive).
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.response_headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }
}
