//! POST payload handling.
//!
//! Structured payloads are form-encoded as soon as they are set; the encoded
//! string is what goes on the wire.

use url::form_urlencoded;

/// Body attached to POST requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPayload {
    encoded: String,
    fields: Option<Vec<(String, String)>>,
}

impl PostPayload {
    /// Form-encode `key=value&key2=value2`, percent-encoding every key and value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter())
            .finish();

        Self {
            encoded,
            fields: Some(fields),
        }
    }

    /// Use an already encoded body verbatim.
    pub fn raw(body: impl Into<String>) -> Self {
        Self {
            encoded: body.into(),
            fields: None,
        }
    }

    /// Encoded form, as transmitted.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Original key/value pairs when the payload was built from a mapping.
    pub fn fields(&self) -> Option<&[(String, String)]> {
        self.fields.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }
}
