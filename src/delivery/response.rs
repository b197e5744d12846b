//! Delivery outcomes and their classification.

use log::{debug, warn};
use serde_json::{Map, Value};
use thiserror::Error;

/// Parsed body of a successful bulk response.
pub type JsonObject = Map<String, Value>;

/// Why a delivery failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// No response was obtained (DNS, connect, TLS, or I/O failure).
    #[error("transport error: {0}")]
    Transport(String),
    /// The endpoint answered with a status outside 200..=299.
    #[error("endpoint responded with HTTP {code} {reason}")]
    Status { code: u16, reason: String },
    /// The client was shut down before the request could be queued.
    #[error("delivery client is closed")]
    Closed,
    /// The submission queue was full.
    #[error("delivery queue is full")]
    QueueFull,
    /// No outcome arrived before the wait deadline.
    #[error("timed out waiting for delivery outcome")]
    TimedOut,
}

/// Status line and headers of a received response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
    pub status_text: String,
    /// Header names are lower-cased.
    pub headers: Vec<(String, String)>,
}

impl ResponseMeta {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Failed delivery with whatever context was available.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{error}")]
pub struct DeliveryFailure {
    pub error: DeliveryError,
    pub response: Option<ResponseMeta>,
    pub body: Option<Vec<u8>>,
}

impl DeliveryFailure {
    /// Failure without response context.
    pub fn new(error: DeliveryError) -> Self {
        Self {
            error,
            response: None,
            body: None,
        }
    }

    /// Raw body decoded lossily as UTF-8.
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }
}

impl From<DeliveryError> for DeliveryFailure {
    fn from(error: DeliveryError) -> Self {
        Self::new(error)
    }
}

/// Classification of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx responses.
    Success,
    /// Everything else.
    Rejected,
}

pub fn classify_status(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        _ => ResponseClass::Rejected,
    }
}

/// Turn a received response into a delivery outcome.
pub(crate) fn response_outcome(
    meta: ResponseMeta,
    body: Vec<u8>,
) -> Result<JsonObject, DeliveryFailure> {
    match classify_status(meta.status) {
        ResponseClass::Success => Ok(parse_success_body(meta.status, &body)),
        ResponseClass::Rejected => Err(DeliveryFailure {
            error: DeliveryError::Status {
                code: meta.status,
                reason: meta.status_text.clone(),
            },
            response: Some(meta),
            body: (!body.is_empty()).then_some(body),
        }),
    }
}

/// Parse a 2xx body, falling back to an empty object.
pub(crate) fn parse_success_body(status: u16, body: &[u8]) -> JsonObject {
    if body.iter().all(u8::is_ascii_whitespace) {
        debug!("bulk endpoint returned HTTP {status} with an empty body");
        return JsonObject::new();
    }
    match serde_json::from_slice::<JsonObject>(body) {
        Ok(object) => object,
        Err(err) => {
            warn!(
                "bulk endpoint returned HTTP {status} with a body that is not a JSON object: {err}; \
                 treating delivery as successful"
            );
            JsonObject::new()
        }
    }
}
