//! Notification 2.0 wire format: endpoint paths, frame parsing and streaming URL
//! construction.

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::types::{Severity, Token};

// ---------------------------------------------------------------------------
// Endpoint paths
// ---------------------------------------------------------------------------

pub(crate) const SUBSCRIPTIONS_PATH: &str = "/notification2/subscriptions";
pub(crate) const TOKEN_PATH: &str = "/notification2/token";
pub(crate) const CONSUMER_PATH: &str = "/notification2/consumer/";
pub(crate) const SUBSCRIPTION_MEDIA_TYPE: &str =
    "application/vnd.com.nsn.cumulocity.subscription+json";

// ---------------------------------------------------------------------------
// Notification frames
// ---------------------------------------------------------------------------

/// One delivered notification.
///
/// A frame is zero or more header lines, a blank line and a JSON payload. The
/// first header is the acknowledgment token; the rest are routing headers.
/// When the frame has no header lines, `ack_header` is `None` and
/// `routing_headers` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_header: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routing_headers: Vec<String>,
    pub payload: serde_json::Value,
}

impl NotificationFrame {
    /// API segment of the source routing header, e.g. `alarms` for
    /// `/t12345/alarms/16412`.
    pub fn api(&self) -> Option<&str> {
        self.routing_headers
            .first()?
            .split('/')
            .filter(|segment| !segment.is_empty())
            .nth(1)
    }

    /// Action header (`CREATE`, `UPDATE`, `DELETE`) when present.
    pub fn action(&self) -> Option<&str> {
        self.routing_headers.get(1).map(String::as_str)
    }

    /// Severity of an alarm payload.
    pub fn severity(&self) -> Option<Severity> {
        self.payload
            .get("severity")
            .and_then(|v| Severity::deserialize(v).ok())
    }
}

/// Split a raw frame into headers and JSON payload.
pub fn parse(raw: &str) -> Result<NotificationFrame, Error> {
    let mut headers = Vec::new();
    let mut rest = raw;
    while let Some((line, remainder)) = rest.split_once('\n') {
        rest = remainder;
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        headers.push(line.to_string());
    }

    let payload = serde_json::from_str(rest).map_err(Error::MalformedFrame)?;
    let mut headers = headers.into_iter();
    Ok(NotificationFrame {
        ack_header: headers.next(),
        routing_headers: headers.collect(),
        payload,
    })
}

// ---------------------------------------------------------------------------
// Streaming URL construction
// ---------------------------------------------------------------------------

fn strip_scheme<'a>(url: &'a str, scheme: &str) -> Option<&'a str> {
    let head = url.get(..scheme.len())?;
    if head.eq_ignore_ascii_case(scheme) {
        url.get(scheme.len()..)
    } else {
        None
    }
}

/// Rewrite the provider URL to its secure streaming equivalent: `https` and
/// `http` both become `wss`, and a bare host defaults to `wss`. A URL that
/// already names a streaming scheme (`ws`, `wss`) is kept as is.
pub(crate) fn streaming_base(provider: &str) -> String {
    let provider = provider.trim_end_matches('/');
    if let Some(rest) =
        strip_scheme(provider, "https://").or_else(|| strip_scheme(provider, "http://"))
    {
        format!("wss://{rest}")
    } else if provider.contains("://") {
        provider.to_string()
    } else {
        format!("wss://{provider}")
    }
}

pub(crate) fn build_stream_url(base: &str, token: &Token) -> Result<url::Url, Error> {
    let mut url = url::Url::parse(&format!("{base}{CONSUMER_PATH}"))?;
    url.query_pairs_mut().append_pair("token", token.as_str());
    Ok(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
