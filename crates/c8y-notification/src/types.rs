//! Public types for the c8y-notification crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A boxed error type for notification handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Device selector meaning "every device of the tenant".
pub const ALL_DEVICES: &str = "*";

/// Type filter meaning "no type narrowing".
pub const ALL_TYPES: &str = "*";

/// Scope of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    /// Tied to a single managed object (device).
    Mo,
    /// Tenant-wide.
    Tenant,
}

impl Context {
    pub fn as_str(self) -> &'static str {
        match self {
            Context::Mo => "mo",
            Context::Tenant => "tenant",
        }
    }
}

/// Notification API a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "*")]
    All,
    #[serde(rename = "alarms")]
    Alarms,
    #[serde(rename = "events")]
    Events,
    #[serde(rename = "measurements")]
    Measurements,
    #[serde(rename = "managedobjects")]
    Inventory,
    #[serde(rename = "operations")]
    Operations,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::All => "*",
            EventType::Alarms => "alarms",
            EventType::Events => "events",
            EventType::Measurements => "measurements",
            EventType::Inventory => "managedobjects",
            EventType::Operations => "operations",
        }
    }

    /// Event types that can be streamed at tenant scope.
    pub fn supports_tenant_context(self) -> bool {
        matches!(
            self,
            EventType::All | EventType::Alarms | EventType::Inventory
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "*" | "all" => Ok(EventType::All),
            "alarms" => Ok(EventType::Alarms),
            "events" => Ok(EventType::Events),
            "measurements" => Ok(EventType::Measurements),
            "managedobjects" | "inventory" => Ok(EventType::Inventory),
            "operations" => Ok(EventType::Operations),
            other => Err(Error::InvalidSubscription(format!(
                "unknown event type '{other}'"
            ))),
        }
    }
}

/// Alarm severity as carried in alarm payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Warning,
}

/// A server-side subscription as returned by the subscription endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Server-assigned identifier.
    pub id: String,
    /// Subscription name (wire field `subscription`).
    #[serde(rename = "subscription")]
    pub name: String,
    pub context: Context,
    #[serde(default)]
    pub subscription_filter: SubscriptionFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragments_to_copy: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub apis: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_filter: Option<String>,
}

/// Managed object a `mo` subscription is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Short-lived streaming credential bound to a subscription name.
///
/// Never persisted; a fresh one is requested for every connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub(crate) fn new(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Lifecycle of one streaming connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    TokenRequested,
    Connecting,
    Open,
    Closing,
    Errored,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_json_deserialization() {
        let json = r#"{
            "id": "4711",
            "subscription": "alarmsOfDevice",
            "context": "mo",
            "subscriptionFilter": {"apis": ["alarms"], "typeFilter": "c8y_HighTemperature"},
            "source": {"id": "16412", "name": "Pump 7", "self": "https://example/inventory/16412"},
            "self": "https://example/notification2/subscriptions/4711"
        }"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.id, "4711");
        assert_eq!(sub.name, "alarmsOfDevice");
        assert_eq!(sub.context, Context::Mo);
        assert_eq!(sub.subscription_filter.apis, vec!["alarms"]);
        assert_eq!(
            sub.subscription_filter.type_filter.as_deref(),
            Some("c8y_HighTemperature")
        );
        let source = sub.source.unwrap();
        assert_eq!(source.id, "16412");
        assert_eq!(source.name.as_deref(), Some("Pump 7"));
        assert!(sub.fragments_to_copy.is_empty());
    }

    #[test]
    fn tenant_subscription_without_source() {
        let json = r#"{"id":"1","subscription":"all","context":"tenant","subscriptionFilter":{"apis":["*"]}}"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.context, Context::Tenant);
        assert!(sub.source.is_none());
    }

    #[test]
    fn event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventType::Inventory).unwrap(),
            r#""managedobjects""#
        );
        assert_eq!(serde_json::to_string(&EventType::All).unwrap(), r#""*""#);
        assert_eq!(EventType::Measurements.as_str(), "measurements");
    }

    #[test]
    fn event_type_from_str() {
        assert_eq!("alarms".parse::<EventType>().unwrap(), EventType::Alarms);
        assert_eq!("Inventory".parse::<EventType>().unwrap(), EventType::Inventory);
        assert_eq!("*".parse::<EventType>().unwrap(), EventType::All);
        assert!(matches!(
            "bogus".parse::<EventType>(),
            Err(Error::InvalidSubscription(_))
        ));
    }

    #[test]
    fn tenant_capable_event_types() {
        assert!(EventType::All.supports_tenant_context());
        assert!(EventType::Alarms.supports_tenant_context());
        assert!(EventType::Inventory.supports_tenant_context());
        assert!(!EventType::Events.supports_tenant_context());
        assert!(!EventType::Measurements.supports_tenant_context());
        assert!(!EventType::Operations.supports_tenant_context());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = Token::new("eyJhbGciOi.secret".to_string());
        assert_eq!(format!("{token:?}"), "Token(<redacted>)");
        assert_eq!(token.as_str(), "eyJhbGciOi.secret");
    }
}
