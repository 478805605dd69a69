//! Subscription configuration.
//!
//! [`SubscriptionBuilder`] derives the subscription [`Context`] from the device
//! and event-type selections. The selections interact with last-write-wins
//! semantics:
//!
//! - selecting all devices switches to tenant context and resets the event type
//!   to [`EventType::All`] unless it is alarms or inventory;
//! - selecting a concrete device switches to managed-object context;
//! - selecting an event type that only exists per device (events,
//!   measurements, operations) forces managed-object context, even when all
//!   devices were selected before.
//!
//! The last rule can leave a managed-object context without a device.
//! [`SubscriptionBuilder::build`] rejects that combination instead of
//! creating a subscription the server would refuse.

use std::fmt;

use crate::Error;
use crate::client::NotificationClient;
use crate::types::{ALL_DEVICES, ALL_TYPES, Context, EventType, Subscription};

/// Validated, immutable subscription definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub name: String,
    pub context: Context,
    pub event_type: EventType,
    /// `None` selects all devices.
    pub device_id: Option<String>,
    /// `None` disables type narrowing.
    pub type_filter: Option<String>,
    /// Delete an existing subscription with the same name before creating.
    pub replace_existing: bool,
}

impl SubscriptionSpec {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidSubscription(
                "subscription name must not be empty".to_string(),
            ));
        }
        match (self.context, self.device_id.as_deref()) {
            (Context::Mo, None) => Err(Error::InvalidSubscription(format!(
                "'{}' subscriptions need a device: select a device after the event type",
                self.event_type
            ))),
            (Context::Tenant, Some(device)) => Err(Error::InvalidSubscription(format!(
                "tenant context cannot be bound to device {device}"
            ))),
            (Context::Tenant, None) if !self.event_type.supports_tenant_context() => {
                Err(Error::InvalidSubscription(format!(
                    "'{}' cannot be subscribed at tenant scope",
                    self.event_type
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Builder for a [`SubscriptionSpec`].
///
/// Defaults: all event types, all devices, tenant context, no type filter,
/// replace an existing subscription of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionBuilder {
    name: String,
    event_type: EventType,
    device_id: Option<String>,
    context: Context,
    type_filter: Option<String>,
    replace_existing: bool,
}

impl SubscriptionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event_type: EventType::All,
            device_id: None,
            context: Context::Tenant,
            type_filter: None,
            replace_existing: true,
        }
    }

    /// Select a device by id, or all devices with [`ALL_DEVICES`].
    #[must_use]
    pub fn with_device(mut self, device_id: impl fmt::Display) -> Self {
        let device_id = device_id.to_string();
        if device_id == ALL_DEVICES {
            self.device_id = None;
            self.context = Context::Tenant;
            if !matches!(self.event_type, EventType::Alarms | EventType::Inventory) {
                self.event_type = EventType::All;
            }
        } else {
            self.device_id = Some(device_id);
            self.context = Context::Mo;
        }
        self
    }

    #[must_use]
    pub fn with_all_devices(self) -> Self {
        self.with_device(ALL_DEVICES)
    }

    #[must_use]
    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        if !event_type.supports_tenant_context() {
            self.context = Context::Mo;
        }
        self
    }

    /// Narrow by fragment type; [`ALL_TYPES`] clears the filter.
    #[must_use]
    pub fn with_type_filter(mut self, type_filter: impl Into<String>) -> Self {
        let type_filter = type_filter.into();
        self.type_filter = (type_filter != ALL_TYPES).then_some(type_filter);
        self
    }

    /// Keep an existing subscription of the same name instead of deleting it
    /// first. Useful when layering several subscriptions under distinct
    /// configurations.
    #[must_use]
    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }

    pub fn context(&self) -> Context {
        self.context
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn type_filter(&self) -> Option<&str> {
        self.type_filter.as_deref()
    }

    pub fn build(self) -> Result<SubscriptionSpec, Error> {
        let spec = SubscriptionSpec {
            name: self.name,
            context: self.context,
            event_type: self.event_type,
            device_id: self.device_id,
            type_filter: self.type_filter,
            replace_existing: self.replace_existing,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Validate and create the subscription server-side (find, delete, create).
    pub async fn initialize(self, client: &NotificationClient) -> Result<Subscription, Error> {
        let spec = self.build()?;
        client.directory().initialize(&spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_EVENT_TYPES: [EventType; 6] = [
        EventType::All,
        EventType::Alarms,
        EventType::Events,
        EventType::Measurements,
        EventType::Inventory,
        EventType::Operations,
    ];

    #[test]
    fn defaults() {
        let b = SubscriptionBuilder::new("sub");
        assert_eq!(b.context(), Context::Tenant);
        assert_eq!(b.event_type(), EventType::All);
        assert_eq!(b.device_id(), None);
        assert_eq!(b.type_filter(), None);
        let spec = b.build().unwrap();
        assert!(spec.replace_existing);
    }

    #[test]
    fn concrete_device_yields_mo_context() {
        for device in ["16412", "1", "abc"] {
            for event_type in ALL_EVENT_TYPES {
                let b = SubscriptionBuilder::new("sub")
                    .with_event_type(event_type)
                    .with_device(device);
                assert_eq!(b.context(), Context::Mo, "device {device}, {event_type}");
                assert_eq!(b.device_id(), Some(device));
            }
        }
    }

    #[test]
    fn numeric_device_id_is_stored_as_string() {
        let b = SubscriptionBuilder::new("sub").with_device(16412);
        assert_eq!(b.device_id(), Some("16412"));
        assert_eq!(b.context(), Context::Mo);
    }

    #[test]
    fn all_devices_yields_tenant_context() {
        for event_type in ALL_EVENT_TYPES {
            let b = SubscriptionBuilder::new("sub")
                .with_device("42")
                .with_event_type(event_type)
                .with_device(ALL_DEVICES);
            assert_eq!(b.context(), Context::Tenant, "{event_type}");
            assert_eq!(b.device_id(), None);
        }
    }

    #[test]
    fn all_devices_keeps_alarms_and_inventory() {
        let b = SubscriptionBuilder::new("sub")
            .with_event_type(EventType::Alarms)
            .with_all_devices();
        assert_eq!(b.event_type(), EventType::Alarms);

        let b = SubscriptionBuilder::new("sub")
            .with_event_type(EventType::Inventory)
            .with_all_devices();
        assert_eq!(b.event_type(), EventType::Inventory);
    }

    #[test]
    fn all_devices_resets_per_device_event_types() {
        for event_type in [
            EventType::Events,
            EventType::Measurements,
            EventType::Operations,
        ] {
            let b = SubscriptionBuilder::new("sub")
                .with_event_type(event_type)
                .with_all_devices();
            assert_eq!(b.event_type(), EventType::All, "{event_type}");
            assert_eq!(b.context(), Context::Tenant);
        }
    }

    #[test]
    fn per_device_event_type_forces_mo_context() {
        for event_type in [
            EventType::Events,
            EventType::Measurements,
            EventType::Operations,
        ] {
            let after_all = SubscriptionBuilder::new("sub")
                .with_all_devices()
                .with_event_type(event_type);
            assert_eq!(after_all.context(), Context::Mo, "{event_type}");

            let after_device = SubscriptionBuilder::new("sub")
                .with_device("7")
                .with_event_type(event_type);
            assert_eq!(after_device.context(), Context::Mo, "{event_type}");
        }
    }

    #[test]
    fn tenant_capable_event_type_keeps_context() {
        let b = SubscriptionBuilder::new("sub").with_event_type(EventType::Alarms);
        assert_eq!(b.context(), Context::Tenant);
        let b = SubscriptionBuilder::new("sub")
            .with_device("7")
            .with_event_type(EventType::Inventory);
        assert_eq!(b.context(), Context::Mo);
    }

    #[test]
    fn event_type_after_all_devices_is_rejected_at_build() {
        let err = SubscriptionBuilder::new("sub")
            .with_all_devices()
            .with_event_type(EventType::Measurements)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSubscription(ref msg) if msg.contains("measurements")));
    }

    #[test]
    fn device_after_event_type_builds() {
        let spec = SubscriptionBuilder::new("sub")
            .with_event_type(EventType::Measurements)
            .with_device("16412")
            .build()
            .unwrap();
        assert_eq!(spec.context, Context::Mo);
        assert_eq!(spec.event_type, EventType::Measurements);
        assert_eq!(spec.device_id.as_deref(), Some("16412"));
    }

    #[test]
    fn type_filter_all_types_clears() {
        let b = SubscriptionBuilder::new("sub").with_type_filter("c8y_HighTemperature");
        assert_eq!(b.type_filter(), Some("c8y_HighTemperature"));
        let b = b.with_type_filter(ALL_TYPES);
        assert_eq!(b.type_filter(), None);
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = SubscriptionBuilder::new("  ").build().unwrap_err();
        assert!(matches!(err, Error::InvalidSubscription(_)));
    }

    #[test]
    fn replace_existing_flag() {
        let spec = SubscriptionBuilder::new("sub")
            .replace_existing(false)
            .build()
            .unwrap();
        assert!(!spec.replace_existing);
    }

    #[test]
    fn hand_built_tenant_spec_with_device_is_invalid() {
        let spec = SubscriptionSpec {
            name: "sub".to_string(),
            context: Context::Tenant,
            event_type: EventType::Alarms,
            device_id: Some("7".to_string()),
            type_filter: None,
            replace_existing: true,
        };
        assert!(spec.validate().is_err());

        let spec = SubscriptionSpec {
            device_id: None,
            event_type: EventType::Operations,
            ..spec
        };
        assert!(spec.validate().is_err());
    }
}
