//! Subscription management endpoint: search, create and delete.

use reqwest::{Method, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Error;
use crate::builder::SubscriptionSpec;
use crate::http::HttpClient;
use crate::protocol::{SUBSCRIPTION_MEDIA_TYPE, SUBSCRIPTIONS_PATH};
use crate::types::{Context, Subscription};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SubscriptionPage {
    #[serde(default)]
    subscriptions: Vec<serde_json::Value>,
    #[serde(default)]
    statistics: Option<PageStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageStatistics {
    total_pages: Option<u32>,
}

impl SubscriptionPage {
    fn total_pages(&self) -> u32 {
        self.statistics
            .as_ref()
            .and_then(|s| s.total_pages)
            .unwrap_or(1)
    }

    /// Entries are matched on the raw JSON so that unrelated entries with an
    /// unexpected shape do not fail the search.
    fn find(&self, name: &str) -> Result<Option<Subscription>, Error> {
        let Some(entry) = self.subscriptions.iter().find(|s| {
            s.get("subscription").and_then(serde_json::Value::as_str) == Some(name)
        }) else {
            return Ok(None);
        };
        Subscription::deserialize(entry)
            .map(Some)
            .map_err(|e| {
                Error::UnexpectedResponse(format!("subscription '{name}' has unexpected shape: {e}"))
            })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSubscription<'a> {
    context: Context,
    subscription: &'a str,
    subscription_filter: CreateFilter<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<SourceRef<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateFilter<'a> {
    apis: [&'static str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    type_filter: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SourceRef<'a> {
    id: &'a str,
}

impl<'a> From<&'a SubscriptionSpec> for CreateSubscription<'a> {
    fn from(spec: &'a SubscriptionSpec) -> Self {
        Self {
            context: spec.context,
            subscription: &spec.name,
            subscription_filter: CreateFilter {
                apis: [spec.event_type.as_str()],
                type_filter: spec.type_filter.as_deref(),
            },
            source: spec.device_id.as_deref().map(|id| SourceRef { id }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for `/notification2/subscriptions`.
#[derive(Clone)]
pub struct DirectoryClient {
    http: HttpClient,
    page_size: u32,
}

impl DirectoryClient {
    pub(crate) fn new(http: HttpClient, page_size: u32) -> Self {
        Self { http, page_size }
    }

    /// Find a subscription by exact name, walking pages until the reported
    /// total page count is reached.
    pub async fn find(&self, name: &str) -> Result<Option<Subscription>, Error> {
        let mut current_page: u32 = 1;
        loop {
            debug!(name, current_page, "searching for subscription");
            let resp = self
                .http
                .request(Method::GET, SUBSCRIPTIONS_PATH)
                .query(&[
                    ("pageSize", self.page_size.to_string()),
                    ("withTotalPages", "true".to_string()),
                    ("currentPage", current_page.to_string()),
                ])
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                debug!(name, current_page, %status, "subscription search returned unexpected status");
                return Err(Error::ServiceUnavailable {
                    status: status.as_u16(),
                });
            }

            let page: SubscriptionPage = resp.json().await?;
            if let Some(found) = page.find(name)? {
                debug!(name, current_page, id = %found.id, "found subscription");
                return Ok(Some(found));
            }

            if current_page >= page.total_pages() {
                debug!(name, pages = current_page, "subscription not found");
                return Ok(None);
            }
            current_page += 1;
        }
    }

    /// Issue the delete request and return the raw status.
    ///
    /// `204` means deleted and `404` means already gone; see [`Self::remove`].
    pub async fn delete(&self, subscription: &Subscription) -> Result<StatusCode, Error> {
        let path = format!("{SUBSCRIPTIONS_PATH}/{}", subscription.id);
        info!(id = %subscription.id, name = %subscription.name, "deleting subscription");
        let resp = self.http.request(Method::DELETE, &path).send().await?;
        Ok(resp.status())
    }

    /// Delete and treat "already gone" as success.
    pub async fn remove(&self, subscription: &Subscription) -> Result<(), Error> {
        let status = self.delete(subscription).await?;
        ensure_deleted(status)
    }

    pub async fn create(&self, spec: &SubscriptionSpec) -> Result<Subscription, Error> {
        let payload = CreateSubscription::from(spec);
        let resp = self
            .http
            .request(Method::POST, SUBSCRIPTIONS_PATH)
            .header(header::ACCEPT, SUBSCRIPTION_MEDIA_TYPE)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::CREATED {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, name = %spec.name, "subscription creation rejected: {body}");
            return Err(Error::CreationFailed {
                status: status.as_u16(),
                payload: serde_json::to_string(&payload).unwrap_or_default(),
            });
        }

        Ok(resp.json().await?)
    }

    /// Find, delete and recreate, so exactly one subscription with this
    /// definition exists under its name. With `replace_existing` off the
    /// search and delete are skipped.
    pub async fn initialize(&self, spec: &SubscriptionSpec) -> Result<Subscription, Error> {
        if spec.replace_existing {
            info!(name = %spec.name, "searching existing subscription");
            if let Some(existing) = self.find(&spec.name).await? {
                self.remove(&existing).await?;
            }
        }

        info!(
            name = %spec.name,
            context = spec.context.as_str(),
            api = spec.event_type.as_str(),
            device = spec.device_id.as_deref().unwrap_or("*"),
            "creating subscription"
        );
        let created = self.create(spec).await?;
        info!(id = %created.id, name = %created.name, "subscription created");
        Ok(created)
    }
}

pub(crate) fn ensure_deleted(status: StatusCode) -> Result<(), Error> {
    match status {
        StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(()),
        other => Err(Error::DeletionFailed {
            status: other.as_u16(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SubscriptionBuilder;
    use crate::types::{ALL_DEVICES, ALL_TYPES, EventType};

    fn payload(spec: &SubscriptionSpec) -> serde_json::Value {
        serde_json::to_value(CreateSubscription::from(spec)).unwrap()
    }

    #[test]
    fn payload_for_all_devices_omits_source_and_type_filter() {
        let spec = SubscriptionBuilder::new("tenantAlarms")
            .with_event_type(EventType::Alarms)
            .with_device(ALL_DEVICES)
            .with_type_filter(ALL_TYPES)
            .build()
            .unwrap();
        assert_eq!(
            payload(&spec),
            serde_json::json!({
                "context": "tenant",
                "subscription": "tenantAlarms",
                "subscriptionFilter": {"apis": ["alarms"]}
            })
        );
    }

    #[test]
    fn payload_for_device_with_type_filter() {
        let spec = SubscriptionBuilder::new("pump")
            .with_event_type(EventType::Measurements)
            .with_device(16412)
            .with_type_filter("c8y_Temperature")
            .build()
            .unwrap();
        assert_eq!(
            payload(&spec),
            serde_json::json!({
                "context": "mo",
                "subscription": "pump",
                "subscriptionFilter": {"apis": ["measurements"], "typeFilter": "c8y_Temperature"},
                "source": {"id": "16412"}
            })
        );
    }

    #[test]
    fn payload_for_all_apis() {
        let spec = SubscriptionBuilder::new("everything").build().unwrap();
        assert_eq!(
            payload(&spec)["subscriptionFilter"]["apis"],
            serde_json::json!(["*"])
        );
    }

    #[test]
    fn ensure_deleted_statuses() {
        assert!(ensure_deleted(StatusCode::NO_CONTENT).is_ok());
        assert!(ensure_deleted(StatusCode::NOT_FOUND).is_ok());
        assert!(matches!(
            ensure_deleted(StatusCode::FORBIDDEN),
            Err(Error::DeletionFailed { status: 403 })
        ));
        assert!(matches!(
            ensure_deleted(StatusCode::OK),
            Err(Error::DeletionFailed { status: 200 })
        ));
    }

    #[test]
    fn page_find_matches_exact_name_only() {
        let page: SubscriptionPage = serde_json::from_value(serde_json::json!({
            "subscriptions": [
                {"id": "1", "subscription": "alarms-2", "context": "tenant"},
                {"id": "2", "subscription": "odd entry without context"},
                {"id": "3", "subscription": "alarms", "context": "tenant",
                 "subscriptionFilter": {"apis": ["alarms"]}}
            ],
            "statistics": {"totalPages": 4, "currentPage": 1, "pageSize": 2}
        }))
        .unwrap();
        assert_eq!(page.total_pages(), 4);
        let found = page.find("alarms").unwrap().unwrap();
        assert_eq!(found.id, "3");
        assert!(page.find("missing").unwrap().is_none());
    }

    #[test]
    fn page_without_statistics_is_single_page() {
        let page: SubscriptionPage =
            serde_json::from_value(serde_json::json!({"subscriptions": []})).unwrap();
        assert_eq!(page.total_pages(), 1);
    }
}
