use crate::Error;
use crate::builder::SubscriptionBuilder;
use crate::config::{ProviderConfig, TimingConfig};
use crate::directory::DirectoryClient;
use crate::http::HttpClient;
use crate::protocol::{build_stream_url, streaming_base};
use crate::session::Session;
use crate::token::TokenIssuer;
use crate::types::{Subscription, Token};

/// Entry point bundling the subscription directory, the token issuer and the
/// streaming endpoint of one tenant. Clone is cheap.
#[derive(Clone)]
pub struct NotificationClient {
    directory: DirectoryClient,
    issuer: TokenIssuer,
    streaming_base: String,
    timing: TimingConfig,
}

impl NotificationClient {
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        config.validate()?;
        let http = HttpClient::new(&config)?;
        let streaming_base = streaming_base(config.streaming_url.as_deref().unwrap_or(&config.url));
        Ok(Self {
            directory: DirectoryClient::new(http.clone(), config.timing.page_size),
            issuer: TokenIssuer::new(http, config.subscriber, config.timing.token_expiry_minutes),
            streaming_base,
            timing: config.timing,
        })
    }

    pub fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    pub fn token_issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Start configuring a subscription named `name`.
    pub fn subscription(&self, name: impl Into<String>) -> SubscriptionBuilder {
        SubscriptionBuilder::new(name)
    }

    /// Create a streaming session for an initialized subscription.
    pub fn session(&self, subscription: Subscription) -> Session {
        Session::new(self.clone(), subscription)
    }

    pub(crate) fn stream_url(&self, token: &Token) -> Result<url::Url, Error> {
        build_stream_url(&self.streaming_base, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_uses_provider_url_by_default() {
        let client = NotificationClient::new(ProviderConfig::new(
            "https://example.cumulocity.com",
            "alice",
            "s3cret",
        ))
        .unwrap();
        let url = client.stream_url(&Token::new("tok".to_string())).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://example.cumulocity.com/notification2/consumer/?token=tok"
        );
    }

    #[test]
    fn stream_url_honours_streaming_override() {
        let mut config = ProviderConfig::new("https://example.cumulocity.com", "alice", "s3cret");
        config.streaming_url = Some("ws://127.0.0.1:9100".to_string());
        let client = NotificationClient::new(config).unwrap();
        let url = client.stream_url(&Token::new("tok".to_string())).unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:9100/notification2/consumer/?token=tok"
        );
    }

    #[test]
    fn plain_http_provider_still_streams_over_wss() {
        let client = NotificationClient::new(ProviderConfig::new(
            "http://tenant.example.com",
            "alice",
            "s3cret",
        ))
        .unwrap();
        let url = client.stream_url(&Token::new("tok".to_string())).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://tenant.example.com/notification2/consumer/?token=tok"
        );
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = NotificationClient::new(ProviderConfig::new("::", "alice", "s3cret"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
