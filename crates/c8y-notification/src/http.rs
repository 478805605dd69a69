use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::Error;
use crate::config::ProviderConfig;

/// Shared HTTP client for the tenant's REST API. Owns the connection pool,
/// base URL and Basic-auth credentials. Clone is a cheap Arc refcount bump.
#[derive(Clone)]
pub(crate) struct HttpClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpClient {
    pub(crate) fn new(config: &ProviderConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timing.request_timeout())
            .build()?;

        let base_url = config.url.trim_end_matches('/').to_string();
        info!(
            base_url = %base_url,
            username = %config.username,
            "http client initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_url,
                username: config.username.clone(),
                password: config.password.clone(),
            }),
        })
    }

    /// Build a Basic-authenticated request.
    ///
    /// `path` is appended to the base URL (e.g. `/notification2/token`).
    pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.inner.base_url);
        self.inner
            .client
            .request(method, url)
            .basic_auth(&self.inner.username, Some(&self.inner.password))
    }
}
