use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;
use crate::http::HttpClient;
use crate::protocol::TOKEN_PATH;
use crate::types::{Subscription, Token};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    subscriber: &'a str,
    subscription: &'a str,
    expires_in_minutes: u32,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Exchanges a subscription for a short-lived streaming token.
#[derive(Clone)]
pub struct TokenIssuer {
    http: HttpClient,
    subscriber: String,
    expires_in_minutes: u32,
}

impl TokenIssuer {
    pub(crate) fn new(http: HttpClient, subscriber: String, expires_in_minutes: u32) -> Self {
        Self {
            http,
            subscriber,
            expires_in_minutes,
        }
    }

    pub async fn issue(&self, subscription: &Subscription) -> Result<Token, Error> {
        let body = TokenRequest {
            subscriber: &self.subscriber,
            subscription: &subscription.name,
            expires_in_minutes: self.expires_in_minutes,
        };
        let resp = self
            .http
            .request(Method::POST, TOKEN_PATH)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::TokenIssuanceFailed {
                status: status.as_u16(),
            });
        }

        let TokenResponse { token } = resp.json().await?;
        debug!(
            subscription = %subscription.name,
            expires_in_minutes = self.expires_in_minutes,
            "token issued"
        );
        Ok(Token::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_request_json_shape() {
        let body = TokenRequest {
            subscriber: "wmioSubscriber",
            subscription: "alarms",
            expires_in_minutes: 1,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "subscriber": "wmioSubscriber",
                "subscription": "alarms",
                "expiresInMinutes": 1
            })
        );
    }

    #[test]
    fn token_response_ignores_extra_fields() {
        let resp: TokenResponse =
            serde_json::from_str(r#"{"token":"eyJ.abc","self":"x"}"#).unwrap();
        assert_eq!(resp.token, "eyJ.abc");
    }
}
