use tokio_tungstenite::tungstenite;

/// Errors returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The subscription listing endpoint did not answer with a success status,
    /// which usually means Notification 2.0 is not enabled on the tenant.
    #[error(
        "notification service unavailable (status {status}): the Notification 2.0 API does not seem to be installed or active on the server"
    )]
    ServiceUnavailable { status: u16 },

    #[error("subscription deletion failed with status {status}")]
    DeletionFailed { status: u16 },

    #[error("subscription creation failed with status {status} for payload: {payload}")]
    CreationFailed { status: u16, payload: String },

    #[error("token issuance failed with status {status}")]
    TokenIssuanceFailed { status: u16 },

    #[error("malformed notification frame: {0}")]
    MalformedFrame(serde_json::Error),

    #[error("WebSocket error: {0}")]
    Transport(Box<tungstenite::Error>),

    #[error("subscription not initialized: initialize a subscription before requesting a token or opening the stream")]
    NotInitialized,

    #[error("notification stream is already open")]
    AlreadyOpen,

    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::Transport(Box::new(e))
    }
}
