//! Cumulocity IoT Notification 2.0 client.
//!
//! Manages named subscriptions over REST and consumes their notifications
//! over a WebSocket stream.
//!
//! # Features
//! - Paginated subscription search, creation and idempotent deletion
//! - Fluent [`SubscriptionBuilder`] with context and API normalization
//! - Per-connection token issuance
//! - Sequential handler invocation with acknowledgment after handling
//! - Reconnection driven by close codes and an explicit keep-alive flag
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), c8y_notification::Error> {
//! use c8y_notification::{
//!     BoxError, EventType, NotificationClient, NotificationFrame, ProviderConfig,
//! };
//!
//! let client = NotificationClient::new(ProviderConfig::from_env()?)?;
//! let subscription = client
//!     .subscription("pumpAlarms")
//!     .with_device(16412)
//!     .with_event_type(EventType::Alarms)
//!     .initialize(&client)
//!     .await?;
//!
//! let mut session = client.session(subscription);
//! session
//!     .open(|frame: &NotificationFrame| -> Result<(), BoxError> {
//!         println!("{}", frame.payload);
//!         Ok(())
//!     })
//!     .await?;
//! session.closed().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod client;
pub mod config;
mod connection;
mod directory;
mod error;
mod http;
pub mod protocol;
mod session;
mod token;
mod types;

pub use builder::{SubscriptionBuilder, SubscriptionSpec};
pub use client::NotificationClient;
pub use config::{ProviderConfig, TimingConfig};
pub use directory::DirectoryClient;
pub use error::Error;
pub use protocol::NotificationFrame;
pub use session::{AckPolicy, NotificationHandler, Session};
pub use token::TokenIssuer;
pub use types::{
    ALL_DEVICES, ALL_TYPES, BoxError, ConnectionState, Context, EventType, Severity, Source,
    Subscription, SubscriptionFilter, Token,
};
