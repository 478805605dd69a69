//! Streaming session handle: open, close and unsubscribe.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Error;
use crate::client::NotificationClient;
use crate::connection::{Control, StreamLoop, run_stream};
use crate::protocol::NotificationFrame;
use crate::types::{BoxError, ConnectionState, Subscription};

/// Receives every successfully parsed notification.
///
/// Invocations are strictly sequential per session. Any closure of the form
/// `FnMut(&NotificationFrame) -> Result<(), BoxError>` is a handler.
#[async_trait]
pub trait NotificationHandler: Send {
    async fn handle(&mut self, frame: &NotificationFrame) -> Result<(), BoxError>;
}

#[async_trait]
impl<F> NotificationHandler for F
where
    F: FnMut(&NotificationFrame) -> Result<(), BoxError> + Send,
{
    async fn handle(&mut self, frame: &NotificationFrame) -> Result<(), BoxError> {
        self(frame)
    }
}

/// When a frame carrying an ack header is acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckPolicy {
    /// Acknowledge after the handler returns, whatever its outcome.
    #[default]
    Always,
    /// Acknowledge only when the handler succeeds; failures are redelivered.
    OnSuccess,
}

struct StreamHandle {
    control_tx: mpsc::Sender<Control>,
    task: JoinHandle<()>,
}

/// One streaming session bound to an initialized subscription.
///
/// Dropping the session closes the stream without reopening it.
pub struct Session {
    client: NotificationClient,
    subscription: Option<Subscription>,
    stream: Option<StreamHandle>,
    state_rx: watch::Receiver<ConnectionState>,
    ack_policy: AckPolicy,
}

impl Session {
    pub(crate) fn new(client: NotificationClient, subscription: Subscription) -> Self {
        let (_, state_rx) = watch::channel(ConnectionState::Idle);
        Self {
            client,
            subscription: Some(subscription),
            stream: None,
            state_rx,
            ack_policy: AckPolicy::default(),
        }
    }

    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    /// The bound subscription, `None` after [`Self::unsubscribe`].
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state transitions of the current stream.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Request a token and open the stream, delivering frames to `handler`.
    ///
    /// Fails if the subscription was removed, a stream is already running,
    /// or the first token cannot be issued. Later connection failures are
    /// retried in the background.
    pub async fn open<H>(&mut self, handler: H) -> Result<(), Error>
    where
        H: NotificationHandler + 'static,
    {
        let Some(subscription) = self.subscription.clone() else {
            return Err(Error::NotInitialized);
        };
        if self
            .stream
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
        {
            return Err(Error::AlreadyOpen);
        }

        let (state_tx, state_rx) = watch::channel(ConnectionState::TokenRequested);
        self.state_rx = state_rx;

        let token = match self.client.token_issuer().issue(&subscription).await {
            Ok(token) => token,
            Err(e) => {
                state_tx.send_replace(ConnectionState::Closed);
                return Err(e);
            }
        };

        info!(subscription = %subscription.name, "Opening notification stream");
        let (control_tx, control_rx) = mpsc::channel(4);
        let task = tokio::spawn(run_stream(
            StreamLoop {
                client: self.client.clone(),
                subscription: Some(subscription),
                handler,
                ack_policy: self.ack_policy,
                keep_alive: false,
                state_tx,
            },
            Some(token),
            control_rx,
        ));
        self.stream = Some(StreamHandle { control_tx, task });
        Ok(())
    }

    /// Close the stream. With `keep_alive` the stream is reopened with a
    /// fresh token after the close completes; without it this waits for the
    /// stream task to finish. No-op when nothing is open.
    pub async fn close(&mut self, keep_alive: bool) {
        let Some(stream) = &self.stream else {
            debug!("close requested without an open stream");
            return;
        };
        if stream
            .control_tx
            .send(Control::Close { keep_alive })
            .await
            .is_err()
        {
            debug!("notification stream already finished");
            self.stream = None;
            return;
        }
        if !keep_alive {
            self.closed().await;
        }
    }

    /// Wait for the stream task to finish, either after a close without
    /// keep-alive or once reconnection gives up.
    pub async fn closed(&mut self) {
        let Some(stream) = &mut self.stream else {
            return;
        };
        let joined = (&mut stream.task).await;
        self.stream = None;
        if let Err(e) = joined {
            warn!(error = %e, "notification stream task failed");
        }
    }

    /// Delete the subscription on the server. A subscription that is already
    /// gone counts as success, and calling this again is a no-op. A running
    /// stream keeps its socket until [`Self::close`] but is never reopened.
    pub async fn unsubscribe(&mut self) -> Result<(), Error> {
        let Some(subscription) = &self.subscription else {
            debug!("unsubscribe without subscription");
            return Ok(());
        };
        self.client.directory().remove(subscription).await?;
        info!(id = %subscription.id, name = %subscription.name, "Unsubscribed");
        self.subscription = None;
        let Some(stream) = &self.stream else {
            return Ok(());
        };
        if stream.control_tx.send(Control::Unsubscribed).await.is_err() {
            debug!("notification stream already finished");
        }
        Ok(())
    }
}
