//! Stream management: reader task, dispatcher loop and reconnection.
//!
//! Each connection gets a dedicated reader task that forwards decoded
//! WebSocket frames over a channel. A single dispatcher loop consumes that
//! channel and runs parse, handler and acknowledgment in order, so the handler
//! is never invoked concurrently. The `keep_alive` flag lives in
//! [`StreamLoop`] and is only mutated by the dispatcher, either on transport
//! errors or when a [`Control`] command arrives from the session handle.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info, warn};

use crate::Error;
use crate::client::NotificationClient;
use crate::protocol::parse;
use crate::session::{AckPolicy, NotificationHandler};
use crate::types::{ConnectionState, Subscription, Token};

// ---------------------------------------------------------------------------
// Type aliases for WebSocket split halves
// ---------------------------------------------------------------------------

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub(crate) type WsRead = futures_util::stream::SplitStream<WsStream>;
pub(crate) type WsWrite = futures_util::stream::SplitSink<WsStream, tungstenite::Message>;

// ---------------------------------------------------------------------------
// Messages between the session handle, the reader and the dispatcher
// ---------------------------------------------------------------------------

/// Commands sent by the [`Session`](crate::Session) handle.
#[derive(Debug)]
pub(crate) enum Control {
    Close { keep_alive: bool },
    /// The subscription was deleted server-side; never reopen.
    Unsubscribed,
}

#[derive(Debug)]
enum Inbound {
    Frame(String),
    Error(Error),
    Closed { code: CloseCode, reason: String },
}

/// How a connection ended.
#[derive(Debug)]
enum Ended {
    /// Socket closed with the given close code.
    Closed { code: CloseCode, reason: String },
    /// Token issuance or socket connect failed.
    ConnectFailed,
    /// The session handle is gone; stop without reopening.
    Shutdown,
}

/// Regular closures (1000 normal, 1005 no status) reopen only when
/// `keep_alive` is set; every other code reopens unconditionally.
pub(crate) fn should_reopen(code: CloseCode, keep_alive: bool) -> bool {
    match code {
        CloseCode::Normal | CloseCode::Status => keep_alive,
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Connect
// ---------------------------------------------------------------------------

async fn connect(client: &NotificationClient, token: &Token) -> Result<(WsWrite, WsRead), Error> {
    let url = client.stream_url(token)?;
    let (ws, _resp) = tokio::time::timeout(
        client.timing().request_timeout(),
        tokio_tungstenite::connect_async(url.as_str()),
    )
    .await
    .map_err(|_| Error::Timeout("websocket connect"))??;
    Ok(ws.split())
}

// ---------------------------------------------------------------------------
// Reader task
// ---------------------------------------------------------------------------

async fn read_frames(mut ws_read: WsRead, tx: mpsc::Sender<Inbound>) {
    let mut close: Option<(CloseCode, String)> = None;
    while let Some(frame) = ws_read.next().await {
        let inbound = match frame {
            Ok(tungstenite::Message::Text(text)) => Inbound::Frame(text.as_str().to_string()),
            Ok(tungstenite::Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => Inbound::Frame(text),
                Err(e) => {
                    warn!("Dropping non UTF-8 binary frame: {e}");
                    continue;
                }
            },
            Ok(tungstenite::Message::Close(frame)) => {
                // Keep polling so tungstenite flushes its close reply; the
                // stream ends right after.
                close = Some(frame.map_or((CloseCode::Status, String::new()), |f| {
                    (f.code, f.reason.as_str().to_string())
                }));
                continue;
            }
            Ok(_) => continue,
            Err(e) if close.is_some() => {
                debug!("Error after close frame: {e}");
                break;
            }
            Err(e) => Inbound::Error(e.into()),
        };
        let is_error = matches!(inbound, Inbound::Error(_));
        if tx.send(inbound).await.is_err() || is_error {
            return;
        }
    }

    let (code, reason) = close.unwrap_or((CloseCode::Abnormal, String::new()));
    let _ = tx.send(Inbound::Closed { code, reason }).await;
}

// ---------------------------------------------------------------------------
// Stream loop
// ---------------------------------------------------------------------------

pub(crate) struct StreamLoop<H> {
    pub client: NotificationClient,
    /// `None` once the session unsubscribed.
    pub subscription: Option<Subscription>,
    pub handler: H,
    pub ack_policy: AckPolicy,
    pub keep_alive: bool,
    pub state_tx: watch::Sender<ConnectionState>,
}

impl<H: NotificationHandler> StreamLoop<H> {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn subscription_name(&self) -> &str {
        self.subscription.as_ref().map_or("-", |s| s.name.as_str())
    }

    fn forget_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            info!(
                subscription = %subscription.name,
                "Subscription removed, the stream will not be reopened"
            );
        }
    }

    /// Parse, hand to the handler, then acknowledge. Parse and send failures
    /// leave the frame unacknowledged so the server redelivers it.
    async fn process(&mut self, ws_write: &mut WsWrite, raw: &str) {
        debug!(len = raw.len(), "notification received");
        let frame = match parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to parse notification, leaving it for redelivery: {e}");
                return;
            }
        };

        let handled = match self.handler.handle(&frame).await {
            Ok(()) => true,
            Err(e) => {
                warn!(ack = ?frame.ack_header, "Notification handler failed: {e}");
                false
            }
        };
        if !handled && self.ack_policy == AckPolicy::OnSuccess {
            return;
        }

        let Some(ack) = frame.ack_header.as_deref() else {
            debug!("notification without ack header");
            return;
        };
        debug!(ack, "acknowledging notification");
        if let Err(e) = ws_write.send(tungstenite::Message::text(ack.to_owned())).await {
            warn!(ack, "Failed to acknowledge notification, it will be redelivered: {e}");
        }
    }

    async fn dispatch(
        &mut self,
        mut ws_write: WsWrite,
        ws_read: WsRead,
        control_rx: &mut mpsc::Receiver<Control>,
    ) -> Ended {
        let capacity = self.client.timing().frame_channel_capacity.max(1);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(capacity);
        let reader = tokio::spawn(read_frames(ws_read, inbound_tx));

        let mut close_deadline: Option<Instant> = None;
        let mut shutdown = false;

        let ended = loop {
            tokio::select! {
                inbound = inbound_rx.recv() => match inbound {
                    Some(Inbound::Frame(raw)) => self.process(&mut ws_write, &raw).await,
                    Some(Inbound::Error(e)) if close_deadline.is_some() => {
                        debug!("WebSocket error while closing: {e}");
                        break Ended::Closed { code: CloseCode::Normal, reason: String::new() };
                    }
                    Some(Inbound::Error(e)) => {
                        warn!("WebSocket error, terminating connection: {e}");
                        self.set_state(ConnectionState::Errored);
                        self.keep_alive = true;
                        break Ended::Closed { code: CloseCode::Abnormal, reason: e.to_string() };
                    }
                    Some(Inbound::Closed { code, reason }) => break Ended::Closed { code, reason },
                    None => break Ended::Closed { code: CloseCode::Abnormal, reason: String::new() },
                },

                cmd = control_rx.recv(), if close_deadline.is_none() => {
                    let keep_alive = match cmd {
                        Some(Control::Close { keep_alive }) => keep_alive,
                        Some(Control::Unsubscribed) => {
                            self.forget_subscription();
                            continue;
                        }
                        None => {
                            shutdown = true;
                            false
                        }
                    };
                    info!(keep_alive, "Closing notification stream");
                    self.keep_alive = keep_alive;
                    self.set_state(ConnectionState::Closing);
                    let close = tungstenite::Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: String::new().into(),
                    }));
                    if let Err(e) = ws_write.send(close).await {
                        debug!("Failed to send close frame: {e}");
                        break Ended::Closed { code: CloseCode::Normal, reason: String::new() };
                    }
                    close_deadline = Some(Instant::now() + self.client.timing().close_timeout());
                }

                _ = tokio::time::sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                    warn!("Close handshake timed out");
                    break Ended::Closed {
                        code: CloseCode::Normal,
                        reason: "close handshake timed out".to_string(),
                    };
                }
            }
        };

        reader.abort();
        if shutdown { Ended::Shutdown } else { ended }
    }
}

/// Drive one logical stream until it is closed without keep-alive, the
/// session handle is dropped, or reconnection gives up.
///
/// `initial_token` is used for the first connection; every reconnection
/// requests a fresh one.
pub(crate) async fn run_stream<H: NotificationHandler>(
    mut p: StreamLoop<H>,
    mut initial_token: Option<Token>,
    mut control_rx: mpsc::Receiver<Control>,
) {
    let mut failures: u32 = 0;
    let max_attempts = p.client.timing().max_reconnect_attempts;

    loop {
        let token = match initial_token.take() {
            Some(token) => Ok(token),
            None => {
                p.set_state(ConnectionState::TokenRequested);
                match &p.subscription {
                    Some(subscription) => p.client.token_issuer().issue(subscription).await,
                    None => Err(Error::NotInitialized),
                }
            }
        };

        let connected = match token {
            Ok(token) => {
                p.set_state(ConnectionState::Connecting);
                connect(&p.client, &token).await
            }
            Err(e) => Err(e),
        };

        let ended = match connected {
            Ok((ws_write, ws_read)) => {
                failures = 0;
                p.set_state(ConnectionState::Open);
                info!(subscription = p.subscription_name(), "Notification stream open");
                p.dispatch(ws_write, ws_read, &mut control_rx).await
            }
            Err(e) => {
                failures += 1;
                warn!(
                    subscription = p.subscription_name(),
                    attempt = failures,
                    "Failed to open notification stream: {e}"
                );
                p.set_state(ConnectionState::Errored);
                Ended::ConnectFailed
            }
        };

        let reopen = match &ended {
            Ended::Closed { code, reason } => {
                info!(
                    code = u16::from(*code),
                    reason = %reason,
                    keep_alive = p.keep_alive,
                    "Notification stream closed"
                );
                should_reopen(*code, p.keep_alive)
            }
            Ended::ConnectFailed => {
                if max_attempts > 0 && failures >= max_attempts {
                    error!(
                        subscription = p.subscription_name(),
                        "Giving up after {failures} failed connection attempts"
                    );
                    false
                } else {
                    true
                }
            }
            Ended::Shutdown => false,
        };
        p.set_state(ConnectionState::Closed);
        if !reopen {
            return;
        }
        if p.subscription.is_none() {
            warn!("Not reopening notification stream: {}", Error::NotInitialized);
            return;
        }

        // Throttle reopening; a close without keep-alive cancels it.
        let deadline = Instant::now() + p.client.timing().reconnect_delay();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                cmd = control_rx.recv() => match cmd {
                    Some(Control::Close { keep_alive: true }) => p.keep_alive = true,
                    Some(Control::Close { keep_alive: false }) | None => {
                        info!("Close requested while reconnecting");
                        p.keep_alive = false;
                        return;
                    }
                    Some(Control::Unsubscribed) => {
                        p.forget_subscription();
                        warn!("Not reopening notification stream: {}", Error::NotInitialized);
                        return;
                    }
                },
            }
        }
        info!(subscription = p.subscription_name(), "Reopening notification stream");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_close_without_keep_alive_stays_closed() {
        assert!(!should_reopen(CloseCode::Normal, false));
        assert!(!should_reopen(CloseCode::Status, false));
    }

    #[test]
    fn regular_close_with_keep_alive_reopens() {
        assert!(should_reopen(CloseCode::Normal, true));
        assert!(should_reopen(CloseCode::Status, true));
    }

    #[test]
    fn abnormal_close_always_reopens() {
        for code in [
            CloseCode::Abnormal,
            CloseCode::Away,
            CloseCode::Error,
            CloseCode::Policy,
            CloseCode::Restart,
            CloseCode::Library(4001),
        ] {
            assert!(should_reopen(code, false), "{}", u16::from(code));
            assert!(should_reopen(code, true), "{}", u16::from(code));
        }
    }

    #[test]
    fn close_code_numbers() {
        assert_eq!(u16::from(CloseCode::Normal), 1000);
        assert_eq!(u16::from(CloseCode::Status), 1005);
        assert_eq!(u16::from(CloseCode::Abnormal), 1006);
        assert!(should_reopen(CloseCode::from(1006), false));
        assert!(!should_reopen(CloseCode::from(1000), false));
    }
}
