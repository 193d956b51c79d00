//! Push channel to the backend
//!
//! One connection per backend session at `ws(s)://<host>/ws/app/<session_id>/`.
//! A background task owns the socket:
//! - sends a `ping` every heartbeat period while open
//! - decodes incoming frames and forwards them as `WsEvent`s
//! - reconnects after a fixed delay until the attempt limit is hit
//!
//! Connection state is published on a `watch` channel; `disconnect` (or
//! dropping the manager) cancels the task and any pending reconnect.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WebSocketConfig;
use crate::protocol::{ClientMessage, CommandStatus, ServerMessage, YoutubeCommand};
use crate::state::ConnectionState;
use crate::voice::Notifier;

pub const STATUS_IDLE: &str = "waiting for voice commands";
pub const STATUS_BUSY: &str = "processing voice command";
pub const STATUS_MEDIA: &str = "processing media command";

/// Something the front end or auth layer should react to
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    Connected,
    Disconnected,
    VoiceCommand { command: String },
    YoutubeCommand { command: YoutubeCommand },
}

/// Build the channel URL from the REST base URL
pub fn ws_url(base_url: &str, session_id: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/ws/app/{session_id}/")
}

struct Connection {
    session_id: String,
    cancel: CancellationToken,
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    handle: JoinHandle<()>,
}

/// Owns the push channel task
pub struct WsManager {
    base_url: String,
    config: WebSocketConfig,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<WsEvent>,
    connection: Mutex<Option<Connection>>,
}

impl WsManager {
    /// Create the manager and the receiver its events arrive on
    pub fn new(
        base_url: &str,
        config: WebSocketConfig,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, mpsc::UnboundedReceiver<WsEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let manager = Self {
            base_url: base_url.to_string(),
            config,
            notifier,
            state,
            events,
            connection: Mutex::new(None),
        };
        (manager, rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Start the channel for `session_id`; no-op if it is already running
    pub fn connect(&self, session_id: &str) {
        let Ok(mut slot) = self.connection.lock() else {
            error!("websocket connection lock poisoned");
            return;
        };

        if let Some(conn) = slot.as_ref() {
            if conn.session_id == session_id && !conn.handle.is_finished() {
                debug!(session_id, "websocket already running");
                return;
            }
        }
        if let Some(old) = slot.take() {
            old.cancel.cancel();
        }

        let url = ws_url(&self.base_url, session_id);
        info!(url = %url, "starting websocket");

        let cancel = CancellationToken::new();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            url,
            config: self.config.clone(),
            notifier: Arc::clone(&self.notifier),
            state: self.state.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run(outgoing_rx));

        *slot = Some(Connection {
            session_id: session_id.to_string(),
            cancel,
            outgoing,
            handle,
        });
    }

    /// Stop the channel and any pending reconnect
    pub fn disconnect(&self) {
        let conn = self.connection.lock().ok().and_then(|mut slot| slot.take());
        if let Some(conn) = conn {
            info!(session_id = %conn.session_id, "closing websocket");
            conn.cancel.cancel();
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Confirm that the user was alerted about a voice call
    pub fn send_voice_command_ack(&self) -> bool {
        self.send(ClientMessage::voice_call_confirmation())
    }

    pub fn send_youtube_command_ack(&self, status: CommandStatus) -> bool {
        self.send(ClientMessage::youtube_ack(status))
    }

    /// Report a media command the app ran on its own
    pub fn send_youtube_command_report(&self, command: YoutubeCommand, status: CommandStatus) -> bool {
        self.send(ClientMessage::youtube_report(command.as_str(), status))
    }

    fn send(&self, msg: ClientMessage) -> bool {
        if !self.is_connected() {
            warn!(?msg, "websocket not connected, dropping message");
            return false;
        }
        let Ok(slot) = self.connection.lock() else {
            return false;
        };
        match slot.as_ref() {
            Some(conn) => conn.outgoing.send(msg).is_ok(),
            None => false,
        }
    }
}

impl Drop for WsManager {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.connection.lock() {
            if let Some(conn) = slot.take() {
                conn.cancel.cancel();
            }
        }
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a connected session ended
enum SessionEnd {
    Cancelled,
    Closed,
}

struct Worker {
    url: String,
    config: WebSocketConfig,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<WsEvent>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, mut outgoing: mpsc::UnboundedReceiver<ClientMessage>) {
        let mut attempt: u32 = 0;
        self.state.send_replace(ConnectionState::Connecting);

        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = connect_async(self.url.as_str()) => result,
            };

            match result {
                Ok((socket, _)) => {
                    info!(url = %self.url, "websocket connected");
                    attempt = 0;
                    self.state.send_replace(ConnectionState::Connected);
                    let _ = self.events.send(WsEvent::Connected);
                    self.notifier.set_status(STATUS_IDLE);

                    let end = self.session(socket, &mut outgoing).await;
                    let _ = self.events.send(WsEvent::Disconnected);
                    if matches!(end, SessionEnd::Cancelled) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "websocket connect failed");
                    let _ = self.events.send(WsEvent::Disconnected);
                }
            }

            attempt += 1;
            if attempt > self.config.max_reconnect_attempts {
                error!(attempts = attempt - 1, "giving up on websocket");
                break;
            }
            self.state.send_replace(ConnectionState::Reconnecting { attempt });
            debug!(attempt, "reconnecting websocket");

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(self.config.reconnect_delay_secs)) => {}
            }
        }

        // A cancelled worker may already have been replaced by a newer one
        if !self.cancel.is_cancelled() {
            self.state.send_replace(ConnectionState::Disconnected);
        }
        debug!("websocket task finished");
    }

    async fn session(&self, socket: Socket, outgoing: &mut mpsc::UnboundedReceiver<ClientMessage>) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();
        let period = self.config.heartbeat_period();
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut status_reset: Option<JoinHandle<()>> = None;

        let end = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break SessionEnd::Cancelled;
                }
                Some(msg) = outgoing.recv() => {
                    if let Err(e) = send_json(&mut sink, &msg).await {
                        warn!(error = %e, "websocket send failed");
                        break SessionEnd::Closed;
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = send_json(&mut sink, &ClientMessage::ping()).await {
                        warn!(error = %e, "heartbeat failed");
                        break SessionEnd::Closed;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(msg) => {
                                if let Some(handle) = self.forward(msg) {
                                    if let Some(previous) = status_reset.replace(handle) {
                                        previous.abort();
                                    }
                                }
                            }
                            Err(e) => warn!(error = %e, "unparseable websocket message"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "websocket closed by server");
                        break SessionEnd::Closed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket error");
                        break SessionEnd::Closed;
                    }
                    None => break SessionEnd::Closed,
                },
            }
        };

        if let Some(handle) = status_reset {
            handle.abort();
        }
        end
    }

    /// Route a decoded message; returns the status-reset timer when one was armed
    fn forward(&self, msg: ServerMessage) -> Option<JoinHandle<()>> {
        match msg {
            ServerMessage::ConnectionEstablished { message, user, .. } => {
                info!(%message, user = ?user.map(|u| u.login_id), "websocket session established");
                None
            }
            ServerMessage::VoiceCommand { command, .. } => {
                self.notifier.set_status(STATUS_BUSY);
                let _ = self.events.send(WsEvent::VoiceCommand { command });
                Some(self.reset_status_later())
            }
            ServerMessage::YoutubeCommand { command, .. } => {
                self.notifier.set_status(STATUS_MEDIA);
                let _ = self.events.send(WsEvent::YoutubeCommand { command });
                Some(self.reset_status_later())
            }
            ServerMessage::VoiceCallConfirmationAck { confirmed, message } => {
                debug!(confirmed, %message, "voice call ack");
                None
            }
            ServerMessage::YoutubeCommandConfirmationAck { success, message } => {
                debug!(success, %message, "youtube command ack");
                None
            }
            ServerMessage::YoutubeCommandReportAck { confirmed, message } => {
                debug!(confirmed, %message, "youtube report ack");
                None
            }
            ServerMessage::Pong { .. } => None,
            ServerMessage::Unknown => {
                debug!("ignoring unknown websocket message");
                None
            }
        }
    }

    fn reset_status_later(&self) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let delay = Duration::from_secs(self.config.status_reset_secs);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            notifier.set_status(STATUS_IDLE);
        })
    }
}

async fn send_json(sink: &mut SplitSink<Socket, Message>, msg: &ClientMessage) -> Result<(), WsError> {
    let json = serde_json::to_string(msg)
        .map_err(|e| WsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    sink.send(Message::Text(json.into())).await
}
