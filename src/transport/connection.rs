//! WebSocket connection and event loop.
//!
//! The connection owns a spawned tokio task that multiplexes three things
//! over one socket:
//!
//! - Outgoing requests from the page handle
//! - Responses, matched back to their caller by [`RequestId`]
//! - Browsing-context events, fanned out on a broadcast channel

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Event, ParsedEvent, Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

/// Timeout for the READY handshake.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<Response>>>;

// ============================================================================
// ReadyData
// ============================================================================

/// Data received in the READY handshake message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyData {
    /// Initial tab ID from Firefox.
    pub tab_id: u32,
    /// Session ID echoed by the extension.
    pub session_id: u32,
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a request and route its response to `response_tx`.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to the automation extension.
///
/// Cheap to clone; every clone talks to the same event loop.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Event fan-out.
    events: broadcast::Sender<ParsedEvent>,
}

impl Connection {
    /// Creates a new connection from a WebSocket stream and spawns its loop.
    pub(crate) fn new(ws_stream: WebSocketStream<TcpStream>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            events.clone(),
        ));

        Self {
            command_tx,
            correlation,
            events,
        }
    }

    /// Waits for the READY handshake message.
    ///
    /// The extension sends READY with the nil request ID as soon as it
    /// connects.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if READY is not received in time
    /// - [`Error::ChannelClosed`] if the socket closes before READY
    pub async fn wait_ready(&self) -> Result<ReadyData> {
        let (tx, rx) = oneshot::channel();
        self.correlation.lock().insert(RequestId::ready(), tx);

        let response = timeout(READY_TIMEOUT, rx)
            .await
            .map_err(|_| Error::connection_timeout(READY_TIMEOUT.as_millis() as u64))???;

        let ready = ReadyData {
            tab_id: response.get_u64("tabId").max(1) as u32,
            session_id: response.get_u64("sessionId").max(1) as u32,
        };

        debug!(tab_id = ready.tab_id, session_id = ready.session_id, "READY handshake completed");
        Ok(ready)
    }

    /// Subscribes to browsing-context events.
    ///
    /// Only events received after subscribing are delivered.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ParsedEvent> {
        self.events.subscribe()
    }

    /// Sends a request with [`DEFAULT_COMMAND_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// See [`Connection::send_with_timeout`].
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.send_with_timeout(request, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::RequestTimeout`] if no response arrives in time
    /// - [`Error::Protocol`] if too many requests are pending
    pub async fn send_with_timeout(
        &self,
        request: Request,
        request_timeout: Duration,
    ) -> Result<Response> {
        let request_id = request.id;

        {
            let pending = self.correlation.lock().len();
            if pending >= MAX_PENDING_REQUESTS {
                warn!(pending, max = MAX_PENDING_REQUESTS, "Too many pending requests");
                return Err(Error::protocol(format!(
                    "Too many pending requests: {pending}/{MAX_PENDING_REQUESTS}"
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ConnectionCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(request_id));
                Err(Error::request_timeout(
                    request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Asks the event loop to close the socket.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WebSocketStream<TcpStream>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        events: broadcast::Sender<ParsedEvent>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, &events);
                        }
                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }
                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request, response_tx }) => {
                            let request_id = request.id;
                            let json = match to_string(&request) {
                                Ok(json) => json,
                                Err(e) => {
                                    let _ = response_tx.send(Err(Error::Json(e)));
                                    continue;
                                }
                            };

                            correlation.lock().insert(request_id, response_tx);

                            if let Err(e) = ws_write.send(Message::Text(json.into())).await
                                && let Some(tx) = correlation.lock().remove(&request_id)
                            {
                                let _ = tx.send(Err(Error::connection(e.to_string())));
                            }
                            trace!(%request_id, "Request sent");
                        }
                        Some(ConnectionCommand::RemoveCorrelation(request_id)) => {
                            correlation.lock().remove(&request_id);
                            debug!(%request_id, "Removed timed-out correlation");
                        }
                        Some(ConnectionCommand::Shutdown) | None => {
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        let pending: Vec<_> = correlation.lock().drain().collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "Failing pending requests on shutdown");
        }
        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        debug!("Event loop terminated");
    }

    /// Routes one text frame to its waiting caller or to event subscribers.
    fn handle_incoming_message(
        text: &str,
        correlation: &Mutex<CorrelationMap>,
        events: &broadcast::Sender<ParsedEvent>,
    ) {
        if let Ok(response) = from_str::<Response>(text) {
            match correlation.lock().remove(&response.id) {
                Some(tx) => {
                    let _ = tx.send(Ok(response));
                }
                None => warn!(id = %response.id, "Response for unknown request"),
            }
            return;
        }

        if let Ok(event) = from_str::<Event>(text) {
            let parsed = event.parse();
            trace!(?parsed, "Event received");
            // No subscribers is fine; nobody is waiting on a navigation.
            let _ = events.send(parsed);
            return;
        }

        warn!(text = %text, "Failed to parse incoming message");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    use serde_json::{Value, json};
    use tokio_tungstenite::connect_async;

    use crate::identifiers::{FrameId, TabId};
    use crate::protocol::{BrowsingContextCommand, Command};
    use crate::transport::PendingServer;

    /// Plays the extension side: connects, sends READY, then answers each
    /// request with `{"value": <method>}` after emitting one event.
    async fn fake_extension(url: String) {
        let (mut ws, _) = connect_async(url).await.expect("client connect");
        let ready = json!({
            "id": "00000000-0000-0000-0000-000000000000",
            "type": "success",
            "result": {"tabId": 4, "sessionId": 2}
        });
        ws.send(Message::Text(ready.to_string().into()))
            .await
            .expect("send ready");

        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let request: Value = serde_json::from_str(&text).expect("request json");
            let event = json!({
                "id": "11111111-1111-1111-1111-111111111111",
                "type": "event",
                "method": "browsingContext.domContentLoaded",
                "params": {"tabId": 4, "url": "https://web.whatsapp.com/"}
            });
            ws.send(Message::Text(event.to_string().into()))
                .await
                .expect("send event");

            let response = json!({
                "id": request["id"],
                "type": "success",
                "result": {"value": request["method"]}
            });
            ws.send(Message::Text(response.to_string().into()))
                .await
                .expect("send response");
        }
    }

    #[tokio::test]
    async fn test_request_response_and_event_roundtrip() {
        let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind");
        tokio::spawn(fake_extension(server.ws_url()));

        let (connection, ready) = server.accept().await.expect("accept");
        assert_eq!(ready, ReadyData { tab_id: 4, session_id: 2 });

        let mut events = connection.subscribe();
        let tab_id = TabId::new(ready.tab_id).expect("tab id");
        let request = Request::new(
            tab_id,
            FrameId::main(),
            Command::BrowsingContext(BrowsingContextCommand::Reload),
        );

        let value = connection
            .send(request)
            .await
            .expect("send")
            .into_value()
            .expect("value");
        assert_eq!(value, "browsingContext.reload");

        let event = events.recv().await.expect("event");
        assert!(matches!(event, ParsedEvent::DomContentLoaded { tab_id: 4, .. }));
        assert_eq!(connection.pending_count(), 0);

        connection.shutdown();
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT.as_secs(), 30);
        assert_eq!(MAX_PENDING_REQUESTS, 100);
        assert_eq!(READY_TIMEOUT.as_secs(), 30);
    }
}
