//! WebSocket session transport
//!
//! One `WsTransport` owns at most one WebSocket connection. After the handshake
//! the socket is split between a writer task, fed through a bounded queue, and
//! a reader task that decodes frames and hands messages to subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use supportchat_core::{
    wire, ChatError, ChatMessage, ClientId, DeliveryNotifier, DeliveryReceipt, InboundHandler,
    LinkState, Result, SessionTransport, Subscribers, SubscriptionId, TransportConfig,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Time given to the writer to flush queued frames and the close frame
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ----------------------------------------------------------------------------
// Link Context
// ----------------------------------------------------------------------------

/// State shared by the transport and its socket tasks
struct LinkContext {
    client_id: ClientId,
    alive: AtomicBool,
    state_tx: Arc<watch::Sender<LinkState>>,
}

impl LinkContext {
    /// Record an unrequested loss of the channel; only the first report counts
    fn mark_dropped(&self, reason: String) {
        if self.alive.swap(false, Ordering::SeqCst) {
            warn!(client_id = %self.client_id, "WebSocket channel dropped: {}", reason);
            self.state_tx.send_replace(LinkState::Dropped { reason });
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

enum WriterCommand {
    Frame {
        text: String,
        notifier: DeliveryNotifier,
    },
    Close,
}

struct Connection {
    link: Arc<LinkContext>,
    outbound_tx: mpsc::Sender<WriterCommand>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

// ----------------------------------------------------------------------------
// WebSocket Transport
// ----------------------------------------------------------------------------

/// Session transport over a WebSocket connection
pub struct WsTransport {
    config: TransportConfig,
    subscribers: Subscribers,
    state_tx: Arc<watch::Sender<LinkState>>,
    connection: Option<Connection>,
}

impl WsTransport {
    /// Create a disconnected transport for the configured endpoint
    pub fn new(config: TransportConfig) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Down);
        Self {
            config,
            subscribers: Subscribers::new(),
            state_tx: Arc::new(state_tx),
            connection: None,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn live_connection(&self) -> Option<&Connection> {
        self.connection.as_ref().filter(|conn| conn.link.is_alive())
    }

    async fn handshake(&self, client_id: &ClientId) -> Result<WsStream> {
        let url = self.config.session_url(client_id)?;
        debug!(client_id = %client_id, url = %url, "Opening WebSocket channel");

        match tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str())).await
        {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(ChatError::connection(client_id, e.to_string())),
            Err(_) => Err(ChatError::connection(
                client_id,
                format!(
                    "handshake timed out after {}ms",
                    self.config.connect_timeout.as_millis()
                ),
            )),
        }
    }
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn connect(&mut self, client_id: &ClientId) -> Result<()> {
        if let Some(conn) = self.live_connection() {
            return Err(ChatError::AlreadyConnected {
                client_id: conn.link.client_id.clone(),
            });
        }
        // Leftovers of a dropped channel
        if let Some(stale) = self.connection.take() {
            stale.abort();
        }

        let stream = match self.handshake(client_id).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(client_id = %client_id, "WebSocket connect failed: {}", e);
                return Err(e);
            }
        };
        let (sink, stream) = stream.split();

        let link = Arc::new(LinkContext {
            client_id: client_id.clone(),
            alive: AtomicBool::new(true),
            state_tx: Arc::clone(&self.state_tx),
        });
        self.state_tx.send_replace(LinkState::Up);

        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_buffer);
        let writer = tokio::spawn(write_loop(sink, outbound_rx, Arc::clone(&link)));
        let reader = tokio::spawn(read_loop(
            stream,
            self.subscribers.clone(),
            Arc::clone(&link),
        ));

        self.connection = Some(Connection {
            link,
            outbound_tx,
            writer,
            reader,
        });
        info!(client_id = %client_id, endpoint = %self.config.endpoint, "WebSocket channel connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(mut conn) = self.connection.take() else {
            debug!("Disconnect on idle WebSocket transport ignored");
            return Ok(());
        };

        if conn.link.alive.swap(false, Ordering::SeqCst) {
            // Queued frames are written before the close frame; a stalled
            // socket gets CLOSE_GRACE in total before the tasks are aborted
            let outbound_tx = conn.outbound_tx.clone();
            let writer = &mut conn.writer;
            let _ = tokio::time::timeout(CLOSE_GRACE, async move {
                if outbound_tx.send(WriterCommand::Close).await.is_ok() {
                    let _ = writer.await;
                }
            })
            .await;
        }
        conn.abort();

        self.state_tx.send_replace(LinkState::Down);
        info!(client_id = %conn.link.client_id, "WebSocket channel disconnected");
        Ok(())
    }

    async fn send(&mut self, message: &ChatMessage) -> Result<DeliveryReceipt> {
        let conn = self.live_connection().ok_or(ChatError::NotConnected)?;
        if message.client_id() != &conn.link.client_id {
            return Err(ChatError::invalid_message(format!(
                "message for client {} sent on channel for {}",
                message.client_id(),
                conn.link.client_id
            )));
        }

        let text = wire::encode_outbound(message)?;
        let (notifier, receipt) = DeliveryReceipt::pending();
        // Never wait on a stalled socket; a full queue is reported to the caller
        conn.outbound_tx
            .try_send(WriterCommand::Frame { text, notifier })
            .map_err(|e| match e {
                TrySendError::Full(_) => ChatError::Backpressure {
                    capacity: self.config.outbound_buffer,
                },
                TrySendError::Closed(_) => ChatError::NotConnected,
            })?;

        debug!(client_id = %conn.link.client_id, message_id = %message.id(), "Frame queued");
        Ok(receipt)
    }

    fn subscribe(&self, handler: InboundHandler) -> SubscriptionId {
        self.subscribers.subscribe(handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    fn is_connected(&self) -> bool {
        self.live_connection().is_some()
    }

    fn link_state(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    fn client_id(&self) -> Option<ClientId> {
        self.live_connection().map(|conn| conn.link.client_id.clone())
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Socket Tasks
// ----------------------------------------------------------------------------

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::Receiver<WriterCommand>,
    link: Arc<LinkContext>,
) {
    while let Some(command) = outbound_rx.recv().await {
        match command {
            WriterCommand::Frame { text, notifier } => match sink.send(Message::Text(text)).await {
                Ok(()) => notifier.complete(Ok(())),
                Err(e) => {
                    let reason = e.to_string();
                    notifier.complete(Err(ChatError::connection(&link.client_id, reason.clone())));
                    link.mark_dropped(reason);
                    break;
                }
            },
            WriterCommand::Close => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(client_id = %link.client_id, "Close frame not sent: {}", e);
                }
                let _ = sink.close().await;
                break;
            }
        }
    }

    // Whatever is still queued will never reach the network
    outbound_rx.close();
    while let Ok(command) = outbound_rx.try_recv() {
        if let WriterCommand::Frame { notifier, .. } = command {
            notifier.complete(Err(ChatError::connection(
                &link.client_id,
                "channel closed before the frame was written",
            )));
        }
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, subscribers: Subscribers, link: Arc<LinkContext>) {
    while let Some(next) = stream.next().await {
        match next {
            Ok(Message::Text(text)) => deliver(&text, &subscribers, &link),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => deliver(text, &subscribers, &link),
                Err(_) => warn!(client_id = %link.client_id, "Dropping non UTF-8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                let reason = match frame {
                    Some(frame) => format!("closed by server ({}): {}", frame.code, frame.reason),
                    None => "closed by server".to_string(),
                };
                link.mark_dropped(reason);
                return;
            }
            // Ping/pong are answered by tungstenite
            Ok(_) => {}
            Err(e) => {
                link.mark_dropped(e.to_string());
                return;
            }
        }
    }
    link.mark_dropped("stream ended".to_string());
}

fn deliver(text: &str, subscribers: &Subscribers, link: &LinkContext) {
    match wire::decode_inbound(text, &link.client_id) {
        Ok(message) => {
            debug!(client_id = %link.client_id, message_id = %message.id(), "Inbound message");
            subscribers.dispatch(&message);
        }
        Err(e) => warn!(client_id = %link.client_id, "Dropping inbound frame: {}", e),
    }
}
