//! The async client: connection establishment, the public operation
//! surface, and the shared state its background tasks run against.

mod keepalive;
mod reader;
mod reconnect;
mod writer;

use crate::callback::{CallbackId, CallbackManager, MessageCallback};
use crate::transport::{PacketReader, PacketWriter, TransportConfig};
use mqtt_duplex_protocol::connection::{
    ConnectionEvent, ConnectionState, ConnectionStateMachine, DisconnectReason, ReconnectConfig,
};
use mqtt_duplex_protocol::packet::{ConnectPacket, DisconnectPacket, TopicFilter};
use mqtt_duplex_protocol::{
    ConnectOptions, KeepaliveConfig, KeepaliveTracker, Message, MqttError, Packet, QoS,
    ReasonCode, Result, SessionAction, SessionState, SessionStats,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker address: `tcp://`, `tls://`, `ws://`, or `wss://`.
    pub address: String,
    pub options: ConnectOptions,
    pub reconnect: ReconnectConfig,
    pub keepalive: KeepaliveConfig,
    pub connect_timeout: Duration,
    /// How long operations wait for their acknowledgment.
    pub ack_timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(address: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            options: ConnectOptions::new(client_id),
            reconnect: ReconnectConfig::default(),
            keepalive: KeepaliveConfig::default(),
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(30),
        }
    }

    /// Config with a generated client id, for clients with no session
    /// identity to preserve across restarts.
    #[must_use]
    pub fn with_random_client_id(address: impl Into<String>) -> Self {
        let suffix: u32 = rand::random();
        Self::new(address, format!("mqtt-duplex-{suffix:08x}"))
    }

    #[must_use]
    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) session: Mutex<SessionState>,
    pub(crate) callbacks: CallbackManager,
    pub(crate) connected: AtomicBool,
    pub(crate) closing: AtomicBool,
    /// Bumped once per established connection so tasks belonging to a
    /// replaced connection can tell they are stale.
    pub(crate) generation: AtomicU64,
    pub(crate) writer_tx: Mutex<Option<mpsc::Sender<Packet>>>,
    pub(crate) pub_waiters: Mutex<HashMap<u16, oneshot::Sender<ReasonCode>>>,
    pub(crate) sub_waiters: Mutex<HashMap<u16, oneshot::Sender<Vec<ReasonCode>>>>,
    pub(crate) unsub_waiters: Mutex<HashMap<u16, oneshot::Sender<Vec<ReasonCode>>>>,
    pub(crate) keepalive: Mutex<KeepaliveTracker>,
    pub(crate) state_machine: Mutex<ConnectionStateMachine>,
    pub(crate) link_tx: mpsc::Sender<DisconnectReason>,
}

impl ClientInner {
    pub(crate) fn writer(&self) -> Result<mpsc::Sender<Packet>> {
        self.writer_tx.lock().clone().ok_or(MqttError::NotConnected)
    }

    /// Marks the connection dead and wakes the reconnect supervisor.
    /// Safe to call from multiple tasks; later calls are stale signals
    /// the supervisor drops.
    pub(crate) fn signal_link_down(&self, reason: DisconnectReason) {
        self.connected.store(false, Ordering::SeqCst);
        self.writer_tx.lock().take();
        let _ = self.link_tx.try_send(reason);
    }
}

/// Async MQTT client. Cheap to clone; all clones share one connection
/// and session.
#[derive(Clone)]
pub struct MqttClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl MqttClient {
    /// Connects to the broker and starts the background read, write,
    /// keepalive, and reconnect tasks.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        // Fail on bad addresses before any state exists.
        TransportConfig::parse(&config.address)?;

        let (link_tx, link_rx) = mpsc::channel(8);
        let version = config.options.protocol_version;
        let keepalive = KeepaliveTracker::new(
            config.options.keep_alive,
            config.keepalive,
            Instant::now(),
        );

        let inner = Arc::new(ClientInner {
            session: Mutex::new(SessionState::new(version)),
            callbacks: CallbackManager::new(),
            connected: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            writer_tx: Mutex::new(None),
            pub_waiters: Mutex::new(HashMap::new()),
            sub_waiters: Mutex::new(HashMap::new()),
            unsub_waiters: Mutex::new(HashMap::new()),
            keepalive: Mutex::new(keepalive),
            state_machine: Mutex::new(ConnectionStateMachine::new(config.reconnect.clone())),
            link_tx,
            config,
        });

        inner
            .state_machine
            .lock()
            .transition(ConnectionEvent::ConnectRequested)?;
        establish_connection(&inner).await?;

        tokio::spawn(reconnect::supervisor(Arc::clone(&inner), link_rx));

        Ok(Self { inner })
    }

    /// Fire-and-forget QoS 0 publish.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.publish_message(Message::new(topic, payload)).await?;
        Ok(())
    }

    /// Publishes a message at its configured QoS. For QoS 1 and 2 the
    /// call resolves when the flow completes; the returned reason code
    /// is the broker's. While disconnected with reconnect enabled the
    /// message is queued for delivery after the next reconnect.
    pub async fn publish_message(&self, message: Message) -> Result<ReasonCode> {
        if !self.is_connected() {
            return self.queue_offline(message);
        }

        let actions = self.inner.session.lock().publish(&message)?;
        let packet = match actions.into_iter().next() {
            Some(SessionAction::SendPacket(packet)) => packet,
            _ => return Err(MqttError::ProtocolError("publish produced no packet".into())),
        };
        let packet_id = packet.packet_id();

        let rx = packet_id.map(|id| {
            let (tx, rx) = oneshot::channel();
            self.inner.pub_waiters.lock().insert(id, tx);
            rx
        });

        if let Err(e) = self.send(packet).await {
            // QoS 1/2 stays tracked in the session and will be
            // retransmitted after a reconnect; the waiter stays armed.
            if rx.is_none() {
                return Err(e);
            }
        }

        let Some(rx) = rx else {
            return Ok(ReasonCode::Success);
        };
        let packet_id = packet_id.unwrap_or_default();

        match tokio::time::timeout(self.inner.config.ack_timeout, rx).await {
            Ok(Ok(reason)) if reason.is_error() => Err(MqttError::PublishFailed(reason)),
            Ok(Ok(reason)) => Ok(reason),
            Ok(Err(_)) => Err(MqttError::ClientClosed),
            Err(_) => {
                self.inner.pub_waiters.lock().remove(&packet_id);
                Err(MqttError::Timeout)
            }
        }
    }

    fn queue_offline(&self, message: Message) -> Result<ReasonCode> {
        if self.inner.closing.load(Ordering::SeqCst)
            || !self.inner.config.reconnect.enabled
        {
            return Err(MqttError::NotConnected);
        }
        let size = message.topic.len() + message.payload.len();
        let (result, max_size) = {
            let mut session = self.inner.session.lock();
            let result = session.pending_mut().enqueue(message);
            (result, session.pending().stats().max_size)
        };
        if !result.was_queued {
            return Err(MqttError::PacketTooLarge {
                size,
                max: max_size,
            });
        }
        if result.messages_dropped > 0 {
            tracing::warn!(
                dropped = result.messages_dropped,
                "offline queue overflow, oldest messages dropped"
            );
        }
        tracing::debug!(queued = result.message_count, "message queued while offline");
        Ok(ReasonCode::Success)
    }

    /// Subscribes to a single filter, resolving once the SUBACK
    /// arrives. Errors if the broker refuses the subscription.
    pub async fn subscribe(&self, filter: impl Into<String>, qos: QoS) -> Result<ReasonCode> {
        let codes = self
            .subscribe_many(vec![TopicFilter::new(filter, qos)])
            .await?;
        let code = codes.first().copied().unwrap_or(ReasonCode::UnspecifiedError);
        if code.is_error() {
            return Err(MqttError::SubscriptionFailed(code));
        }
        Ok(code)
    }

    /// Subscribes to several filters in one SUBSCRIBE packet. Returns
    /// the broker's per-filter reason codes in order.
    pub async fn subscribe_many(&self, filters: Vec<TopicFilter>) -> Result<Vec<ReasonCode>> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }

        let actions = self.inner.session.lock().subscribe(filters)?;
        let packet = match actions.into_iter().next() {
            Some(SessionAction::SendPacket(packet)) => packet,
            _ => {
                return Err(MqttError::ProtocolError(
                    "subscribe produced no packet".into(),
                ));
            }
        };
        let packet_id = packet
            .packet_id()
            .ok_or_else(|| MqttError::ProtocolError("subscribe without packet id".into()))?;

        let (tx, rx) = oneshot::channel();
        self.inner.sub_waiters.lock().insert(packet_id, tx);
        self.send(packet).await?;

        match tokio::time::timeout(self.inner.config.ack_timeout, rx).await {
            Ok(Ok(codes)) => Ok(codes),
            Ok(Err(_)) => Err(MqttError::ClientClosed),
            Err(_) => {
                self.inner.sub_waiters.lock().remove(&packet_id);
                Err(MqttError::Timeout)
            }
        }
    }

    /// Unsubscribes and drops any callbacks registered for the filter.
    pub async fn unsubscribe(&self, filter: impl Into<String>) -> Result<Vec<ReasonCode>> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        let filter = filter.into();

        let actions = self.inner.session.lock().unsubscribe(vec![filter.clone()])?;
        let packet = match actions.into_iter().next() {
            Some(SessionAction::SendPacket(packet)) => packet,
            _ => {
                return Err(MqttError::ProtocolError(
                    "unsubscribe produced no packet".into(),
                ));
            }
        };
        let packet_id = packet
            .packet_id()
            .ok_or_else(|| MqttError::ProtocolError("unsubscribe without packet id".into()))?;

        let (tx, rx) = oneshot::channel();
        self.inner.unsub_waiters.lock().insert(packet_id, tx);
        self.send(packet).await?;

        let codes = match tokio::time::timeout(self.inner.config.ack_timeout, rx).await {
            Ok(Ok(codes)) => codes,
            Ok(Err(_)) => return Err(MqttError::ClientClosed),
            Err(_) => {
                self.inner.unsub_waiters.lock().remove(&packet_id);
                return Err(MqttError::Timeout);
            }
        };

        self.inner.callbacks.unregister(&filter);
        Ok(codes)
    }

    /// Registers a callback for messages matching `filter`. The
    /// subscription itself is separate; see [`MqttClient::subscribe`].
    pub fn on_message(
        &self,
        filter: impl Into<String>,
        callback: impl Fn(Message) + Send + Sync + 'static,
    ) -> Result<CallbackId> {
        let callback: MessageCallback = Arc::new(callback);
        self.inner.callbacks.register(filter, callback)
    }

    pub fn on_string(
        &self,
        filter: impl Into<String>,
        handler: impl Fn(String) + Send + Sync + 'static,
    ) -> Result<CallbackId> {
        self.inner.callbacks.register_string(filter, handler)
    }

    pub fn on_json<T>(
        &self,
        filter: impl Into<String>,
        handler: impl Fn(T) + Send + Sync + 'static,
    ) -> Result<CallbackId>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.inner.callbacks.register_json(filter, handler)
    }

    /// Sends DISCONNECT and shuts the client down for good; the
    /// reconnect supervisor will not revive the connection.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.closing.store(true, Ordering::SeqCst);

        let version = self.inner.config.options.protocol_version;
        if let Ok(writer) = self.inner.writer() {
            let disconnect = DisconnectPacket::normal().with_version(version);
            let _ = writer.send(Packet::Disconnect(disconnect)).await;
        }

        {
            let mut machine = self.inner.state_machine.lock();
            let _ = machine.transition(ConnectionEvent::CloseRequested);
            let _ = machine.transition(ConnectionEvent::TransportClosed);
        }

        self.inner.connected.store(false, Ordering::SeqCst);
        // Dropping the sender ends the writer task, which closes the
        // stream; the reader then sees EOF and exits.
        self.inner.writer_tx.lock().take();
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state_machine.lock().state().clone()
    }

    #[must_use]
    pub fn session_stats(&self) -> SessionStats {
        self.inner.session.lock().stats()
    }

    async fn send(&self, packet: Packet) -> Result<()> {
        let writer = self.inner.writer()?;
        writer
            .send(packet)
            .await
            .map_err(|_| MqttError::NotConnected)
    }
}

/// Dials the transport, performs the CONNECT handshake, and on success
/// installs a fresh writer channel and spawns the per-connection tasks.
pub(crate) async fn establish_connection(inner: &Arc<ClientInner>) -> Result<()> {
    let config = &inner.config;
    let transport_config = TransportConfig::parse(&config.address)?;
    let stream = transport_config.connect(config.connect_timeout).await?;

    let version = config.options.protocol_version;
    let (read_half, write_half) = tokio::io::split(stream);
    let mut packet_reader = PacketReader::new(read_half, version);
    let mut packet_writer = PacketWriter::new(write_half);

    let connect = ConnectPacket::from_options(&config.options);
    // A CONNECT that carries a validation warning never goes on the
    // wire; the warning escalates to a hard error at the send boundary.
    if let Some(warning) = connect.warnings().into_iter().next() {
        tracing::error!(%warning, "refusing to send CONNECT with a validation warning");
        return Err(warning.into());
    }
    packet_writer
        .write_packet(&Packet::Connect(Box::new(connect)))
        .await?;

    // The server must answer CONNECT with CONNACK before anything else.
    let packet = tokio::time::timeout(config.connect_timeout, packet_reader.read_packet())
        .await
        .map_err(|_| MqttError::Timeout)??;
    let Packet::ConnAck(connack) = packet else {
        return Err(MqttError::ProtocolError(format!(
            "expected CONNACK, got {:?}",
            packet.packet_type()
        )));
    };
    if !connack.is_success() {
        return Err(MqttError::ConnectionRefused(connack.reason_code));
    }

    let mut keep_alive = config.options.keep_alive;
    if let Some(server_secs) = connack.properties.server_keep_alive() {
        keep_alive = Duration::from_secs(u64::from(server_secs));
        tracing::debug!(secs = server_secs, "server overrode keep alive");
    }
    *inner.keepalive.lock() = KeepaliveTracker::new(keep_alive, config.keepalive, Instant::now());

    let session_present = connack.session_present;
    inner
        .state_machine
        .lock()
        .transition(ConnectionEvent::ConnAckReceived(Box::new(connack)))?;

    let (writer_tx, writer_rx) = mpsc::channel(64);
    *inner.writer_tx.lock() = Some(writer_tx.clone());
    inner.connected.store(true, Ordering::SeqCst);
    let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

    tokio::spawn(writer::run(packet_writer, writer_rx, Arc::clone(inner)));
    tokio::spawn(reader::run(packet_reader, Arc::clone(inner)));
    tokio::spawn(keepalive::run(Arc::clone(inner), generation, writer_tx.clone()));

    // Retransmissions (or a fresh resubscribe) first, then the backlog
    // queued while we were offline.
    let resume_packets = inner.session.lock().resume(session_present);
    for packet in resume_packets {
        writer_tx
            .send(packet)
            .await
            .map_err(|_| MqttError::NotConnected)?;
    }
    drain_pending(inner, &writer_tx).await?;

    tracing::info!(
        address = %config.address,
        session_present,
        "connected"
    );
    Ok(())
}

async fn drain_pending(
    inner: &Arc<ClientInner>,
    writer_tx: &mpsc::Sender<Packet>,
) -> Result<()> {
    loop {
        let actions = {
            let mut session = inner.session.lock();
            let Some(message) = session.pending_mut().dequeue() else {
                return Ok(());
            };
            session.publish(&message)?
        };
        for action in actions {
            if let SessionAction::SendPacket(packet) = action {
                writer_tx
                    .send(packet)
                    .await
                    .map_err(|_| MqttError::NotConnected)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("tcp://localhost:1883", "client-1");
        assert_eq!(config.options.client_id, "client-1");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.reconnect.enabled);
    }

    #[test]
    fn test_random_client_ids_are_distinct() {
        let a = ClientConfig::with_random_client_id("tcp://localhost");
        let b = ClientConfig::with_random_client_id("tcp://localhost");
        assert!(a.options.client_id.starts_with("mqtt-duplex-"));
        assert_ne!(a.options.client_id, b.options.client_id);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_address() {
        let config = ClientConfig::new("nonsense", "client-1");
        assert!(MqttClient::connect(config).await.is_err());
    }
}
