//! Per-connection read loop: frames packets off the wire, feeds them
//! through the session state machine, and carries out the resulting
//! actions.

use super::ClientInner;
use crate::transport::{PacketReader, TransportStream};
use mqtt_duplex_protocol::connection::DisconnectReason;
use mqtt_duplex_protocol::{MqttError, Packet, SessionAction};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::ReadHalf;

pub(super) async fn run(
    mut reader: PacketReader<ReadHalf<TransportStream>>,
    inner: Arc<ClientInner>,
) {
    // With keep alive active the server must produce traffic within
    // the timeout window (we ping it well before that); total silence
    // past the window means the link is dead.
    let read_deadline = {
        let tracker = inner.keepalive.lock();
        if tracker.enabled() {
            Some(inner.config.keepalive.timeout_duration(tracker.keepalive()))
        } else {
            None
        }
    };

    loop {
        let result = match read_deadline {
            Some(deadline) => match tokio::time::timeout(deadline, reader.read_packet()).await {
                Ok(result) => result,
                Err(_) => Err(MqttError::KeepAliveTimeout),
            },
            None => reader.read_packet().await,
        };

        let packet = match result {
            Ok(packet) => packet,
            Err(MqttError::KeepAliveTimeout) => {
                tracing::warn!("no traffic from server within keep alive window");
                inner.signal_link_down(DisconnectReason::KeepAliveTimeout);
                return;
            }
            Err(e) if e.is_normal_disconnect() => {
                tracing::debug!("server closed the connection");
                inner.signal_link_down(DisconnectReason::ServerClosed);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "read failed");
                inner.signal_link_down(DisconnectReason::NetworkError(e.to_string()));
                return;
            }
        };

        inner.keepalive.lock().record_inbound(Instant::now());

        match &packet {
            Packet::PingResp => {
                tracing::trace!("PINGRESP");
                continue;
            }
            Packet::Disconnect(disconnect) => {
                tracing::warn!(reason = ?disconnect.reason_code, "server sent DISCONNECT");
                inner.signal_link_down(DisconnectReason::ServerClosed);
                return;
            }
            _ => {}
        }

        let actions = inner.session.lock().handle_incoming(&packet);
        process_actions(&inner, actions).await;
    }
}

async fn process_actions(inner: &Arc<ClientInner>, actions: Vec<SessionAction>) {
    for action in actions {
        match action {
            SessionAction::SendPacket(packet) => {
                // A lost ack here is fine: the peer retransmits and the
                // session answers again on the next connection.
                if let Ok(writer) = inner.writer() {
                    if writer.send(packet).await.is_err() {
                        tracing::debug!("writer gone, dropping outbound ack");
                    }
                }
            }
            SessionAction::DeliverMessage(message) => {
                inner.callbacks.dispatch(&message);
            }
            SessionAction::PublishCompleted {
                packet_id,
                reason_code,
            }
            | SessionAction::FlowError {
                packet_id,
                reason_code,
            } => {
                if let Some(tx) = inner.pub_waiters.lock().remove(&packet_id) {
                    let _ = tx.send(reason_code);
                } else {
                    tracing::debug!(packet_id, ?reason_code, "publish completed with no waiter");
                }
            }
            SessionAction::SubscribeCompleted {
                packet_id,
                reason_codes,
            } => {
                if let Some(tx) = inner.sub_waiters.lock().remove(&packet_id) {
                    let _ = tx.send(reason_codes);
                }
            }
            SessionAction::UnsubscribeCompleted {
                packet_id,
                reason_codes,
            } => {
                if let Some(tx) = inner.unsub_waiters.lock().remove(&packet_id) {
                    let _ = tx.send(reason_codes);
                }
            }
        }
    }
}
